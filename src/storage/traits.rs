use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Event, TaskRecord, TaskStatus};

/// Append-only log of conversational events keyed by (plan, worker, task).
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, plan_id: &str, worker_name: &str, task_id: &str, event: &Event) -> Result<()>;

    /// Returns at most `limit` of the newest events, oldest first.
    async fn retrieve_recent(
        &self,
        plan_id: &str,
        worker_name: &str,
        task_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>>;
}

/// Status rows keyed by (plan, task, worker, task text). Writes are single
/// independent upserts; concurrent updates to one key are last-writer-wins.
#[async_trait]
pub trait TaskLedger: Send + Sync {
    async fn exists(&self, plan_id: &str, task_id: &str, worker_name: &str, task: &str) -> Result<bool>;

    async fn insert(&self, record: &TaskRecord) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    async fn update(
        &self,
        plan_id: &str,
        task_id: &str,
        worker_name: &str,
        task: &str,
        status: TaskStatus,
        detail: &str,
        audit: &str,
    ) -> Result<()>;

    async fn retrieve_all(&self, plan_id: &str, task_id: &str) -> Result<Vec<TaskRecord>>;
}
