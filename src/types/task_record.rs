use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskStatus;

pub const SUBTASK_SUFFIX: &str = "-subtask";

/// Ledger row keyed by (plan, task, worker, task text). The task text is
/// matched exactly, so two phrasings of one step are two rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub plan_id: String,
    pub task_id: String,
    pub worker_name: String,
    pub task: String,
    pub status: TaskStatus,
    pub detail: String,
    pub audit: String,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        plan_id: impl Into<String>,
        task_id: impl Into<String>,
        worker_name: impl Into<String>,
        task: impl Into<String>,
        status: TaskStatus,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            task_id: task_id.into(),
            worker_name: worker_name.into(),
            task: task.into(),
            status,
            detail: String::new(),
            audit: String::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_audit(mut self, audit: impl Into<String>) -> Self {
        self.audit = audit.into();
        self
    }

    pub fn is_subtask(&self) -> bool {
        self.worker_name.contains(SUBTASK_SUFFIX)
    }

    pub fn status_line(&self) -> String {
        format!("{}: {}", self.task, self.status)
    }
}

pub fn subtask_owner(worker_name: &str) -> String {
    format!("{}{}", worker_name, SUBTASK_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtask_rows_are_marked_by_owner_suffix() {
        let own = TaskRecord::new("p", "1", "Analyst", "Analyst", TaskStatus::NotDone);
        let step = TaskRecord::new("p", "1", subtask_owner("Analyst"), "Get name", TaskStatus::Todo)
            .with_detail("pending");

        assert!(!own.is_subtask());
        assert!(step.is_subtask());
        assert_eq!(step.worker_name, "Analyst-subtask");
        assert_eq!(own.status_line(), "Analyst: NOT_DONE");
    }
}
