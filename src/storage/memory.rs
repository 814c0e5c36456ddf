use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::traits::{EventStore, TaskLedger};
use crate::types::{Event, TaskRecord, TaskStatus};

type EventKey = (String, String, String);
type RecordKey = (String, String, String, String);

fn record_key(plan_id: &str, task_id: &str, worker_name: &str, task: &str) -> RecordKey {
    (
        plan_id.to_string(),
        task_id.to_string(),
        worker_name.to_string(),
        task.to_string(),
    )
}

#[derive(Default)]
struct Ledger {
    rows: Vec<TaskRecord>,
    index: HashMap<RecordKey, usize>,
}

/// Process-local store backing both the event log and the task ledger.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    events: Arc<RwLock<Vec<(EventKey, Event)>>>,
    ledger: Arc<RwLock<Ledger>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn record(&self, plan_id: &str, task_id: &str, worker_name: &str, task: &str) -> Option<TaskRecord> {
        let ledger = self.ledger.read().ok()?;
        let position = *ledger.index.get(&record_key(plan_id, task_id, worker_name, task))?;
        ledger.rows.get(position).cloned()
    }

    pub fn records(&self) -> Vec<TaskRecord> {
        self.ledger.read().map(|l| l.rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn append(&self, plan_id: &str, worker_name: &str, task_id: &str, event: &Event) -> Result<()> {
        let mut events = self
            .events
            .write()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        events.push((
            (plan_id.to_string(), worker_name.to_string(), task_id.to_string()),
            event.clone(),
        ));
        Ok(())
    }

    async fn retrieve_recent(
        &self,
        plan_id: &str,
        worker_name: &str,
        task_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let events = self
            .events
            .read()
            .map_err(|_| anyhow!("event log lock poisoned"))?;

        let mut recent: Vec<Event> = events
            .iter()
            .rev()
            .filter(|((p, w, t), _)| p == plan_id && w == worker_name && t == task_id)
            .take(limit)
            .map(|(_, event)| event.clone())
            .collect();
        recent.reverse();
        Ok(recent)
    }
}

#[async_trait]
impl TaskLedger for InMemoryStore {
    async fn exists(&self, plan_id: &str, task_id: &str, worker_name: &str, task: &str) -> Result<bool> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| anyhow!("task ledger lock poisoned"))?;
        Ok(ledger.index.contains_key(&record_key(plan_id, task_id, worker_name, task)))
    }

    async fn insert(&self, record: &TaskRecord) -> Result<()> {
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| anyhow!("task ledger lock poisoned"))?;

        let key = record_key(&record.plan_id, &record.task_id, &record.worker_name, &record.task);
        match ledger.index.get(&key).copied() {
            Some(position) => ledger.rows[position] = record.clone(),
            None => {
                let position = ledger.rows.len();
                ledger.index.insert(key, position);
                ledger.rows.push(record.clone());
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        plan_id: &str,
        task_id: &str,
        worker_name: &str,
        task: &str,
        status: TaskStatus,
        detail: &str,
        audit: &str,
    ) -> Result<()> {
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| anyhow!("task ledger lock poisoned"))?;

        // Updating a missing row is a no-op, like an UPDATE matching nothing.
        if let Some(position) = ledger.index.get(&record_key(plan_id, task_id, worker_name, task)).copied() {
            let record = &mut ledger.rows[position];
            record.status = status;
            record.detail = detail.to_string();
            record.audit = audit.to_string();
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn retrieve_all(&self, plan_id: &str, task_id: &str) -> Result<Vec<TaskRecord>> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| anyhow!("task ledger lock poisoned"))?;
        Ok(ledger
            .rows
            .iter()
            .filter(|r| r.plan_id == plan_id && r.task_id == task_id)
            .cloned()
            .collect())
    }
}
