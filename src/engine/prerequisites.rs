use std::collections::HashMap;
use tokio::sync::watch;

use crate::error::PlanError;

type Summary = Option<String>;

/// Completion channels for the tasks of one parallel step. Each task gets
/// one signal to post its summary on; dependents subscribe before any task
/// starts.
pub struct CompletionBoard {
    signals: HashMap<String, watch::Sender<Summary>>,
    watchers: HashMap<String, watch::Receiver<Summary>>,
}

impl CompletionBoard {
    pub fn new<'a>(task_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut signals = HashMap::new();
        let mut watchers = HashMap::new();
        for id in task_ids {
            let (tx, rx) = watch::channel(None);
            signals.insert(id.to_string(), tx);
            watchers.insert(id.to_string(), rx);
        }
        Self { signals, watchers }
    }

    /// Hands out the task's signal. Only the first call for an id gets it.
    pub fn take_signal(&mut self, task_id: &str) -> Option<CompletionSignal> {
        self.signals.remove(task_id).map(CompletionSignal)
    }

    pub fn gate(&self, task_id: &str, prerequisites: &[String]) -> Result<PrerequisiteGate, PlanError> {
        let pending = prerequisites
            .iter()
            .map(|id| {
                self.watchers
                    .get(id)
                    .map(|rx| (id.clone(), rx.clone()))
                    .ok_or_else(|| PlanError::UnknownPrerequisite {
                        task: task_id.to_string(),
                        prerequisite: id.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PrerequisiteGate {
            task_id: task_id.to_string(),
            pending,
        })
    }
}

/// Posted once by a task that finished. Dropping it unposted marks the task
/// as failed for its dependents.
pub struct CompletionSignal(watch::Sender<Summary>);

impl CompletionSignal {
    pub fn complete(self, summary: &str) {
        self.0.send_replace(Some(summary.to_string()));
    }
}

pub struct PrerequisiteGate {
    task_id: String,
    pending: Vec<(String, watch::Receiver<Summary>)>,
}

impl PrerequisiteGate {
    pub fn is_open(&self) -> bool {
        self.pending.iter().all(|(_, rx)| rx.borrow().is_some())
    }

    /// Waits for every prerequisite and returns their summaries in
    /// declaration order.
    pub async fn wait(self) -> Result<Vec<String>, PlanError> {
        let mut summaries = Vec::with_capacity(self.pending.len());
        for (prerequisite, mut rx) in self.pending {
            let summary = rx
                .wait_for(|posted| posted.is_some())
                .await
                .map(|posted| posted.clone().unwrap_or_default());
            match summary {
                Ok(summary) => summaries.push(summary),
                Err(_) => {
                    return Err(PlanError::PrerequisiteFailed {
                        task: self.task_id,
                        prerequisite,
                    })
                }
            }
        }
        Ok(summaries)
    }
}
