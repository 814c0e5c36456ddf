use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

use super::status_report::{parse_status_report, StatusReport};
use crate::engine::group::GroupCoordinator;
use crate::engine::resume::ResumeCoordinator;
use crate::providers::{parse_numbered_steps, Message, StepRetriever};
use crate::storage::Stores;
use crate::types::task_record::subtask_owner;
use crate::types::{AgentContext, Event, TaskRecord, TaskStatus};
use crate::worker::{Interceptor, Participant, Worker};

pub const DEFAULT_LOOKBACK: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityMode {
    Live,
    Replaying,
}

#[derive(Debug)]
struct HookState {
    mode: CapabilityMode,
    message_count: usize,
}

/// Makes a worker resumable: tracks its steps in the task ledger, logs its
/// traffic to the event store and replays that log when attached again.
pub struct StateAwareCapability {
    context: AgentContext,
    stores: Stores,
    steps: Arc<dyn StepRetriever>,
    lookback: usize,
    state: Mutex<HookState>,
}

impl StateAwareCapability {
    pub fn new(context: AgentContext, stores: Stores, steps: Arc<dyn StepRetriever>) -> Self {
        Self {
            context,
            stores,
            steps,
            lookback: DEFAULT_LOOKBACK,
            state: Mutex::new(HookState {
                mode: CapabilityMode::Live,
                message_count: 0,
            }),
        }
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    pub fn mode(&self) -> CapabilityMode {
        self.state().mode
    }

    pub fn message_count(&self) -> usize {
        self.state().message_count
    }

    fn state(&self) -> MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_mode(&self, mode: CapabilityMode) {
        self.state().mode = mode;
    }

    fn worker_name(&self) -> &str {
        &self.context.task_name
    }

    /// Registers the worker's own ledger row and recollects its history.
    /// The worker must already carry this capability as an interceptor.
    pub async fn attach(&self, worker: &mut Worker) {
        self.ensure_registered().await;
        self.recollect(worker).await;
    }

    /// Group-manager counterpart of [`attach`](Self::attach): the recalled
    /// events become the group's resumed transcript. Returns how many events
    /// were replayed.
    pub async fn attach_to_group(&self, group: &mut GroupCoordinator) -> usize {
        self.ensure_registered().await;
        let events = self.recall().await;
        ResumeCoordinator::prepare_resume(group, &events).await;
        events.len()
    }

    async fn ensure_registered(&self) {
        let ctx = &self.context;
        let ledger = &self.stores.ledger;
        match ledger
            .exists(ctx.plan_id(), &ctx.task_id, self.worker_name(), &ctx.task_name)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                let record = TaskRecord::new(
                    ctx.plan_id(),
                    &ctx.task_id,
                    self.worker_name(),
                    &ctx.task_name,
                    TaskStatus::NotDone,
                )
                .with_detail("Not started");
                if let Err(e) = ledger.insert(&record).await {
                    log::warn!("Failed to register task {} in ledger: {}", ctx.task_name, e);
                }
            }
            Err(e) => log::warn!("Failed to look up task {} in ledger: {}", ctx.task_name, e),
        }
    }

    /// Most recent events for this worker, oldest first. Empty when the
    /// store cannot be read.
    pub async fn recall(&self) -> Vec<Event> {
        let ctx = &self.context;
        match self
            .stores
            .events
            .retrieve_recent(ctx.plan_id(), self.worker_name(), &ctx.task_id, self.lookback)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                log::warn!("Failed to recall events for {}: {}", self.worker_name(), e);
                Vec::new()
            }
        }
    }

    async fn recollect(&self, worker: &mut Worker) {
        self.set_mode(CapabilityMode::Replaying);

        let events = self.recall().await;
        let replayed = events.iter().filter(|e| e.is_message()).count();
        for event in events.iter().filter(|e| e.is_message()) {
            worker.replay(event.to_message()).await;
        }

        if !self.context.is_group_manager {
            let ctx = &self.context;
            match self.stores.ledger.retrieve_all(ctx.plan_id(), &ctx.task_id).await {
                Ok(records) => {
                    for record in records.iter().filter(|r| !r.is_subtask()) {
                        worker.replay(Message::user(record.status_line())).await;
                    }
                }
                Err(e) => log::warn!("Failed to load task statuses for {}: {}", ctx.task_name, e),
            }
        }

        self.set_mode(CapabilityMode::Live);
        log::debug!("Recollected {} events into {}", replayed, self.worker_name());
    }

    async fn persist(&self, event: Event) {
        let ctx = &self.context;
        if let Err(e) = self
            .stores
            .events
            .append(ctx.plan_id(), self.worker_name(), &ctx.task_id, &event)
            .await
        {
            log::warn!("Failed to save event for {}: {}", self.worker_name(), e);
        }
    }

    async fn expand_first_message(&self, message: Message) -> Message {
        let parent = &self.context.parent_worker_name;
        let steps = match self.steps.retrieve_steps(&self.context, &message.content).await {
            Ok(steps) => steps,
            Err(e) => {
                log::warn!("Step retrieval failed for {}: {}", self.worker_name(), e);
                format!(
                    "Step retrieval failed ({}). ASK the {} for the steps needed to complete this task.",
                    e, parent
                )
            }
        };

        if !self.context.is_group_manager {
            self.register_steps(&parse_numbered_steps(&steps)).await;
        }

        let content = format!(
            "This is your task:\n\n{ask}\n\n-----\n\
             To complete this task, follow these steps and DO NOT repeat any step that has already been completed:\n\
             {steps}\n\n-----\n{instructions}",
            ask = message.content,
            steps = steps,
            instructions = reporting_instructions(parent),
        );

        Message { content, ..message }
    }

    async fn register_steps(&self, steps: &[String]) {
        let ctx = &self.context;
        let owner = subtask_owner(self.worker_name());
        for step in steps {
            match self.stores.ledger.exists(ctx.plan_id(), &ctx.task_id, &owner, step).await {
                Ok(true) => {}
                Ok(false) => {
                    let record = TaskRecord::new(ctx.plan_id(), &ctx.task_id, &owner, step, TaskStatus::Todo)
                        .with_detail("Not started");
                    if let Err(e) = self.stores.ledger.insert(&record).await {
                        log::warn!("Failed to register step '{}': {}", step, e);
                    }
                }
                Err(e) => log::warn!("Failed to look up step '{}': {}", step, e),
            }
        }
    }

    async fn apply_report(&self, report: &StatusReport, raw: &str) {
        let ctx = &self.context;
        let ledger = &self.stores.ledger;
        let owner = subtask_owner(self.worker_name());

        for step in &report.steps {
            let Some(status) = step.status() else {
                log::debug!("Ignoring step '{}' with unknown status '{}'", step.step, step.status);
                continue;
            };
            let task = step.task_text();

            let result = match ledger.exists(ctx.plan_id(), &ctx.task_id, &owner, task).await {
                Ok(true) => {
                    ledger
                        .update(ctx.plan_id(), &ctx.task_id, &owner, task, status, step.detail(), raw)
                        .await
                }
                Ok(false) => {
                    let record = TaskRecord::new(ctx.plan_id(), &ctx.task_id, &owner, task, status)
                        .with_detail(step.detail())
                        .with_audit(raw);
                    ledger.insert(&record).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => log::info!("Task {} for {} updated. New status: {}", task, self.worker_name(), status),
                Err(e) => log::warn!("Failed to update task '{}': {}", task, e),
            }
        }
    }
}

fn reporting_instructions(parent: &str) -> String {
    format!(
        "At the end of your response, use a single = as a delimiter followed by a JSON string of the step or steps you performed as well as a status for each step.\n\
         The format should be a single line with a JSON formatted string in the format: \
         {{\"Steps\": [{{\"STEP\": \"your first step here\", \"STATUS\": \"status of the step\", \"DETAIL\": \"additional detail\"}}, \
         {{\"STEP\": \"your second step here\", \"STATUS\": \"status of the step\", \"DETAIL\": \"additional detail\"}}]}}\n\
         Valid statuses are: DONE, IN_PROGRESS, BLOCKED, TODO. Do not use any other status.\n\
         The \"DETAIL\" property holds any additional detail such as error messages or requests for information or documents needed to complete the step.\n\
         Do not include additional detail after the JSON.\n\
         If you need additional detail or feedback ASK the {parent} for it. Do not assume the {parent} knows what you need.",
        parent = parent
    )
}

#[async_trait]
impl Interceptor for StateAwareCapability {
    async fn on_receive(&self, message: Message) -> Message {
        let first = {
            let mut state = self.state();
            if state.mode == CapabilityMode::Replaying {
                return message;
            }
            let first = state.message_count == 0;
            state.message_count += 1;
            first
        };

        let message = if first {
            self.expand_first_message(message).await
        } else {
            message
        };

        self.persist(Event::message(&message)).await;
        message
    }

    async fn on_before_send(&self, message: Message, silent: bool) -> Message {
        if silent || self.mode() == CapabilityMode::Replaying {
            return message;
        }

        if !self.context.is_group_manager {
            match parse_status_report(&message.content) {
                Some(report) => self.apply_report(&report, &message.content).await,
                None => log::debug!("No status report in message from {}", self.worker_name()),
            }
        }

        self.persist(Event::message(&message)).await;
        message
    }

    async fn on_error(&self, source: &str, error: &str) {
        self.persist(Event::exception("assistant", error, Some(source.to_string())))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ScriptedProvider, StaticStepRetriever};
    use crate::storage::{EventStore, InMemoryStore};
    use crate::types::{MessageType, PlanContext};

    const REPORT: &str = r#"Company is Disney. = {"Steps":[{"STEP":"1. Get name","STATUS":"DONE","DETAIL":"ok"}]}"#;

    fn setup(is_manager: bool) -> (Arc<InMemoryStore>, Arc<StateAwareCapability>) {
        let store = Arc::new(InMemoryStore::new());
        let plan = Arc::new(PlanContext::new("plan-1", "Plan", "Client Profile"));
        let mut context = AgentContext::new(plan, "1", "Analyst", "User1");
        if is_manager {
            context = context.as_group_manager();
        }
        let steps = StaticStepRetriever::new()
            .with_fallback(vec!["Get name".to_string(), "Get age".to_string()]);
        let capability = StateAwareCapability::new(context, Stores::shared(store.clone()), Arc::new(steps));
        (store, Arc::new(capability))
    }

    fn worker(capability: &Arc<StateAwareCapability>, reply: &str) -> Worker {
        Worker::new("Analyst", "Profile the client", Arc::new(ScriptedProvider::repeating(reply)))
            .with_interceptor(capability.clone())
    }

    #[tokio::test]
    async fn test_attach_registers_task_once() {
        let (store, capability) = setup(false);
        let mut first = worker(&capability, REPORT);
        capability.attach(&mut first).await;
        capability.attach(&mut first).await;

        let own = store.record("plan-1", "1", "Analyst", "Analyst").unwrap();
        assert_eq!(own.status, TaskStatus::NotDone);
        assert_eq!(store.records().len(), 1);
        assert_eq!(capability.mode(), CapabilityMode::Live);
    }

    #[tokio::test]
    async fn test_first_message_is_expanded_and_persisted() {
        let (store, capability) = setup(false);
        let mut w = worker(&capability, REPORT);
        capability.attach(&mut w).await;

        w.initiate("User1", "Build the client profile").await.unwrap();
        assert_eq!(capability.message_count(), 1);

        let events = store.retrieve_recent("plan-1", "Analyst", "1", 50).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].content.starts_with("This is your task:"));
        assert!(events[0].content.contains("Build the client profile"));
        assert!(events[0].content.contains("1. Get name\n2. Get age"));
        assert!(events[0].content.contains("ASK the User1"));
        assert_eq!(events[1].content, REPORT);
        assert_eq!(events[1].from_worker.as_deref(), Some("Analyst"));

        // History keeps the raw ask; only the prompt saw the expansion.
        assert_eq!(w.history()[1].content, "Build the client profile");

        w.receive(Message::user("Anything else?")).await;
        w.reply().await.unwrap();
        let events = store.retrieve_recent("plan-1", "Analyst", "1", 50).await.unwrap();
        assert_eq!(events[2].content, "Anything else?");
        assert_eq!(capability.message_count(), 2);
    }

    #[tokio::test]
    async fn test_status_report_updates_subtask() {
        let (store, capability) = setup(false);
        let mut w = worker(&capability, REPORT);
        capability.attach(&mut w).await;

        let pending = store.record("plan-1", "1", "Analyst-subtask", "Get name");
        assert!(pending.is_none());

        w.initiate("User1", "Build the client profile").await.unwrap();

        let done = store.record("plan-1", "1", "Analyst-subtask", "Get name").unwrap();
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(done.detail, "ok");
        assert_eq!(done.audit, REPORT);

        let untouched = store.record("plan-1", "1", "Analyst-subtask", "Get age").unwrap();
        assert_eq!(untouched.status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn test_malformed_report_leaves_ledger_unchanged() {
        let (store, capability) = setup(false);
        let mut w = worker(&capability, "Working on it = {not json");
        capability.attach(&mut w).await;
        w.initiate("User1", "Build the client profile").await.unwrap();

        let before = store.records();
        w.receive(Message::user("and?")).await;
        let reply = w.reply().await.unwrap();
        assert_eq!(reply, "Working on it = {not json");
        assert_eq!(store.records(), before);
    }

    #[tokio::test]
    async fn test_group_manager_skips_reports_and_status_lines() {
        let (store, capability) = setup(true);
        let mut w = worker(&capability, REPORT);
        capability.attach(&mut w).await;
        assert!(w.history().is_empty());

        w.initiate("User1", "Coordinate").await.unwrap();
        assert!(store.record("plan-1", "1", "Analyst-subtask", "Get name").is_none());
        assert_eq!(store.retrieve_recent("plan-1", "Analyst", "1", 50).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_recollection_replays_without_logging() {
        let (store, capability) = setup(false);
        let mut w = worker(&capability, REPORT);
        capability.attach(&mut w).await;
        w.initiate("User1", "Build the client profile").await.unwrap();
        store
            .append("plan-1", "Analyst", "1", &Event::exception("assistant", "timeout", None))
            .await
            .unwrap();
        let logged = store.event_count();

        let plan = Arc::new(PlanContext::new("plan-1", "Plan", "Client Profile"));
        let fresh_capability = Arc::new(StateAwareCapability::new(
            AgentContext::new(plan, "1", "Analyst", "User1"),
            Stores::shared(store.clone()),
            Arc::new(StaticStepRetriever::new()),
        ));
        let mut resumed = worker(&fresh_capability, REPORT);
        fresh_capability.attach(&mut resumed).await;

        assert_eq!(store.event_count(), logged);
        let history = resumed.history();
        assert_eq!(history.len(), 3);
        assert!(history[0].content.starts_with("This is your task:"));
        assert_eq!(history[1].role, "assistant");
        assert_eq!(history[2].content, "Analyst: NOT_DONE");
        assert!(history.iter().all(|m| m.content != "timeout"));
        assert_eq!(fresh_capability.message_count(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_logged_as_exceptions() {
        let (store, capability) = setup(false);
        capability.on_error("Analyst", "model unavailable").await;
        let events = store.retrieve_recent("plan-1", "Analyst", "1", 5).await.unwrap();
        assert_eq!(events[0].message_type, MessageType::Exception);
        assert_eq!(events[0].content, "model unavailable");
    }
}
