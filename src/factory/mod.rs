use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

use crate::capabilities::StateAwareCapability;
use crate::config::OrchestrationConfig;
use crate::engine::group::GroupCoordinator;
use crate::engine::resume::ResumeCoordinator;
use crate::engine::transcript::{load_transcript, transcript_events};
use crate::providers::{InferenceProvider, StepRetriever};
use crate::storage::Stores;
use crate::types::{AgentContext, PlanContext, Step, Task};
use crate::worker::{Participant, Termination, Worker};

/// A participant ready to be driven, with the plan data the executor needs
/// to schedule it.
pub struct BuiltTask {
    pub id: String,
    pub name: String,
    pub initial_message: String,
    pub prerequisites: Vec<String>,
    pub participant: Box<dyn Participant>,
}

impl BuiltTask {
    fn new(task: &Task, participant: Box<dyn Participant>) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            initial_message: task.initial_message.clone(),
            prerequisites: task.prerequisites().to_vec(),
            participant,
        }
    }
}

/// Turns plan tasks into workers and groups, wiring in state awareness and
/// restoring whatever a previous run left behind.
pub struct ParticipantFactory {
    config: OrchestrationConfig,
    stores: Stores,
    provider: Arc<dyn InferenceProvider>,
    steps: Arc<dyn StepRetriever>,
}

impl ParticipantFactory {
    pub fn new(
        config: OrchestrationConfig,
        stores: Stores,
        provider: Arc<dyn InferenceProvider>,
        steps: Arc<dyn StepRetriever>,
    ) -> Self {
        Self {
            config,
            stores,
            provider,
            steps,
        }
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    /// Builds every task of a step before any of them runs.
    pub async fn build_step(&self, plan: &Arc<PlanContext>, step: &Step) -> Result<Vec<BuiltTask>> {
        let mut built = Vec::with_capacity(step.tasks.len());
        for task in &step.tasks {
            let participant = self.build_participant(plan, task, &step.name, step.brief()).await?;
            built.push(BuiltTask::new(task, participant));
        }
        Ok(built)
    }

    /// Builds a task outside of any step, so its workers get no brief.
    pub async fn build_task(&self, plan: &Arc<PlanContext>, task: &Task, parent: &str) -> Result<BuiltTask> {
        let participant = self.build_participant(plan, task, parent, None).await?;
        Ok(BuiltTask::new(task, participant))
    }

    /// `brief` is what the parent says about the work: the step's brief for
    /// top-level tasks, the group's `InitialMessage` for group members.
    fn build_participant<'a>(
        &'a self,
        plan: &'a Arc<PlanContext>,
        task: &'a Task,
        parent: &'a str,
        brief: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Box<dyn Participant>>> {
        async move {
            task.require_fields()?;
            if task.is_group() {
                self.build_group(plan, task, parent).await
            } else {
                Ok(Box::new(self.build_worker(plan, task, parent, brief).await) as Box<dyn Participant>)
            }
        }
        .boxed()
    }

    async fn build_worker(&self, plan: &Arc<PlanContext>, task: &Task, parent: &str, brief: Option<&str>) -> Worker {
        let mut worker = Worker::new(
            task.name.clone(),
            self.instructions(plan, task, parent, brief),
            self.provider.clone(),
        )
        .with_termination(Termination::Keyword(self.config.termination_keyword.clone()));

        if self.config.state_aware {
            let context = AgentContext::new(plan.clone(), task.id.clone(), task.name.clone(), parent);
            let capability = Arc::new(
                StateAwareCapability::new(context, self.stores.clone(), self.steps.clone())
                    .with_lookback(self.config.recollection_lookback),
            );
            worker = worker.with_interceptor(capability.clone());
            capability.attach(&mut worker).await;
        }

        log::debug!("Built worker {} for task {}", task.name, task.id);
        worker
    }

    async fn build_group(&self, plan: &Arc<PlanContext>, task: &Task, parent: &str) -> Result<Box<dyn Participant>> {
        let mut members = Vec::new();
        for sub_task in task.sub_tasks.iter().flatten() {
            let brief = Some(task.initial_message.as_str()).filter(|m| !m.trim().is_empty());
            members.push(self.build_participant(plan, sub_task, &task.name, brief).await?);
        }

        let mut group = GroupCoordinator::new(
            task.name.clone(),
            task.initial_message.clone(),
            members,
            self.config.max_rounds_per_group,
        )
        .with_selection(self.config.speaker_selection, Some(self.provider.clone()))
        .with_transcript_dir(self.config.transcript_dir.clone());

        let mut replayed = 0;
        if self.config.state_aware {
            let context =
                AgentContext::new(plan.clone(), task.id.clone(), task.name.clone(), parent).as_group_manager();
            let capability = Arc::new(
                StateAwareCapability::new(context, self.stores.clone(), self.steps.clone())
                    .with_lookback(self.config.recollection_lookback),
            );
            group = group.with_interceptor(capability.clone());
            replayed = capability.attach_to_group(&mut group).await;
        }

        if replayed == 0 && self.config.resume_from_transcripts {
            self.resume_from_transcript(&mut group).await;
        }

        log::debug!("Built group {} with {} members", task.name, group.members().len());
        Ok(Box::new(group))
    }

    async fn resume_from_transcript(&self, group: &mut GroupCoordinator) {
        let name = group.name().to_string();
        match load_transcript(&self.config.transcript_dir, &name).await {
            Ok(Some(messages)) => {
                log::info!("Resuming group {} from its transcript file", name);
                ResumeCoordinator::prepare_resume(group, &transcript_events(&messages)).await;
            }
            Ok(None) => {}
            Err(e) => log::warn!("Ignoring unreadable transcript for group {}: {:#}", name, e),
        }
    }

    fn instructions(&self, plan: &PlanContext, task: &Task, parent: &str, brief: Option<&str>) -> String {
        let mut text = format!(
            "You are {name}, working for the {parent} on the plan \"{plan}\" which produces the {deliverable}.\n",
            name = task.name,
            parent = parent,
            plan = plan.plan_name,
            deliverable = plan.deliverable_name,
        );
        if let Some(brief) = brief {
            text.push_str(&format!("The {} describes the work as: {}\n", parent, brief));
        }
        text.push_str(&format!(
            "Your assignment: {}\nWhen your assignment is complete, reply with {}.",
            task.initial_message, self.config.termination_keyword
        ));
        text
    }
}
