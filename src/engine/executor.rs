use anyhow::{anyhow, Context, Result};
use std::sync::Arc;

use super::prerequisites::CompletionBoard;
use crate::config::Config;
use crate::factory::{BuiltTask, ParticipantFactory};
use crate::providers::{InferenceProvider, StepRetriever};
use crate::storage::Stores;
use crate::types::{Plan, PlanContext, Step, StepKind};

/// Walks a plan step by step. Sequential steps hand their summary to the
/// next task; parallel steps run their tasks concurrently, each one waiting
/// for its prerequisites.
pub struct PlanExecutor {
    factory: ParticipantFactory,
}

impl PlanExecutor {
    pub fn new(
        config: &Config,
        stores: Stores,
        provider: Arc<dyn InferenceProvider>,
        steps: Arc<dyn StepRetriever>,
    ) -> Self {
        Self {
            factory: ParticipantFactory::new(config.orchestration.clone(), stores, provider, steps),
        }
    }

    pub fn from_factory(factory: ParticipantFactory) -> Self {
        Self { factory }
    }

    /// Runs every step in order and returns the final carry-over. A plan
    /// whose steps run no task yields an empty string.
    pub async fn execute(&self, plan: &Plan) -> Result<String> {
        let context = Arc::new(PlanContext::from_plan(plan));
        log::info!(
            "Executing plan {} ({}) with {} steps",
            context.plan_name,
            context.plan_id,
            plan.steps.len()
        );

        // None until the first task of the plan has finished.
        let mut carry_over: Option<String> = None;
        for step in &plan.steps {
            carry_over = match step.kind() {
                Some(StepKind::Sequential) => self.run_sequential(&context, step, carry_over).await?,
                Some(StepKind::Parallel) => self.run_parallel(&context, step, carry_over).await?,
                None => {
                    log::warn!("Skipping step {} with unknown type '{}'", step.name, step.step_type);
                    carry_over
                }
            };
        }

        log::info!("Plan {} finished", context.plan_id);
        Ok(carry_over.unwrap_or_default())
    }

    async fn run_sequential(
        &self,
        plan: &Arc<PlanContext>,
        step: &Step,
        carry_over: Option<String>,
    ) -> Result<Option<String>> {
        log::info!("Running sequential step {} ({} tasks)", step.name, step.tasks.len());
        let built = self.factory.build_step(plan, step).await?;

        let mut carry_over = carry_over;
        for task in built {
            let opening = carry_over.clone().unwrap_or_else(|| task.initial_message.clone());
            carry_over = Some(drive(task, &step.name, &opening).await?);
        }
        Ok(carry_over)
    }

    async fn run_parallel(
        &self,
        plan: &Arc<PlanContext>,
        step: &Step,
        carry_over: Option<String>,
    ) -> Result<Option<String>> {
        log::info!("Running parallel step {} ({} tasks)", step.name, step.tasks.len());
        step.validate_prerequisites()?;
        let built = self.factory.build_step(plan, step).await?;

        let mut board = CompletionBoard::new(built.iter().map(|t| t.id.as_str()));
        let mut handles = Vec::with_capacity(built.len());
        for task in built {
            let signal = board.take_signal(&task.id);
            let gate = board.gate(&task.id, &task.prerequisites)?;
            let incoming = carry_over.clone();
            let sender = step.name.clone();
            let id = task.id.clone();

            let handle = tokio::spawn(async move {
                let summaries = gate.wait().await?;
                let opening = opening_message(incoming.as_deref(), &summaries, &task.initial_message);
                let summary = drive(task, &sender, &opening).await?;
                if let Some(signal) = signal {
                    signal.complete(&summary);
                }
                Ok::<_, anyhow::Error>(summary)
            });
            handles.push((id, handle));
        }
        // Unclaimed signals close here so nothing waits on them forever.
        drop(board);

        let results =
            futures::future::join_all(handles.into_iter().map(|(id, handle)| async move { (id, handle.await) }))
                .await;

        let mut summary = carry_over;
        let mut failure = None;
        for (id, result) in results {
            match result {
                Ok(Ok(task_summary)) => summary = Some(task_summary),
                Ok(Err(e)) => {
                    log::error!("Task {} in step {} failed: {:#}", id, step.name, e);
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    log::error!("Task {} in step {} panicked: {}", id, step.name, e);
                    failure.get_or_insert(anyhow!("Task {} panicked: {}", id, e));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

/// Opens the task's chat and returns its last message.
async fn drive(mut task: BuiltTask, sender: &str, opening: &str) -> Result<String> {
    log::info!("Starting task {} ({})", task.name, task.id);
    let summary = task
        .participant
        .initiate(sender, opening)
        .await
        .with_context(|| format!("Task {} ({}) failed", task.name, task.id))?;

    log::info!("Task {} ({}) finished", task.name, task.id);
    Ok(summary)
}

/// Incoming carry-over followed by the prerequisite summaries, or the
/// task's own message when there is neither. Blank parts are left out of
/// the join but never replaced.
fn opening_message(carry_over: Option<&str>, summaries: &[String], initial_message: &str) -> String {
    if carry_over.is_none() && summaries.is_empty() {
        return initial_message.to_string();
    }

    carry_over
        .into_iter()
        .chain(summaries.iter().map(String::as_str))
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
