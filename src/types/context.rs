use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Plan;

/// Identifies one run of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanContext {
    pub plan_id: String,
    pub plan_name: String,
    pub deliverable_name: String,
}

impl PlanContext {
    pub fn new(
        plan_id: impl Into<String>,
        plan_name: impl Into<String>,
        deliverable_name: impl Into<String>,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            plan_name: plan_name.into(),
            deliverable_name: deliverable_name.into(),
        }
    }

    /// Falls back to the plan name when the document has no id. A plan with
    /// neither gets a random id, which means its state cannot be found again.
    pub fn from_plan(plan: &Plan) -> Self {
        let plan_id = if !plan.id.trim().is_empty() {
            plan.id.clone()
        } else if !plan.name.trim().is_empty() {
            plan.name.clone()
        } else {
            let generated = uuid::Uuid::new_v4().to_string();
            log::warn!(
                "Plan has neither Id nor Name; using generated id {} (this run cannot be resumed)",
                generated
            );
            generated
        };

        Self {
            plan_id,
            plan_name: plan.name.clone(),
            deliverable_name: plan.deliverable_name.clone(),
        }
    }
}

/// Identifies one worker within a plan run.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub plan: Arc<PlanContext>,
    pub task_id: String,
    pub task_name: String,
    pub parent_worker_name: String,
    pub is_group_manager: bool,
}

impl AgentContext {
    pub fn new(
        plan: Arc<PlanContext>,
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        parent_worker_name: impl Into<String>,
    ) -> Self {
        Self {
            plan,
            task_id: task_id.into(),
            task_name: task_name.into(),
            parent_worker_name: parent_worker_name.into(),
            is_group_manager: false,
        }
    }

    pub fn as_group_manager(mut self) -> Self {
        self.is_group_manager = true;
        self
    }

    pub fn plan_id(&self) -> &str {
        &self.plan.plan_id
    }
}
