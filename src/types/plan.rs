use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::{StepKind, GROUP_TASK};
use crate::error::PlanError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Plan {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub deliverable_name: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Step {
    /// Raw step type. Unknown kinds survive parsing so the executor can skip
    /// them instead of rejecting the whole plan.
    #[serde(rename = "Type")]
    pub step_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub initial_message: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub initial_message: String,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub prerequisites: Option<Vec<String>>,
    #[serde(default)]
    pub sub_tasks: Option<Vec<Task>>,
}

impl Plan {
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, PlanError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }
}

impl Step {
    pub fn kind(&self) -> Option<StepKind> {
        StepKind::from_str(&self.step_type)
    }

    /// What the step is about, as told to its workers: the step's own
    /// `InitialMessage`, else its `Description`.
    pub fn brief(&self) -> Option<&str> {
        [self.initial_message.as_str(), self.description.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|text| !text.is_empty())
    }

    /// Checks that every prerequisite names a task declared earlier in this
    /// step.
    pub fn validate_prerequisites(&self) -> Result<(), PlanError> {
        let mut declared = HashSet::new();
        for task in &self.tasks {
            for prerequisite in task.prerequisites() {
                if !declared.contains(prerequisite.as_str()) {
                    return Err(PlanError::UnknownPrerequisite {
                        task: task.id.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
            declared.insert(task.id.as_str());
        }
        Ok(())
    }
}

impl Task {
    pub fn is_group(&self) -> bool {
        self.task_type.as_deref() == Some(GROUP_TASK)
    }

    pub fn prerequisites(&self) -> &[String] {
        self.prerequisites.as_deref().unwrap_or_default()
    }

    /// Fails on the first required field that is missing or blank.
    pub fn require_fields(&self) -> Result<(), PlanError> {
        let label = if self.name.is_empty() {
            self.id.clone()
        } else {
            self.name.clone()
        };
        let missing = |field: &'static str| PlanError::MissingField {
            task: label.clone(),
            field,
        };

        if self.id.trim().is_empty() {
            return Err(missing("Id"));
        }
        if self.name.trim().is_empty() {
            return Err(missing("Name"));
        }
        if self.is_group() {
            if self.sub_tasks.as_ref().map_or(true, |s| s.is_empty()) {
                return Err(missing("SubTasks"));
            }
        } else if self.initial_message.trim().is_empty() {
            return Err(missing("InitialMessage"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"{
        "Id": "plan-1",
        "Name": "Client profile",
        "DeliverableName": "Profile",
        "Steps": [
            {
                "Type": "ParallelStep",
                "Name": "Research",
                "Description": "Gather facts",
                "InitialMessage": "Start researching",
                "Tasks": [
                    {"Id": "a", "Name": "Analyst", "InitialMessage": "Find the market"},
                    {"Id": "b", "Name": "Researcher", "InitialMessage": "Find the CTO", "Prerequisites": ["a"]},
                    {"Id": "g", "Name": "Review", "Type": "Group", "InitialMessage": "Review",
                     "SubTasks": [{"Id": "g1", "Name": "Critic", "InitialMessage": "Critique"}]}
                ]
            },
            {"Type": "LoopStep", "Name": "Unknown", "Tasks": []}
        ]
    }"#;

    #[test]
    fn test_parse_plan_document() {
        let plan = Plan::from_json(PLAN).unwrap();
        assert_eq!(plan.id, "plan-1");
        assert_eq!(plan.deliverable_name, "Profile");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].kind(), Some(StepKind::Parallel));
        assert_eq!(plan.steps[1].kind(), None);

        let tasks = &plan.steps[0].tasks;
        assert_eq!(tasks[1].prerequisites(), ["a".to_string()]);
        assert!(tasks[0].prerequisites().is_empty());
        assert!(tasks[2].is_group());
        assert_eq!(tasks[2].sub_tasks.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_prerequisites_must_be_declared_earlier() {
        let plan = Plan::from_json(PLAN).unwrap();
        assert!(plan.steps[0].validate_prerequisites().is_ok());

        let mut step = plan.steps[0].clone();
        step.tasks.swap(0, 1);
        let err = step.validate_prerequisites().unwrap_err();
        assert!(matches!(err, PlanError::UnknownPrerequisite { ref prerequisite, .. } if prerequisite == "a"));
    }

    #[test]
    fn test_step_brief() {
        let plan = Plan::from_json(PLAN).unwrap();
        assert_eq!(plan.steps[0].brief(), Some("Start researching"));
        assert_eq!(plan.steps[1].brief(), None);

        let mut step = plan.steps[0].clone();
        step.initial_message = "  ".to_string();
        assert_eq!(step.brief(), Some("Gather facts"));
    }

    #[test]
    fn test_require_fields() {
        let task = Task {
            id: "t1".to_string(),
            name: "Writer".to_string(),
            initial_message: String::new(),
            ..Default::default()
        };
        let err = task.require_fields().unwrap_err();
        assert!(matches!(err, PlanError::MissingField { field: "InitialMessage", .. }));

        let group = Task {
            id: "g".to_string(),
            name: "Group".to_string(),
            task_type: Some(GROUP_TASK.to_string()),
            ..Default::default()
        };
        assert!(matches!(
            group.require_fields().unwrap_err(),
            PlanError::MissingField { field: "SubTasks", .. }
        ));
    }
}
