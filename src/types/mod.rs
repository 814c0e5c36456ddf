pub mod context;
pub mod event;
pub mod plan;
pub mod task_record;

pub use context::{AgentContext, PlanContext};
pub use event::Event;
pub use plan::{Plan, Step, Task};
pub use task_record::TaskRecord;

use serde::{Deserialize, Serialize};

pub const SEQUENTIAL_STEP: &str = "SequentialStep";
pub const PARALLEL_STEP: &str = "ParallelStep";
pub const GROUP_TASK: &str = "Group";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Sequential,
    Parallel,
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Sequential => SEQUENTIAL_STEP,
            StepKind::Parallel => PARALLEL_STEP,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            SEQUENTIAL_STEP => Some(StepKind::Sequential),
            PARALLEL_STEP => Some(StepKind::Parallel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Message,
    Exception,
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Message => "MESSAGE",
            MessageType::Exception => "EXCEPTION",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MESSAGE" => Some(MessageType::Message),
            "EXCEPTION" => Some(MessageType::Exception),
            _ => None,
        }
    }
}

/// Status of a ledger row. Any status may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    NotDone,
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::NotDone => "NOT_DONE",
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Blocked => "BLOCKED",
            TaskStatus::Done => "DONE",
        }
    }

    /// Parses the status names workers are told to report, tolerating case
    /// and the spaced `NOT DONE` form older rows were written with.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "NOT_DONE" => Some(TaskStatus::NotDone),
            "TODO" => Some(TaskStatus::Todo),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "BLOCKED" => Some(TaskStatus::Blocked),
            "DONE" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind_names() {
        assert_eq!(StepKind::from_str("SequentialStep"), Some(StepKind::Sequential));
        assert_eq!(StepKind::from_str("ParallelStep"), Some(StepKind::Parallel));
        assert_eq!(StepKind::from_str("LoopStep"), None);
        assert_eq!(StepKind::Parallel.as_str(), "ParallelStep");
    }

    #[test]
    fn test_task_status_parsing() {
        assert_eq!(TaskStatus::from_str("DONE"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::from_str("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::from_str("NOT DONE"), Some(TaskStatus::NotDone));
        assert_eq!(TaskStatus::from_str("FINISHED"), None);
        assert_eq!(TaskStatus::Blocked.to_string(), "BLOCKED");
    }

    #[test]
    fn test_message_type_round_trip() {
        for kind in [MessageType::Message, MessageType::Exception] {
            assert_eq!(MessageType::from_str(kind.as_str()), Some(kind));
        }
    }
}
