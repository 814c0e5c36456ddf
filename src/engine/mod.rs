pub mod executor;
pub mod group;
pub mod prerequisites;
pub mod resume;
pub mod transcript;

pub use executor::PlanExecutor;
pub use group::GroupCoordinator;
pub use prerequisites::{CompletionBoard, CompletionSignal, PrerequisiteGate};
pub use resume::ResumeCoordinator;
