use std::path::PathBuf;

use thiserror::Error;

/// Structural problems with a plan document. These stop a run before any
/// worker is driven with wrong data.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("task '{task}' is missing required field '{field}'")]
    MissingField { task: String, field: &'static str },

    #[error("task '{task}' lists prerequisite '{prerequisite}' which is not declared earlier in its step")]
    UnknownPrerequisite { task: String, prerequisite: String },

    #[error("prerequisite '{prerequisite}' of task '{task}' did not complete")]
    PrerequisiteFailed { task: String, prerequisite: String },

    #[error("invalid plan document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("failed to read plan file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
