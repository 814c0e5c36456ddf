use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::types::TaskStatus;

pub const REPORT_DELIMITER: char = '=';

/// Progress report a worker appends to its reply after the `=` delimiter.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    #[serde(rename = "Steps")]
    pub steps: Vec<ReportedStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportedStep {
    #[serde(rename = "STEP")]
    pub step: String,
    #[serde(rename = "STATUS")]
    pub status: String,
    #[serde(rename = "DETAIL", default)]
    pub detail: Option<String>,
}

impl ReportedStep {
    pub fn task_text(&self) -> &str {
        strip_numbering(&self.step)
    }

    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::from_str(&self.status)
    }

    pub fn detail(&self) -> &str {
        self.detail.as_deref().unwrap_or_default()
    }
}

/// Splits on the last delimiter and tries the trailing segment, then the
/// leading one. Text without a delimiter is tried whole.
pub fn parse_status_report(text: &str) -> Option<StatusReport> {
    let candidates = match text.rsplit_once(REPORT_DELIMITER) {
        Some((head, tail)) => vec![tail, head],
        None => vec![text],
    };

    candidates
        .into_iter()
        .find_map(|candidate| serde_json::from_str::<StatusReport>(candidate.trim()).ok())
}

fn leading_number() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*\d+\.\s*").expect("valid numbering pattern"))
}

pub fn strip_numbering(step: &str) -> &str {
    match leading_number().find(step) {
        Some(m) => step[m.end()..].trim_end(),
        None => step.trim(),
    }
}
