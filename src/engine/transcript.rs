use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::providers::Message;
use crate::types::Event;

const TRANSCRIPT_PREFIX: &str = "group_chat_history_";

/// `<dir>/group_chat_history_<group>.json`, with path separators in the
/// group name replaced.
pub fn transcript_path(dir: &Path, group_name: &str) -> PathBuf {
    let file_name: String = group_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    dir.join(format!("{}{}.json", TRANSCRIPT_PREFIX, file_name))
}

pub async fn persist_transcript(dir: &Path, group_name: &str, messages: &[Message]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create transcript directory {}", dir.display()))?;

    let path = transcript_path(dir, group_name);
    let json = serde_json::to_string_pretty(messages)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write transcript {}", path.display()))?;

    log::debug!("Saved {} messages of group {} to {}", messages.len(), group_name, path.display());
    Ok(path)
}

/// Returns `None` when the group has no transcript file yet.
pub async fn load_transcript(dir: &Path, group_name: &str) -> Result<Option<Vec<Message>>> {
    let path = transcript_path(dir, group_name);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(None);
    }

    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read transcript {}", path.display()))?;
    let messages = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse transcript {}", path.display()))?;
    Ok(Some(messages))
}

pub fn transcript_events(messages: &[Message]) -> Vec<Event> {
    messages.iter().map(Event::message).collect()
}
