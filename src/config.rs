use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: Option<String>,
    pub inference: InferenceConfig,
    pub orchestration: OrchestrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerSelection {
    RoundRobin,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Upper bound on replies in one group run.
    pub max_rounds_per_group: usize,
    /// Number of most recent events replayed into a worker on attach.
    pub recollection_lookback: usize,
    pub speaker_selection: SpeakerSelection,
    /// A group stops once a reply contains this keyword.
    pub termination_keyword: String,
    pub transcript_dir: PathBuf,
    pub state_aware: bool,
    pub resume_from_transcripts: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_rounds_per_group: 12,
            recollection_lookback: 50,
            speaker_selection: SpeakerSelection::RoundRobin,
            termination_keyword: "TERMINATE".to_string(),
            transcript_dir: PathBuf::from("."),
            state_aware: true,
            resume_from_transcripts: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Reads the optional TOML file, then lets the environment override it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DATABASE_URL").or_else(|| var("SQL_CONNECTIONSTRING")) {
            self.database_url = Some(url);
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.inference.api_key = Some(key);
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.inference.base_url = url;
        }
        if let Some(model) = var("OPENAI_MODEL") {
            self.inference.model = model;
        }
        if let Some(rounds) = var("STATEWEAVE_MAX_ROUNDS").and_then(|v| v.parse().ok()) {
            self.orchestration.max_rounds_per_group = rounds;
        }
        if let Some(dir) = var("STATEWEAVE_TRANSCRIPT_DIR") {
            self.orchestration.transcript_dir = PathBuf::from(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.orchestration.max_rounds_per_group, 12);
        assert_eq!(config.orchestration.recollection_lookback, 50);
        assert_eq!(config.orchestration.speaker_selection, SpeakerSelection::RoundRobin);
        assert!(config.orchestration.state_aware);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_file_then_env_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_url = "postgres://file"

[inference]
model = "gpt-4-deployment"

[orchestration]
max_rounds_per_group = 4
speaker_selection = "auto"
"#
        )
        .unwrap();

        let mut config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.inference.model, "gpt-4-deployment");
        assert_eq!(config.inference.timeout_secs, 120);
        assert_eq!(config.orchestration.speaker_selection, SpeakerSelection::Auto);
        assert_eq!(config.orchestration.recollection_lookback, 50);

        let env: HashMap<&str, &str> = [
            ("SQL_CONNECTIONSTRING", "postgres://env"),
            ("STATEWEAVE_MAX_ROUNDS", "7"),
            ("STATEWEAVE_TRANSCRIPT_DIR", "/tmp/transcripts"),
        ]
        .into_iter()
        .collect();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database_url.as_deref(), Some("postgres://env"));
        assert_eq!(config.orchestration.max_rounds_per_group, 7);
        assert_eq!(config.orchestration.transcript_dir, PathBuf::from("/tmp/transcripts"));
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "orchestration = 3").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }
}
