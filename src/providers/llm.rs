use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::InferenceConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub role: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: role.to_string(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The same message as seen by a participant that did not write it.
    pub fn as_received(&self) -> Self {
        Self {
            content: self.content.clone(),
            role: "user".to_string(),
            name: self.name.clone(),
        }
    }
}

/// Produces the next reply for a message history. Opaque to the orchestrator.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn complete(&self, messages: Vec<Message>) -> Result<String>;
}

/// Chat-completions client for OpenAI and compatible deployments (Azure
/// OpenAI, local gateways) selected through `base_url`.
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIProvider {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Inference API key not configured (OPENAI_API_KEY)"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }
}

// OpenAI only accepts [a-zA-Z0-9_-] in participant names.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait]
impl InferenceProvider for OpenAIProvider {
    async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages
                .into_iter()
                .map(|m| ChatRequestMessage {
                    role: m.role,
                    content: m.content,
                    name: m.name.as_deref().map(sanitize_name),
                })
                .collect(),
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            anyhow::bail!("Inference API error {}: {}", status, body);
        }

        let result: ChatResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No choices in inference response"))
    }
}

/// Replies from a fixed script, then repeats a fallback reply.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: "TERMINATE".to_string(),
        }
    }

    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply.into(),
        }
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn complete(&self, _messages: Vec<Message>) -> Result<String> {
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted provider lock poisoned"))?;
        Ok(replies.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }
}
