pub mod interceptor;
pub mod participant;

pub use interceptor::Interceptor;
pub use participant::Participant;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::providers::{InferenceProvider, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Never,
    Keyword(String),
}

impl Termination {
    pub fn matches(&self, content: &str) -> bool {
        match self {
            Termination::Never => false,
            Termination::Keyword(keyword) => !keyword.is_empty() && content.contains(keyword.as_str()),
        }
    }
}

/// A conversational unit: instructions, history, and the interceptors that
/// watch its traffic.
pub struct Worker {
    name: String,
    instructions: String,
    history: Vec<Message>,
    provider: Arc<dyn InferenceProvider>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    termination: Termination,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        provider: Arc<dyn InferenceProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            history: Vec::new(),
            provider,
            interceptors: Vec::new(),
            termination: Termination::Never,
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    async fn report_error(&self, error: &anyhow::Error) {
        let text = error.to_string();
        for interceptor in &self.interceptors {
            interceptor.on_error(&self.name, &text).await;
        }
    }
}

#[async_trait]
impl Participant for Worker {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.instructions
    }

    async fn receive(&mut self, message: Message) {
        self.history.push(message.as_received());
    }

    async fn replay(&mut self, message: Message) {
        let mut message = message;
        for interceptor in &self.interceptors {
            message = interceptor.on_before_send(message, true).await;
        }
        self.history.push(message);
    }

    async fn reply(&mut self) -> Result<String> {
        let (last, earlier) = self
            .history
            .split_last()
            .ok_or_else(|| anyhow!("Worker {} has no message to reply to", self.name))?;

        // Speaking twice in a row: our own reply was already seen by
        // on_before_send and is not inbound.
        let own_reply = last.role == "assistant" && last.name.as_deref() == Some(self.name.as_str());
        let mut inbound = last.clone();
        if !own_reply {
            for interceptor in &self.interceptors {
                inbound = interceptor.on_receive(inbound).await;
            }
        }

        let mut prompt = Vec::with_capacity(self.history.len() + 1);
        prompt.push(Message::system(self.instructions.clone()));
        prompt.extend(earlier.iter().cloned());
        prompt.push(inbound);

        let text = match self.provider.complete(prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Worker {} failed to reply: {}", self.name, e);
                self.report_error(&e).await;
                return Err(e.context(format!("Worker {} failed to reply", self.name)));
            }
        };

        let mut outbound = Message::assistant(text).named(self.name.clone());
        for interceptor in &self.interceptors {
            outbound = interceptor.on_before_send(outbound, false).await;
        }

        self.history.push(outbound.clone());
        Ok(outbound.content)
    }

    fn is_termination(&self, content: &str) -> bool {
        self.termination.matches(content)
    }
}
