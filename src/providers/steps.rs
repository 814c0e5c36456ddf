use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::llm::{InferenceProvider, Message};
use crate::types::AgentContext;

/// Supplies the decomposition of a worker's task as a numbered plain-text
/// list (`1. first`, `2. second`, ...).
#[async_trait]
pub trait StepRetriever: Send + Sync {
    async fn retrieve_steps(&self, context: &AgentContext, ask: &str) -> Result<String>;
}

fn numbered_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^\s*\d+\.\s+(.*\S)\s*$").expect("valid step pattern"))
}

/// Extracts the text of every `<number>. <text>` line.
pub fn parse_numbered_steps(text: &str) -> Vec<String> {
    numbered_line()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Serves step lists from a table keyed by task name.
#[derive(Debug, Clone, Default)]
pub struct StaticStepRetriever {
    by_task: HashMap<String, Vec<String>>,
    fallback: Vec<String>,
}

impl StaticStepRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(mut self, task_name: impl Into<String>, steps: Vec<String>) -> Self {
        self.by_task.insert(task_name.into(), steps);
        self
    }

    pub fn with_fallback(mut self, steps: Vec<String>) -> Self {
        self.fallback = steps;
        self
    }
}

#[async_trait]
impl StepRetriever for StaticStepRetriever {
    async fn retrieve_steps(&self, context: &AgentContext, _ask: &str) -> Result<String> {
        let steps = self
            .by_task
            .get(&context.task_name)
            .unwrap_or(&self.fallback);

        Ok(steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Asks the inference provider to break the task down.
pub struct InferenceStepRetriever {
    provider: Arc<dyn InferenceProvider>,
}

impl InferenceStepRetriever {
    pub fn new(provider: Arc<dyn InferenceProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl StepRetriever for InferenceStepRetriever {
    async fn retrieve_steps(&self, context: &AgentContext, ask: &str) -> Result<String> {
        let messages = vec![
            Message::system(
                "You break tasks down into short, concrete steps. Respond ONLY with a numbered list, one step per line.",
            ),
            Message::user(format!(
                "Deliverable: {}\nRole: {}\n\nThis is the task: {}\n\nGive me the steps to be completed to accomplish this task.",
                context.plan.deliverable_name, context.task_name, ask
            )),
        ];

        let response = self.provider.complete(messages).await?;
        if parse_numbered_steps(&response).is_empty() {
            anyhow::bail!("Step retrieval returned no numbered steps");
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;
    use crate::types::PlanContext;

    fn context(name: &str) -> AgentContext {
        AgentContext::new(Arc::new(PlanContext::new("p", "Plan", "Report")), "1", name, "Lead")
    }

    #[test]
    fn test_parse_numbered_steps() {
        let text = "
            1. Get name of company
            2. Get how long the company's been in business
            not a step
            10.   Trailing spaces   
        ";
        assert_eq!(
            parse_numbered_steps(text),
            vec![
                "Get name of company",
                "Get how long the company's been in business",
                "Trailing spaces",
            ]
        );
        assert!(parse_numbered_steps("no steps here").is_empty());
    }

    #[tokio::test]
    async fn test_static_retriever_numbers_steps() {
        let retriever = StaticStepRetriever::new()
            .with_steps("Analyst", vec!["Get name".to_string(), "Get age".to_string()])
            .with_fallback(vec!["Do the work".to_string()]);

        let text = retriever.retrieve_steps(&context("Analyst"), "ask").await.unwrap();
        assert_eq!(text, "1. Get name\n2. Get age");

        let other = retriever.retrieve_steps(&context("Critic"), "ask").await.unwrap();
        assert_eq!(other, "1. Do the work");
    }

    #[tokio::test]
    async fn test_inference_retriever_rejects_unnumbered_reply() {
        let ok = InferenceStepRetriever::new(Arc::new(ScriptedProvider::repeating("1. Plan\n2. Write")));
        assert!(ok.retrieve_steps(&context("Writer"), "write").await.is_ok());

        let bad = InferenceStepRetriever::new(Arc::new(ScriptedProvider::repeating("Sure!")));
        assert!(bad.retrieve_steps(&context("Writer"), "write").await.is_err());
    }
}
