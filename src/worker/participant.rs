use anyhow::Result;
use async_trait::async_trait;

use crate::providers::Message;

/// Anything that can take part in a conversation: a single worker or a whole
/// group behind its coordinator.
#[async_trait]
pub trait Participant: Send + Sync {
    fn name(&self) -> &str;

    /// Role description shown to an automatic speaker selector.
    fn description(&self) -> &str;

    /// Delivers a live message without asking for a reply.
    async fn receive(&mut self, message: Message);

    /// Delivers a message silently while rebuilding prior state. Must never
    /// be persisted again or trigger a reply.
    async fn replay(&mut self, message: Message);

    /// Replies to the last message received.
    async fn reply(&mut self) -> Result<String>;

    fn is_termination(&self, content: &str) -> bool;

    /// Shared transcript, for participants that keep one.
    fn transcript(&self) -> Option<&[Message]> {
        None
    }

    /// Opens a chat with this participant and returns the last message of
    /// that chat as its summary.
    async fn initiate(&mut self, sender: &str, opening: &str) -> Result<String> {
        self.receive(Message::user(opening).named(sender)).await;
        self.reply().await
    }
}
