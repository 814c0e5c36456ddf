use async_trait::async_trait;

use crate::providers::Message;

/// Hook invoked around a worker's message flow. Interceptors are given to a
/// worker before it first speaks and run in registration order.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Sees the message a worker is about to answer. The returned message is
    /// what the inference call gets; the stored history keeps the original.
    async fn on_receive(&self, message: Message) -> Message {
        message
    }

    /// Sees every message a worker sends, including silent replays.
    async fn on_before_send(&self, message: Message, _silent: bool) -> Message {
        message
    }

    /// Sees a collaborator failure raised while `source` was replying.
    async fn on_error(&self, _source: &str, _error: &str) {}
}
