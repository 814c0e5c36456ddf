use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MessageType;
use crate::providers::Message;

/// One message exchanged by a worker. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub message_type: MessageType,
    pub role: String,
    pub content: String,
    pub from_worker: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn message(message: &Message) -> Self {
        Self::new(MessageType::Message, message)
    }

    pub fn exception(role: impl Into<String>, content: impl Into<String>, from: Option<String>) -> Self {
        Self {
            message_type: MessageType::Exception,
            role: role.into(),
            content: content.into(),
            from_worker: from,
            created_at: Utc::now(),
        }
    }

    fn new(message_type: MessageType, message: &Message) -> Self {
        Self {
            message_type,
            role: message.role.clone(),
            content: message.content.clone(),
            from_worker: message.name.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn is_message(&self) -> bool {
        self.message_type == MessageType::Message
    }

    pub fn to_message(&self) -> Message {
        Message {
            role: self.role.clone(),
            content: self.content.clone(),
            name: self.from_worker.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_keeps_sender() {
        let msg = Message::assistant("hello").named("Analyst");
        let event = Event::message(&msg);
        assert!(event.is_message());
        assert_eq!(event.from_worker.as_deref(), Some("Analyst"));
        assert_eq!(event.to_message(), msg);

        let failure = Event::exception("assistant", "timeout", None);
        assert!(!failure.is_message());
    }
}
