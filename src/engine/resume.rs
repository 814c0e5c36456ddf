use super::group::GroupCoordinator;
use crate::types::Event;
use crate::worker::Participant;

/// Rebuilds a freshly constructed group from its persisted conversation.
pub struct ResumeCoordinator;

impl ResumeCoordinator {
    /// Seeds the manager transcript with every prior message and replays
    /// each one, in order, to every member except its original sender.
    /// Exception events are not part of the conversation and are skipped.
    pub async fn prepare_resume(manager: &mut GroupCoordinator, prior_events: &[Event]) {
        let mut replayed = 0;
        for event in prior_events.iter().filter(|e| e.is_message()) {
            let message = event.to_message();
            manager.seed(message.clone());

            for member in manager.members_mut() {
                if event.from_worker.as_deref() == Some(member.name()) {
                    continue;
                }
                member.replay(message.as_received()).await;
            }
            replayed += 1;
        }

        if replayed > 0 {
            log::info!("Resumed group {} with {} prior messages", manager.name(), replayed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Message;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Listener {
        name: String,
        heard: Arc<Mutex<Vec<Message>>>,
    }

    #[async_trait]
    impl Participant for Listener {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "listens"
        }

        async fn receive(&mut self, _message: Message) {
            panic!("resume must not deliver live messages");
        }

        async fn replay(&mut self, message: Message) {
            self.heard.lock().unwrap().push(message);
        }

        async fn reply(&mut self) -> Result<String> {
            Ok(String::new())
        }

        fn is_termination(&self, _content: &str) -> bool {
            false
        }
    }

    fn listener(name: &str) -> (Box<dyn Participant>, Arc<Mutex<Vec<Message>>>) {
        let heard = Arc::new(Mutex::new(Vec::new()));
        let member = Listener {
            name: name.to_string(),
            heard: heard.clone(),
        };
        (Box::new(member), heard)
    }

    #[tokio::test]
    async fn test_replay_skips_original_sender() {
        let (analyst, analyst_heard) = listener("Analyst");
        let (critic, critic_heard) = listener("Critic");
        let mut group = GroupCoordinator::new("Review", "", vec![analyst, critic], 4);
        let events = vec![
            Event::message(&Message::user("start").named("Lead")),
            Event::message(&Message::assistant("draft").named("Analyst")),
            Event::exception("assistant", "timeout", Some("Critic".to_string())),
            Event::message(&Message::assistant("needs work").named("Critic")),
        ];

        ResumeCoordinator::prepare_resume(&mut group, &events).await;

        let transcript: Vec<_> = group.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(transcript, vec!["start", "draft", "needs work"]);
        assert_eq!(group.messages()[1].role, "assistant");

        let analyst_heard: Vec<_> = analyst_heard.lock().unwrap().iter().map(|m| m.content.clone()).collect();
        assert_eq!(analyst_heard, vec!["start", "needs work"]);

        let critic_heard = critic_heard.lock().unwrap().clone();
        assert_eq!(critic_heard.len(), 2);
        assert_eq!(critic_heard[1].content, "draft");
        assert_eq!(critic_heard[1].role, "user");
        assert_eq!(critic_heard[1].name.as_deref(), Some("Analyst"));
    }

    #[tokio::test]
    async fn test_nothing_to_resume() {
        let (analyst, heard) = listener("Analyst");
        let mut group = GroupCoordinator::new("Review", "", vec![analyst], 4);
        ResumeCoordinator::prepare_resume(&mut group, &[]).await;
        assert!(group.messages().is_empty());
        assert!(heard.lock().unwrap().is_empty());
    }
}
