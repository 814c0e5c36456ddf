use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::transcript::persist_transcript;
use crate::config::SpeakerSelection;
use crate::providers::{InferenceProvider, Message};
use crate::worker::{Interceptor, Participant};

/// Runs bounded multi-party rounds over a shared transcript. A group is
/// itself a participant, so groups nest inside groups and steps.
pub struct GroupCoordinator {
    name: String,
    description: String,
    members: Vec<Box<dyn Participant>>,
    transcript: Vec<Message>,
    max_rounds: usize,
    selection: SpeakerSelection,
    selector: Option<Arc<dyn InferenceProvider>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    next_speaker: usize,
    transcript_dir: Option<PathBuf>,
}

impl GroupCoordinator {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        members: Vec<Box<dyn Participant>>,
        max_rounds: usize,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            members,
            transcript: Vec::new(),
            max_rounds,
            selection: SpeakerSelection::RoundRobin,
            selector: None,
            interceptors: Vec::new(),
            next_speaker: 0,
            transcript_dir: None,
        }
    }

    /// `Auto` needs a provider; without one it behaves like round robin.
    pub fn with_selection(
        mut self,
        selection: SpeakerSelection,
        selector: Option<Arc<dyn InferenceProvider>>,
    ) -> Self {
        self.selection = selection;
        self.selector = selector;
        self
    }

    /// Writes the transcript to `dir` each time a run finishes.
    pub fn with_transcript_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transcript_dir = Some(dir.into());
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn members(&self) -> &[Box<dyn Participant>] {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut [Box<dyn Participant>] {
        &mut self.members
    }

    pub fn messages(&self) -> &[Message] {
        &self.transcript
    }

    /// Appends to the transcript without notifying anyone.
    pub fn seed(&mut self, message: Message) {
        self.transcript.push(message);
    }

    /// Runs up to `max_rounds` replies and returns the last transcript
    /// message.
    pub async fn run(&mut self, max_rounds: usize) -> Result<String> {
        if self.members.is_empty() {
            bail!("Group {} has no participants", self.name);
        }

        for round in 1..=max_rounds {
            let speaker = self.select_speaker().await;
            let speaker_name = self.members[speaker].name().to_string();
            log::debug!("Group {} round {}: {} speaks", self.name, round, speaker_name);

            match self.members[speaker].reply().await {
                Ok(content) => {
                    let message = Message::assistant(content.clone()).named(speaker_name.clone());
                    self.record(message, Some(speaker)).await;
                    if self.members.iter().any(|m| m.is_termination(&content)) {
                        log::info!("Group {} terminated by {} after {} rounds", self.name, speaker_name, round);
                        break;
                    }
                }
                Err(e) => {
                    let error = format!("{:#}", e);
                    log::warn!("Participant {} in group {} failed: {}", speaker_name, self.name, error);
                    for interceptor in &self.interceptors {
                        interceptor.on_error(&speaker_name, &error).await;
                    }
                    let notice = Message::user(format!("Error from {}: {}", speaker_name, error))
                        .named(self.name.clone());
                    self.record(notice, None).await;
                }
            }
        }

        self.save_transcript().await;
        Ok(self
            .transcript
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default())
    }

    async fn save_transcript(&self) {
        let Some(dir) = &self.transcript_dir else {
            return;
        };
        if let Err(e) = persist_transcript(dir, &self.name, &self.transcript).await {
            log::warn!("Failed to save transcript of {}: {:#}", self.name, e);
        }
    }

    /// Appends to the transcript and delivers to every member except the
    /// speaker.
    async fn record(&mut self, message: Message, speaker: Option<usize>) {
        let mut message = message;
        for interceptor in &self.interceptors {
            message = interceptor.on_before_send(message, false).await;
        }
        self.transcript.push(message.clone());

        for (index, member) in self.members.iter_mut().enumerate() {
            if Some(index) != speaker {
                member.receive(message.clone()).await;
            }
        }
    }

    async fn select_speaker(&mut self) -> usize {
        if self.selection == SpeakerSelection::Auto {
            if let Some(index) = self.auto_select().await {
                self.next_speaker = index + 1;
                return index;
            }
        }
        self.round_robin()
    }

    fn round_robin(&mut self) -> usize {
        let index = self.next_speaker % self.members.len();
        self.next_speaker = index + 1;
        index
    }

    async fn auto_select(&mut self) -> Option<usize> {
        let selector = self.selector.clone()?;
        let prompt = self.selection_prompt();

        match selector.complete(prompt).await {
            Ok(answer) => {
                let picked = pick_member(&answer, self.members.iter().map(|m| m.name()));
                if picked.is_none() {
                    log::debug!("Speaker selector answer '{}' names no member of {}", answer, self.name);
                }
                picked
            }
            Err(e) => {
                log::warn!("Speaker selection failed in group {}: {}", self.name, e);
                None
            }
        }
    }

    fn selection_prompt(&self) -> Vec<Message> {
        let roles = self
            .members
            .iter()
            .map(|m| format!("{}: {}", m.name(), m.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let names = self.members.iter().map(|m| m.name()).collect::<Vec<_>>().join(", ");

        let mut prompt = Vec::with_capacity(self.transcript.len() + 2);
        prompt.push(Message::system(format!(
            "You are in a role play game. The following roles are available:\n{}\n\n\
             Read the following conversation. Then select the next role from [{}] to play. Only return the role.",
            roles, names
        )));
        prompt.extend(self.transcript.iter().cloned());
        prompt.push(Message::user(format!(
            "Read the above conversation. Then select the next role from [{}] to play. Only return the role.",
            names
        )));
        prompt
    }
}

/// Exact match first, then the first member whose name the answer mentions.
fn pick_member<'a>(answer: &str, names: impl Iterator<Item = &'a str> + Clone) -> Option<usize> {
    let answer = answer.trim();
    names
        .clone()
        .position(|name| name == answer)
        .or_else(|| names.clone().position(|name| answer.contains(name)))
}

#[async_trait]
impl Participant for GroupCoordinator {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn receive(&mut self, message: Message) {
        self.record(message, None).await;
    }

    async fn replay(&mut self, message: Message) {
        let mut message = message;
        for interceptor in &self.interceptors {
            message = interceptor.on_before_send(message, true).await;
        }
        self.transcript.push(message.clone());
        for member in self.members.iter_mut() {
            member.replay(message.as_received()).await;
        }
    }

    async fn reply(&mut self) -> Result<String> {
        self.run(self.max_rounds).await
    }

    fn is_termination(&self, content: &str) -> bool {
        self.members.iter().any(|m| m.is_termination(content))
    }

    fn transcript(&self) -> Option<&[Message]> {
        Some(&self.transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;
    use crate::worker::{Termination, Worker};

    fn worker(name: &str, replies: &[&str]) -> Box<dyn Participant> {
        let provider = ScriptedProvider::new(replies.iter().map(|r| r.to_string()).collect());
        Box::new(
            Worker::new(name, format!("{} role", name), Arc::new(provider))
                .with_termination(Termination::Keyword("TERMINATE".to_string())),
        )
    }

    struct Broken;

    #[async_trait]
    impl InferenceProvider for Broken {
        async fn complete(&self, _messages: Vec<Message>) -> Result<String> {
            bail!("quota exceeded")
        }
    }

    #[tokio::test]
    async fn test_round_robin_until_max_rounds() {
        let members = vec![
            worker("Analyst", &["a1", "a2", "a3"]),
            worker("Critic", &["c1", "c2", "c3"]),
        ];
        let mut group = GroupCoordinator::new("Review", "Reviews work", members, 3);

        let last = group.initiate("Lead", "start").await.unwrap();
        assert_eq!(last, "a2");

        let texts: Vec<_> = group.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["start", "a1", "c1", "a2"]);
        assert_eq!(group.messages()[2].name.as_deref(), Some("Critic"));
    }

    #[tokio::test]
    async fn test_termination_stops_the_group() {
        let members = vec![
            worker("Analyst", &["draft"]),
            worker("Critic", &["Looks good. TERMINATE"]),
            worker("Writer", &["never"]),
        ];
        let mut group = GroupCoordinator::new("Review", "Reviews work", members, 12);

        let last = group.initiate("Lead", "start").await.unwrap();
        assert_eq!(last, "Looks good. TERMINATE");
        assert_eq!(group.messages().len(), 3);
        assert!(group.is_termination(&last));
    }

    #[tokio::test]
    async fn test_auto_selection_uses_selector_and_falls_back() {
        let members = vec![worker("Analyst", &["a1"]), worker("Critic", &["c1", "c2"])];
        let selector = ScriptedProvider::new(vec!["Critic".to_string(), "nobody in particular".to_string()]);
        let mut group = GroupCoordinator::new("Review", "Reviews work", members, 2)
            .with_selection(SpeakerSelection::Auto, Some(Arc::new(selector)));

        group.initiate("Lead", "start").await.unwrap();

        let speakers: Vec<_> = group.messages()[1..]
            .iter()
            .map(|m| m.name.clone().unwrap_or_default())
            .collect();
        // Second answer names no member, so round robin continues after the
        // Critic and wraps to the Analyst.
        assert_eq!(speakers, vec!["Critic", "Analyst"]);
    }

    #[test]
    fn test_pick_member() {
        let names = ["Analyst", "Critic"];
        assert_eq!(pick_member(" Critic\n", names.iter().copied()), Some(1));
        assert_eq!(pick_member("I pick the Analyst.", names.iter().copied()), Some(0));
        assert_eq!(pick_member("Writer", names.iter().copied()), None);
    }

    #[tokio::test]
    async fn test_member_failure_is_posted_as_notice() {
        let failing: Box<dyn Participant> = Box::new(Worker::new("Writer", "Writes", Arc::new(Broken)));
        let members = vec![failing, worker("Critic", &["noted"])];
        let mut group = GroupCoordinator::new("Review", "Reviews work", members, 2);

        let last = group.initiate("Lead", "start").await.unwrap();
        assert_eq!(last, "noted");

        let notice = &group.messages()[1];
        assert_eq!(notice.name.as_deref(), Some("Review"));
        assert!(notice.content.starts_with("Error from Writer:"));
        assert!(notice.content.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_transcript_is_saved_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let members = vec![worker("Analyst", &["a1 TERMINATE"])];
        let mut group =
            GroupCoordinator::new("Review", "Reviews work", members, 4).with_transcript_dir(dir.path());

        group.initiate("Lead", "start").await.unwrap();

        let saved = crate::engine::transcript::load_transcript(dir.path(), "Review")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved, group.messages());
    }

    #[tokio::test]
    async fn test_empty_group_fails() {
        let mut group = GroupCoordinator::new("Empty", "", vec![], 3);
        assert!(group.run(3).await.is_err());
    }
}
