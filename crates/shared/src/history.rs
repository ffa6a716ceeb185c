use crate::models::{ChatMessage, Role};

pub const DEFAULT_MEMORY_WINDOW_TURNS: usize = 10;

/// Finalized turns of one session, oldest first. Only whole turns are
/// appended, so the sequence always alternates user/assistant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.messages.push(ChatMessage::user(user));
        self.messages.push(ChatMessage::assistant(assistant));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The most recent `max_turns` turns.
    pub fn window(&self, max_turns: usize) -> &[ChatMessage] {
        let mut start = self
            .messages
            .len()
            .saturating_sub(max_turns.saturating_mul(2));
        while self
            .messages
            .get(start)
            .is_some_and(|message| message.role != Role::User)
        {
            start += 1;
        }
        &self.messages[start..]
    }

    pub fn turn_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role == Role::User)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
