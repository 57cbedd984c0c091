//! Conversation store - the ordered, append-only dialogue every request is built from.
//!
//! Index 0 always holds the seed prompt. Nothing in this API can remove,
//! reorder or mutate a message once it is appended.

use crate::llm::Message;

/// Ordered, append-only message history anchored on the seed prompt.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation from the original task prompt.
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(seed)],
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The original task prompt.
    pub fn seed(&self) -> &Message {
        &self.messages[0]
    }

    /// Most recently appended message; the seed when nothing was appended yet.
    pub fn last(&self) -> &Message {
        self.messages.last().unwrap_or(&self.messages[0])
    }

    /// Full history, used as-is for a work request.
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    /// `[seed, last, feedback prompt]` regardless of how long the history is.
    ///
    /// The judge sees only the task and the latest attempt, never earlier
    /// attempts or earlier feedback.
    pub fn feedback_window(&self, feedback_prompt: &str) -> [Message; 3] {
        [self.seed().clone(), self.last().clone(), Message::user(feedback_prompt)]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false; a conversation holds at least its seed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
