use uuid::Uuid;

use crate::domain::agent::Author;
use crate::domain::message::Message;

/// Append-only transcript of a single orchestration attempt.
///
/// Turn indexes are assigned on append and strictly increase. The only way to drop history is
/// [`ConversationState::reset`], which discards every message and opens a new session.
#[derive(Clone, Debug)]
pub struct ConversationState {
    session_id: Uuid,
    attempt: u32,
    messages: Vec<Message>,
    next_turn: u32,
    attempt_start: usize,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            attempt: 1,
            messages: Vec::new(),
            next_turn: 0,
            attempt_start: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn append(&mut self, author: Author, content: impl Into<String>) -> &Message {
        let message = Message::new(author, content.into(), self.next_turn);
        self.next_turn += 1;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages committed since the current attempt started.
    pub fn attempt_messages(&self) -> &[Message] {
        &self.messages[self.attempt_start..]
    }

    pub fn attempt_len(&self) -> usize {
        self.messages.len() - self.attempt_start
    }

    /// Marks the transcript as carrying a later attempt without touching its history.
    /// Earlier turns stay readable but no longer count towards [`Self::attempt_len`].
    pub fn continue_as(&mut self, attempt: u32) {
        self.attempt = attempt;
        self.attempt_start = self.messages.len();
    }

    /// Full, lossy reset: history is discarded and a fresh session id is issued.
    pub fn reset(&mut self, attempt: u32) {
        self.session_id = Uuid::new_v4();
        self.attempt = attempt;
        self.messages.clear();
        self.next_turn = 0;
        self.attempt_start = 0;
    }
}
