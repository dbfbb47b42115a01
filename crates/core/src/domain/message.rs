use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentId, Author};
use crate::domain::payload::{PayloadError, TaggedPayload};

/// One committed turn. Content is kept verbatim; interpretation happens on demand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    author: Author,
    content: String,
    turn_index: u32,
}

impl Message {
    pub(crate) fn new(author: Author, content: String, turn_index: u32) -> Self {
        Self { author, content, turn_index }
    }

    pub fn author(&self) -> Author {
        self.author
    }

    pub fn agent(&self) -> Option<AgentId> {
        self.author.agent()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn turn_index(&self) -> u32 {
        self.turn_index
    }

    pub fn payload(&self) -> Result<TaggedPayload, PayloadError> {
        TaggedPayload::parse(&self.content)
    }
}
