//! Conversation message shapes shared between the agent loop and the
//! chat facade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human user.
    User,
    /// The LLM.
    Assistant,
    /// A system-level instruction (catalogue, grounding policy, etc.).
    System,
    /// A tool observation fed back into the loop.
    Tool,
}

/// A single message in a [`crate::Conversation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message.
    pub role: Role,
    /// Plain-text content. Tool observations are pre-serialized JSON text
    /// rather than a nested value, matching how the LLM provider wire
    /// format expects message content.
    pub content: String,
    /// When the message was appended.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Construct a message stamped with the given timestamp. Callers
    /// supply `now` rather than this module reaching for the clock, so
    /// loop code stays deterministic under test.
    pub fn new(role: Role, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
