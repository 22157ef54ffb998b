//! Message Normalizer
//!
//! Flattens a nested conversation export into one ordered sequence of
//! atomic messages. For each conversation in source order, all of its
//! `user_queries` are appended, then all of its `team_replies`. This is
//! append order, not chronological interleaving.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One conversation object from an input document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    /// Messages written by the user
    #[serde(default)]
    pub user_queries: Vec<RawEntry>,
    /// Messages written by the support team
    #[serde(default)]
    pub team_replies: Vec<RawEntry>,
}

/// A single raw message entry; unknown fields are ignored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEntry {
    /// Source-provided id (string or number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<serde_json::Value>,
    /// Message body
    #[serde(default)]
    pub message: String,
}

impl RawEntry {
    /// Convenience constructor with an explicit id
    pub fn new(message_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message_id: Some(serde_json::Value::String(message_id.into())),
            message: message.into(),
        }
    }

    /// Convenience constructor without an id
    pub fn anonymous(message: impl Into<String>) -> Self {
        Self {
            message_id: None,
            message: message.into(),
        }
    }

    fn id(&self) -> Option<String> {
        match self.message_id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    User,
    Team,
}

impl Sender {
    fn slug(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Team => "team",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "User"),
            Sender::Team => write!(f, "Team"),
        }
    }
}

/// An atomic message with a stable identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub conversation_index: usize,
}

/// Synthetic id used when the source omits `message_id`.
///
/// Not unique when one conversation has several id-less messages from the
/// same sender; `normalize` logs such collisions.
pub fn synthetic_id(sender: Sender, conversation_index: usize) -> String {
    format!("unknown_{}_{}", sender.slug(), conversation_index)
}

/// Flatten conversations into one ordered message sequence.
pub fn normalize(conversations: &[Conversation]) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut synthetic_seen: HashSet<String> = HashSet::new();

    for (conversation_index, conversation) in conversations.iter().enumerate() {
        let sources = [
            (Sender::User, &conversation.user_queries),
            (Sender::Team, &conversation.team_replies),
        ];
        for (sender, entries) in sources {
            for entry in entries {
                let id = match entry.id() {
                    Some(id) => id,
                    None => {
                        let id = synthetic_id(sender, conversation_index);
                        if !synthetic_seen.insert(id.clone()) {
                            tracing::warn!(
                                message_id = %id,
                                "Synthetic message id collides with an earlier message"
                            );
                        }
                        id
                    }
                };
                messages.push(Message {
                    id,
                    sender,
                    text: entry.message.clone(),
                    conversation_index,
                });
            }
        }
    }

    messages
}
