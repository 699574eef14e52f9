//! Ordered chat history for a single session.

use serde::{Deserialize, Serialize};

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Bot,
    User,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bot => write!(f, "bot"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A single chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub origin: Origin,
    pub text: String,
}

/// Chat history in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    utterances: Vec<Utterance>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, origin: Origin, text: impl Into<String>) {
        self.utterances.push(Utterance {
            origin,
            text: text.into(),
        });
    }

    pub fn push_bot(&mut self, text: impl Into<String>) {
        self.push(Origin::Bot, text);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Origin::User, text);
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn clear(&mut self) {
        self.utterances.clear();
    }

    /// Most recent bot line, if any.
    pub fn last_bot(&self) -> Option<&str> {
        self.utterances
            .iter()
            .rev()
            .find(|u| u.origin == Origin::Bot)
            .map(|u| u.text.as_str())
    }

    /// The last `k` bot lines, oldest first. Fewer when the history is shorter.
    pub fn recent_bot_messages(&self, k: usize) -> Vec<&str> {
        let mut recent: Vec<&str> = self
            .utterances
            .iter()
            .rev()
            .filter(|u| u.origin == Origin::Bot)
            .take(k)
            .map(|u| u.text.as_str())
            .collect();
        recent.reverse();
        recent
    }
}
