//! Conversation log types and the shared history-windowing utility.
//!
//! Every component that feeds history to the model goes through
//! [`window`] with an explicit [`HistoryPolicy`], so "how much context
//! does this call see" is decided in one place.

use serde::{Deserialize, Serialize};

/// Who sent a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The shopper.
    User,
    /// The assistant.
    Assistant,
}

impl Speaker {
    /// Label used when rendering transcripts.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry in the session's ordered message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sender.
    pub role: Speaker,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            content: content.into(),
        }
    }
}

/// How much of the history a consumer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// The entire log. Used where re-derivation must see retractions.
    Full,
    /// Only the most recent `k` messages.
    LastK(usize),
}

/// Returns the slice of `messages` visible under `policy`.
#[must_use]
pub fn window(messages: &[Message], policy: HistoryPolicy) -> &[Message] {
    match policy {
        HistoryPolicy::Full => messages,
        HistoryPolicy::LastK(k) => &messages[messages.len().saturating_sub(k)..],
    }
}

/// Renders a windowed history as a plain transcript block.
#[must_use]
pub fn render_transcript(messages: &[Message], policy: HistoryPolicy) -> String {
    window(messages, policy)
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
