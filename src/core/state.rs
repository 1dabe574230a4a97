//! Per-session conversation state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::filters::{FilterSnapshot, PreferenceSnapshot};
use super::history::{Message, Speaker};
use super::item::RankedItem;
use super::table::ComparisonTable;

/// Everything the assistant remembers about one shopping session.
///
/// Exclusively owned by its session. The supervisor works on a private
/// copy during a turn and hands back the updated copy only when the turn
/// finishes, so an abandoned turn never commits partial state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Session identifier.
    pub session_id: String,
    /// Ordered message log.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Authoritative hard constraints. Replaced wholesale, never merged.
    #[serde(default)]
    pub filters: FilterSnapshot,
    /// Snapshot used by the last retrieval that actually ran.
    #[serde(default)]
    pub previous_filters: FilterSnapshot,
    /// Softer preference signals.
    #[serde(default)]
    pub preferences: PreferenceSnapshot,
    /// Last ranked results (capped).
    #[serde(default)]
    pub items: Vec<RankedItem>,
    /// Interview topics already asked about.
    #[serde(default)]
    pub topics_covered: BTreeSet<String>,
    /// Interview questions asked so far (ceiling counter).
    #[serde(default)]
    pub interview_turns: u32,
    /// Set once the interview has ended; never cleared within a session.
    #[serde(default)]
    pub interview_complete: bool,
    /// Last reply text.
    #[serde(default)]
    pub last_reply: Option<String>,
    /// Quick-reply options for the last interview question.
    #[serde(default)]
    pub short_answer_options: Option<Vec<String>>,
    /// Suggested follow-up prompts.
    #[serde(default)]
    pub followup_options: Vec<String>,
    /// Comparison table attached to the last reply.
    #[serde(default)]
    pub comparison_table: Option<ComparisonTable>,
}

impl ConversationState {
    /// Creates an empty state for a new session.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Returns `true` when the explicit filters constrain different fields
    /// or values than the snapshot used by the last retrieval. A certainty
    /// relabel alone is not a change.
    #[must_use]
    pub fn filters_changed(&self) -> bool {
        !self.filters.same_constraints(&self.previous_filters)
    }

    /// Number of user messages in the log.
    #[must_use]
    pub fn user_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Speaker::User)
            .count()
    }

    /// Most recent user message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Speaker::User)
            .map(|m| m.content.as_str())
    }

    /// Compact summary used by the classifier and its cache key.
    #[must_use]
    pub fn summary(&self) -> StateSummary {
        StateSummary {
            has_results: !self.items.is_empty(),
            result_count: self.items.len(),
            filter_count: self.filters.len(),
            interview_complete: self.interview_complete,
            topics_covered: self.topics_covered.len(),
            user_turns: self.user_turns(),
        }
    }
}

/// Booleans and counts that describe a state without its history.
///
/// Field order is fixed, so its JSON serialization is canonical and can be
/// embedded in cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateSummary {
    /// Whether ranked results exist.
    pub has_results: bool,
    /// Number of cached results.
    pub result_count: usize,
    /// Number of explicit filters.
    pub filter_count: usize,
    /// Whether the interview has ended.
    pub interview_complete: bool,
    /// Number of covered interview topics.
    pub topics_covered: usize,
    /// Number of user messages so far.
    pub user_turns: usize,
}

impl StateSummary {
    /// Canonical serialization for cache keys and prompts.
    #[must_use]
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filters::{Certainty, FilterSnapshot, FilterValue};
    use crate::core::item::item;

    #[test]
    fn test_new_state_is_empty() {
        let state = ConversationState::new("s1");
        assert_eq!(state.session_id, "s1");
        assert!(state.topics_covered.is_empty());
        assert!(!state.interview_complete);
        assert!(!state.filters_changed());
    }

    #[test]
    fn test_filters_changed() {
        let mut state = ConversationState::new("s1");
        state.filters.insert("body_style", FilterValue::explicit("suv"));
        assert!(state.filters_changed());
        state.previous_filters = state.filters.clone();
        assert!(!state.filters_changed());
    }

    #[test]
    fn test_certainty_relabel_is_not_a_change() {
        let mut state = ConversationState::new("s1");
        state.previous_filters = FilterSnapshot::new().with(
            "fuel_type",
            FilterValue::with_certainty("hybrid", Certainty::Inferred),
        );
        state.filters = FilterSnapshot::new().with("fuel_type", FilterValue::explicit("hybrid"));
        assert!(!state.filters_changed());

        state.filters = FilterSnapshot::new().with("fuel_type", FilterValue::explicit("diesel"));
        assert!(state.filters_changed());

        state.filters = state
            .previous_filters
            .clone()
            .with("body_style", FilterValue::explicit("suv"));
        assert!(state.filters_changed());
    }

    #[test]
    fn test_summary_counts() {
        let mut state = ConversationState::new("s1");
        state.messages.push(Message::user("hi"));
        state.messages.push(Message::assistant("hello"));
        state.messages.push(Message::user("suvs please"));
        state.items.push(item("a", "A", 1.0));
        let summary = state.summary();
        assert!(summary.has_results);
        assert_eq!(summary.result_count, 1);
        assert_eq!(summary.user_turns, 2);
        assert_eq!(state.last_user_message(), Some("suvs please"));
    }

    #[test]
    fn test_summary_canonical_stable() {
        let summary = ConversationState::new("s").summary();
        assert_eq!(summary.canonical(), summary.canonical());
        assert!(summary.canonical().starts_with("{\"has_results\":false"));
    }

    #[test]
    fn test_state_serde_roundtrip_defaults() {
        let state: ConversationState =
            serde_json::from_str(r#"{"session_id": "cli"}"#).unwrap_or_else(|_| unreachable!());
        assert_eq!(state, ConversationState::new("cli"));
    }
}
