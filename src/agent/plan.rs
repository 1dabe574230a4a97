//! Execution planning.
//!
//! Turns a classification plus the post-extraction state into the set of
//! sub-agents to run this turn. Planning is a pure function so every
//! routing rule is testable without a gateway.

use std::collections::BTreeMap;

use super::classifier::ClassificationResult;
use super::subagent::{Invocation, SubAgentId};
use crate::core::ConversationState;

/// Sub-agents to run this turn, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan(BTreeMap<SubAgentId, Invocation>);

impl ExecutionPlan {
    /// A plan running exactly one invocation.
    #[must_use]
    pub fn single(invocation: Invocation) -> Self {
        let mut plan = Self::default();
        plan.add(invocation);
        plan
    }

    fn add(&mut self, invocation: Invocation) {
        self.0.insert(invocation.id(), invocation);
    }

    /// Whether `id` is planned.
    #[must_use]
    pub fn contains(&self, id: SubAgentId) -> bool {
        self.0.contains_key(&id)
    }

    /// Planned ids, in plan order.
    #[must_use]
    pub fn ids(&self) -> Vec<SubAgentId> {
        self.0.keys().copied().collect()
    }

    /// Number of planned sub-agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates invocations in plan order.
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.0.values()
    }

    /// Whether the single planned result can be the reply as is.
    #[must_use]
    pub fn bypasses_synthesis(&self) -> bool {
        self.len() == 1 && (self.contains(SubAgentId::General) || self.contains(SubAgentId::Interview))
    }
}

/// Builds the plan for one turn.
///
/// `state` must already carry this turn's extraction so that
/// [`ConversationState::filters_changed`] reflects it.
#[must_use]
pub fn build_plan(
    classification: &ClassificationResult,
    state: &ConversationState,
    message: &str,
) -> ExecutionPlan {
    let filters_changed = state.filters_changed();
    let has_questions = !classification.analytical_questions.is_empty();

    let pure_chat = classification.is_general_conversation
        && !classification.needs_interview
        && !classification.needs_search
        && !classification.needs_analytical
        && !classification.has_filter_update
        && !has_questions
        && !filters_changed;
    if pure_chat {
        return ExecutionPlan::single(Invocation::General);
    }

    let mut plan = ExecutionPlan::default();

    if !state.interview_complete && classification.needs_interview {
        plan.add(Invocation::Interview {
            force_end: classification.needs_search,
        });
    }

    if classification.needs_analytical || has_questions {
        let questions = if has_questions {
            classification.analytical_questions.clone()
        } else {
            vec![message.trim().to_string()]
        };
        plan.add(Invocation::Analytical { questions });
    }

    let wants_search = classification.needs_search
        || filters_changed
        || (classification.has_filter_update && state.items.is_empty());
    if !plan.contains(SubAgentId::Interview) && wants_search {
        plan.add(Invocation::Search);
    }

    if plan.is_empty() {
        plan.add(Invocation::General);
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item::item;
    use crate::core::{FilterSnapshot, FilterValue};
    use test_case::test_case;

    fn class(
        interview: bool,
        search: bool,
        analytical: bool,
        filter_update: bool,
        general: bool,
    ) -> ClassificationResult {
        ClassificationResult {
            needs_interview: interview,
            needs_search: search,
            needs_analytical: analytical,
            has_filter_update: filter_update,
            is_general_conversation: general,
            ..ClassificationResult::default()
        }
    }

    fn settled() -> ConversationState {
        let mut state = ConversationState::new("s");
        state.interview_complete = true;
        state.items = vec![item("a", "Mazda 3", 20_000.0)];
        state
    }

    use SubAgentId::{Analytical, General, Interview, Search};

    #[test_case(class(false, false, false, false, true), &[General]; "pure chat")]
    #[test_case(class(false, true, false, false, false), &[Search]; "search only")]
    #[test_case(class(false, false, true, false, false), &[Analytical]; "analytical only")]
    #[test_case(class(false, true, true, false, false), &[Search, Analytical]; "search and analytical")]
    #[test_case(class(false, false, false, false, false), &[General]; "empty falls back")]
    #[test_case(class(true, true, false, false, false), &[Search]; "interview ignored once complete")]
    #[test_case(class(false, false, false, true, false), &[General]; "filter update with results and no change")]
    fn test_plan_settled_session(classification: ClassificationResult, expected: &[SubAgentId]) {
        assert_eq!(build_plan(&classification, &settled(), "msg").ids(), expected);
    }

    #[test]
    fn test_interview_excludes_search_and_carries_force_end() {
        let state = ConversationState::new("s");
        let plan = build_plan(&class(true, true, true, false, false), &state, "show me");
        assert_eq!(plan.ids(), vec![Interview, Analytical]);
        assert!(
            plan.invocations()
                .any(|i| *i == Invocation::Interview { force_end: true })
        );
        assert!(!plan.bypasses_synthesis());
    }

    #[test]
    fn test_filter_change_forces_search() {
        let mut state = settled();
        state.filters = FilterSnapshot::new().with("fuel_type", FilterValue::explicit("hybrid"));
        let plan = build_plan(&class(false, false, false, false, true), &state, "hybrid please");
        assert_eq!(plan.ids(), vec![Search]);
    }

    #[test]
    fn test_filter_update_without_results_searches() {
        let mut state = settled();
        state.items.clear();
        let plan = build_plan(&class(false, false, false, true, false), &state, "under 30k");
        assert_eq!(plan.ids(), vec![Search]);
    }

    #[test]
    fn test_message_becomes_default_question() {
        let plan = build_plan(&class(false, false, true, false, false), &settled(), "  is it reliable? ");
        assert_eq!(
            plan.invocations().next(),
            Some(&Invocation::Analytical {
                questions: vec!["is it reliable?".to_string()]
            })
        );
    }

    #[test]
    fn test_explicit_questions_win_over_message() {
        let mut classification = class(false, false, false, false, false);
        classification.analytical_questions = vec!["Which is safer?".to_string()];
        let plan = build_plan(&classification, &settled(), "hmm");
        assert_eq!(
            plan.invocations().next(),
            Some(&Invocation::Analytical {
                questions: vec!["Which is safer?".to_string()]
            })
        );
    }

    #[test_case(ExecutionPlan::single(Invocation::General), true; "general alone")]
    #[test_case(ExecutionPlan::single(Invocation::Interview { force_end: false }), true; "interview alone")]
    #[test_case(ExecutionPlan::single(Invocation::Search), false; "search alone")]
    fn test_bypass(plan: ExecutionPlan, expected: bool) {
        assert_eq!(plan.bypasses_synthesis(), expected);
    }
}
