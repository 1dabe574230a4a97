//! Guided interview: GREET, then one question per turn, then END.
//!
//! GREET is canned and costs no gateway call. Each ASK covers one new
//! topic; a repeated topic, a `done` answer, the shopper asking for
//! results, or the ASK ceiling all move to END. END re-extracts the full
//! transcript, searches once and presents the results. END never fails.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::discovery::discover;
use super::extractor::extract_filters;
use super::message::{OutputSchema, TokenUsage};
use super::prompt::build_interview_prompt;
use super::subagent::{
    Extraction, Invocation, InterviewUpdate, Services, SubAgent, SubAgentId, SubAgentResult,
};
use super::traits::{Agent, execute_structured};
use crate::core::history::render_transcript;
use crate::core::{ConversationState, HistoryPolicy};
use crate::error::AgentError;

/// Opening line for a fresh session.
pub const GREETING: &str = "Hi! I'm here to help you find the right vehicle. \
                            What will you mostly use it for?";

/// Quick replies offered with the greeting.
pub const GREETING_OPTIONS: [&str; 3] = ["Daily commuting", "Family trips", "Just browsing"];

#[derive(Debug, Deserialize)]
struct Question {
    #[serde(default)]
    text: String,
    #[serde(default)]
    short_answer_options: Vec<String>,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    done: bool,
}

/// Agent that asks the next interview question.
pub struct InterviewerAgent {
    model: String,
    system_prompt: String,
}

impl InterviewerAgent {
    /// Creates an interviewer agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.agent_model.clone(),
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for InterviewerAgent {
    fn name(&self) -> &'static str {
        "interviewer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.3
    }

    fn max_tokens(&self) -> u32 {
        300
    }

    fn output_schema(&self) -> Option<OutputSchema> {
        Some(OutputSchema {
            name: "interview_question",
            schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "short_answer_options": {"type": "array", "items": {"type": "string"}},
                    "topic": {"type": "string"},
                    "done": {"type": "boolean"}
                },
                "required": ["text", "short_answer_options", "topic", "done"],
                "additionalProperties": false
            }),
        })
    }
}

/// Why the interview is ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    Requested,
    Ceiling,
    Done,
    RepeatedTopic,
}

/// The interview sub-agent.
pub struct InterviewSubAgent;

impl InterviewSubAgent {
    fn greet() -> SubAgentResult {
        let mut result = SubAgentResult::text(SubAgentId::Interview, GREETING);
        result.short_answer_options = Some(GREETING_OPTIONS.iter().map(ToString::to_string).collect());
        result
    }

    async fn end(
        services: &Services,
        state: &ConversationState,
        reason: EndReason,
        mut usage: TokenUsage,
    ) -> SubAgentResult {
        info!(?reason, asked = state.interview_turns, "interview ending");

        let (filters, preferences) = match extract_filters(services, &state.messages).await {
            Ok(extracted) => {
                usage.accumulate(extracted.usage);
                (extracted.filters, extracted.preferences)
            }
            Err(e) => {
                warn!(error = %e, "terminal extraction failed, keeping existing filters");
                (state.filters.clone(), state.preferences.clone())
            }
        };

        let found = discover(services, state, &filters, &preferences).await;
        usage.accumulate(found.usage);

        let mut result = SubAgentResult::text(SubAgentId::Interview, found.text);
        result.items = Some(found.items);
        result.followup_options = found.followup_options;
        result.topics = found.topics;
        result.extraction = Some(Extraction {
            filters,
            preferences,
        });
        result.interview = Some(InterviewUpdate {
            turns: state.interview_turns,
            complete: true,
        });
        result.retrieval_ran = true;
        result.usage = usage;
        result
    }
}

#[async_trait]
impl SubAgent for InterviewSubAgent {
    fn id(&self) -> SubAgentId {
        SubAgentId::Interview
    }

    async fn run(
        &self,
        services: &Services,
        state: &ConversationState,
        invocation: &Invocation,
    ) -> Result<SubAgentResult, AgentError> {
        if state.user_turns() == 0 {
            debug!("interview greet");
            return Ok(Self::greet());
        }

        let force_end = matches!(invocation, Invocation::Interview { force_end: true });
        if force_end {
            return Ok(Self::end(services, state, EndReason::Requested, TokenUsage::default()).await);
        }
        let max_turns = services.config.interview_max_turns;
        if state.interview_turns >= max_turns {
            return Ok(Self::end(services, state, EndReason::Ceiling, TokenUsage::default()).await);
        }

        let agent = InterviewerAgent::new(&services.config, services.prompts.interviewer.clone());
        let prompt = build_interview_prompt(
            &render_transcript(&state.messages, HistoryPolicy::Full),
            &state.topics_covered,
            state.interview_turns + 1,
            max_turns,
        );
        let (question, response) =
            execute_structured::<Question>(&agent, &*services.provider, &prompt).await?;

        if question.done {
            return Ok(Self::end(services, state, EndReason::Done, response.usage).await);
        }

        let topic = question.topic.trim().to_lowercase();
        if state.topics_covered.contains(&topic) {
            debug!(topic, "interviewer repeated a covered topic");
            return Ok(Self::end(services, state, EndReason::RepeatedTopic, response.usage).await);
        }
        if question.text.trim().is_empty() {
            return Err(AgentError::InvalidResponse {
                message: "interviewer returned no question".to_string(),
            });
        }

        debug!(topic, turn = state.interview_turns + 1, "interview ask");
        let mut result = SubAgentResult::text(SubAgentId::Interview, question.text);
        result.short_answer_options = Some(question.short_answer_options);
        if !topic.is_empty() {
            result.topics = vec![topic];
        }
        result.interview = Some(InterviewUpdate {
            turns: state.interview_turns + 1,
            complete: false,
        });
        result.usage = response.usage;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{Reply, ScriptedProvider, services};
    use crate::core::item::item;
    use crate::core::{FilterSnapshot, FilterValue, Message};
    use crate::retrieval::InMemoryCatalog;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn catalog() -> Arc<InMemoryCatalog> {
        let mut suv = item("a", "Subaru Forester", 27_000.0);
        suv.attributes = BTreeMap::from([("body_style".to_string(), json!("suv"))]);
        Arc::new(InMemoryCatalog::new(vec![suv, item("b", "Mazda 3", 22_000.0)]))
    }

    fn ask(topic: &str, done: bool) -> Reply {
        Reply::json(&json!({
            "text": format!("What about {topic}?"),
            "short_answer_options": ["Yes", "No"],
            "topic": topic,
            "done": done
        }))
    }

    fn in_interview() -> ConversationState {
        let mut state = ConversationState::new("s");
        state.messages.push(Message::user("I want a new car"));
        state
    }

    fn extraction() -> Reply {
        Reply::json(&json!({
            "has_new_filters": true,
            "filters": {"body_style": {"value": "suv", "certainty": "explicit"}},
            "preferences": {}
        }))
    }

    fn narration() -> Reply {
        Reply::json(&json!({"text": "Meet the Forester.", "followup_options": [], "topics": []}))
    }

    #[tokio::test]
    async fn test_greet_without_gateway_call() {
        let provider = Arc::new(ScriptedProvider::new());
        let svc = services(Arc::clone(&provider), catalog());

        let result = InterviewSubAgent
            .run(&svc, &ConversationState::new("s"), &Invocation::Interview { force_end: false })
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(result.text, GREETING);
        assert_eq!(result.short_answer_options.as_ref().map(Vec::len), Some(3));
        assert!(result.interview.is_none());
        assert_eq!(provider.calls("interviewer"), 0);
    }

    #[tokio::test]
    async fn test_ask_adds_topic_and_counts_turn() {
        let provider = Arc::new(ScriptedProvider::new().on("interviewer", ask("Budget", false)));
        let svc = services(Arc::clone(&provider), catalog());

        let result = InterviewSubAgent
            .run(&svc, &in_interview(), &Invocation::Interview { force_end: false })
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(result.topics, vec!["budget".to_string()]);
        assert_eq!(
            result.interview,
            Some(InterviewUpdate {
                turns: 1,
                complete: false
            })
        );
        assert!(!result.retrieval_ran);
        assert_eq!(result.short_answer_options.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_repeated_topic_ends_interview() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("interviewer", ask("budget", false))
                .on("extractor", extraction())
                .on("narrator", narration()),
        );
        let svc = services(Arc::clone(&provider), catalog());
        let mut state = in_interview();
        state.topics_covered.insert("budget".to_string());
        state.interview_turns = 1;

        let result = InterviewSubAgent
            .run(&svc, &state, &Invocation::Interview { force_end: false })
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(result.interview.map(|u| u.complete), Some(true));
        assert!(result.retrieval_ran);
        assert_eq!(result.text, "Meet the Forester.");
        assert_eq!(result.items.as_ref().map(Vec::len), Some(1));
        assert_eq!(
            result
                .extraction
                .as_ref()
                .and_then(|e| e.filters.get("body_style"))
                .map(|v| v.value.clone()),
            Some(json!("suv"))
        );
    }

    #[tokio::test]
    async fn test_ceiling_ends_without_asking() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("extractor", extraction())
                .on("narrator", narration()),
        );
        let svc = services(Arc::clone(&provider), catalog());
        let mut state = in_interview();
        state.interview_turns = 8;

        let result = InterviewSubAgent
            .run(&svc, &state, &Invocation::Interview { force_end: false })
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(provider.calls("interviewer"), 0);
        assert_eq!(result.interview.map(|u| u.complete), Some(true));
    }

    #[tokio::test]
    async fn test_end_keeps_filters_when_terminal_extraction_fails() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("extractor", Reply::Timeout)
                .on("narrator", Reply::Timeout),
        );
        let svc = services(Arc::clone(&provider), catalog());
        let mut state = in_interview();
        state.filters = FilterSnapshot::new().with("body_style", FilterValue::explicit("suv"));

        let result = InterviewSubAgent
            .run(&svc, &state, &Invocation::Interview { force_end: true })
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(
            result.extraction.map(|e| e.filters),
            Some(state.filters.clone())
        );
        assert!(result.text.contains("Subaru Forester"));
        assert!(result.retrieval_ran);
    }

    #[tokio::test]
    async fn test_end_validates_snapshot_without_new_filters() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on(
                    "extractor",
                    Reply::json(&json!({
                        "has_new_filters": false,
                        "filters": {"body_style": {"value": "spaceship", "certainty": "explicit"}},
                        "preferences": {}
                    })),
                )
                .on("validator", Reply::json(&json!({"body_style": null})))
                .on("narrator", narration()),
        );
        let svc = services(Arc::clone(&provider), catalog());

        let result = InterviewSubAgent
            .run(&svc, &in_interview(), &Invocation::Interview { force_end: true })
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(provider.calls("validator"), 1);
        let filters = result.extraction.map(|e| e.filters).unwrap_or_default();
        assert!(filters.get("body_style").is_none());
        assert_eq!(result.items.as_ref().map(Vec::len), Some(2));
        assert!(result.retrieval_ran);
    }
}
