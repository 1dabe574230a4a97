//! Analytical question answering.
//!
//! Runs a bounded tool loop over the catalog and the results the shopper
//! has already seen, lifts any markdown comparison table out of the
//! answer, and asks an independent verifier whether the answer is backed
//! by what the tools returned. Weakly supported answers get a hedge.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::executor::ToolExecutor;
use super::message::OutputSchema;
use super::prompt::{build_analyst_prompt, build_verifier_prompt};
use super::subagent::{Invocation, Services, SubAgent, SubAgentId, SubAgentResult};
use super::tool::{ToolDefinition, ToolSet};
use super::traits::{Agent, execute_structured, execute_with_tools};
use crate::core::history::render_transcript;
use crate::core::{ComparisonTable, ConversationState, HistoryPolicy};
use crate::error::AgentError;

/// Sentence appended to answers the verifier does not back.
pub const HEDGE: &str = "I'm not fully certain about all of this, so please double-check \
                         the details with the seller before deciding.";

/// Agent that answers questions with tools.
pub struct AnalystAgent {
    model: String,
    max_tokens: u32,
    max_tool_iterations: usize,
    system_prompt: String,
}

impl AnalystAgent {
    /// Creates an analyst agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.agent_model.clone(),
            max_tokens: config.max_tokens,
            max_tool_iterations: config.max_tool_iterations,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for AnalystAgent {
    fn name(&self) -> &'static str {
        "analyst"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.1
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        ToolSet::analytical_tools().definitions().to_vec()
    }

    fn max_tool_iterations(&self) -> usize {
        self.max_tool_iterations
    }
}

/// Verifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Verdict {
    /// Whether the evidence backs the answer.
    pub supported: bool,
    /// Confidence in the judgment, 0 to 1.
    pub confidence: f32,
}

impl Verdict {
    /// Returns `true` when the answer should carry a hedge.
    #[must_use]
    pub fn needs_hedge(&self, threshold: f32) -> bool {
        !self.supported || self.confidence < threshold
    }
}

/// Agent that checks an answer against tool evidence.
pub struct VerifierAgent {
    model: String,
    system_prompt: String,
}

impl VerifierAgent {
    /// Creates a verifier agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.classifier_model.clone(),
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for VerifierAgent {
    fn name(&self) -> &'static str {
        "verifier"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> u32 {
        100
    }

    fn output_schema(&self) -> Option<OutputSchema> {
        Some(OutputSchema {
            name: "verdict",
            schema: json!({
                "type": "object",
                "properties": {
                    "supported": {"type": "boolean"},
                    "confidence": {"type": "number", "minimum": 0, "maximum": 1}
                },
                "required": ["supported", "confidence"],
                "additionalProperties": false
            }),
        })
    }
}

/// The analytical sub-agent.
pub struct AnalyticalSubAgent;

#[async_trait]
impl SubAgent for AnalyticalSubAgent {
    fn id(&self) -> SubAgentId {
        SubAgentId::Analytical
    }

    async fn run(
        &self,
        services: &Services,
        state: &ConversationState,
        invocation: &Invocation,
    ) -> Result<SubAgentResult, AgentError> {
        let questions = match invocation {
            Invocation::Analytical { questions } if !questions.is_empty() => questions.clone(),
            _ => state
                .last_user_message()
                .map(|m| vec![m.to_string()])
                .unwrap_or_default(),
        };
        if questions.is_empty() {
            return Err(AgentError::Orchestration {
                message: "analytical agent invoked without a question".to_string(),
            });
        }

        let config = &services.config;
        let analyst = AnalystAgent::new(config, services.prompts.analyst.clone());
        let executor = ToolExecutor::new(Arc::clone(&services.retrieval), state.items.clone());
        let prompt = build_analyst_prompt(
            &render_transcript(&state.messages, HistoryPolicy::LastK(config.history_window)),
            &questions,
            &state.items,
        );

        let response = execute_with_tools(&analyst, &*services.provider, &prompt, &executor).await?;
        if response.content.trim().is_empty() {
            return Err(AgentError::NotFound {
                what: format!("an answer to {:?}", questions.join(" / ")),
            });
        }
        let mut usage = response.usage;
        debug!(
            tool_calls = response.tool_outputs.len(),
            "analytical answer drafted"
        );

        let table = ComparisonTable::parse(&response.content);
        if table.is_none() && response.content.contains('|') {
            debug!("answer has no parseable comparison table, keeping prose");
        }

        let verifier = VerifierAgent::new(config, services.prompts.verifier.clone());
        let verification = build_verifier_prompt(&questions, &response.content, &response.tool_outputs);
        let mut text = response.content;
        match execute_structured::<Verdict>(&verifier, &*services.provider, &verification).await {
            Ok((verdict, v)) => {
                usage.accumulate(v.usage);
                debug!(
                    supported = verdict.supported,
                    confidence = verdict.confidence,
                    "answer verified"
                );
                if verdict.needs_hedge(config.verification_threshold) {
                    text = format!("{}\n\n{HEDGE}", text.trim_end());
                }
            }
            Err(e) => warn!(error = %e, "verification failed, answer left unhedged"),
        }

        let mut result = SubAgentResult::text(SubAgentId::Analytical, text);
        result.table = table;
        result.usage = usage;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{Reply, ScriptedProvider, services};
    use crate::agent::tool::GET_SHOWN_ITEM;
    use crate::core::Message;
    use crate::core::item::item;
    use crate::error::FailureKind;
    use crate::retrieval::InMemoryCatalog;
    use test_case::test_case;

    const TABLE_ANSWER: &str = "Here's how they compare:\n\n\
        | | RAV4 | CR-V |\n\
        |---|---|---|\n\
        | Price | $28,000 | $29,000 |\n\
        | MPG | 30 | 28 |\n\n\
        The RAV4 is a bit cheaper.";

    fn state() -> ConversationState {
        let mut state = ConversationState::new("s");
        state.items = vec![
            item("a", "Toyota RAV4", 28_000.0),
            item("b", "Honda CR-V", 29_000.0),
        ];
        state.messages.push(Message::user("compare the first two"));
        state
    }

    fn invocation() -> Invocation {
        Invocation::Analytical {
            questions: vec!["How do the RAV4 and CR-V compare?".to_string()],
        }
    }

    async fn run(provider: ScriptedProvider) -> (Result<SubAgentResult, AgentError>, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let svc = services(Arc::clone(&provider), Arc::new(InMemoryCatalog::default()));
        let result = AnalyticalSubAgent.run(&svc, &state(), &invocation()).await;
        (result, provider)
    }

    #[tokio::test]
    async fn test_tool_loop_table_and_supported_verdict() {
        let (result, provider) = run(ScriptedProvider::new()
            .on("analyst", Reply::tool(GET_SHOWN_ITEM, &json!({"position": 1})))
            .on("analyst", Reply::Text(TABLE_ANSWER.to_string()))
            .on("verifier", Reply::json(&json!({"supported": true, "confidence": 0.9}))))
        .await;
        let result = result.unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(result.text, TABLE_ANSWER);
        let table = result.table.unwrap_or_else(|| unreachable!("table expected"));
        assert_eq!(table.items, vec!["RAV4".to_string(), "CR-V".to_string()]);
        assert_eq!(table.rows.len(), 2);

        let verifier_prompt = &provider.requests("verifier")[0].messages[1].content;
        assert!(verifier_prompt.contains("Toyota RAV4"));
    }

    #[test_case(false, 0.95; "unsupported")]
    #[test_case(true, 0.4; "low confidence")]
    fn test_verdict_needs_hedge(supported: bool, confidence: f32) {
        assert!(Verdict { supported, confidence }.needs_hedge(0.6));
    }

    #[tokio::test]
    async fn test_low_confidence_appends_hedge() {
        let (result, _) = run(ScriptedProvider::new()
            .on("analyst", Reply::Text("The RAV4 gets 30 mpg.".to_string()))
            .on("verifier", Reply::json(&json!({"supported": true, "confidence": 0.3}))))
        .await;
        let result = result.unwrap_or_else(|e| unreachable!("{e}"));
        assert!(result.text.starts_with("The RAV4 gets 30 mpg."));
        assert!(result.text.ends_with(HEDGE));
        assert!(result.table.is_none());
    }

    #[tokio::test]
    async fn test_verifier_failure_leaves_answer_unhedged() {
        let (result, _) = run(ScriptedProvider::new()
            .on("analyst", Reply::Text("The RAV4 gets 30 mpg.".to_string()))
            .on("verifier", Reply::Timeout))
        .await;
        assert_eq!(
            result.map(|r| r.text).ok().as_deref(),
            Some("The RAV4 gets 30 mpg.")
        );
    }

    #[tokio::test]
    async fn test_tool_loop_exhaustion_is_slow() {
        let (result, _) = run(ScriptedProvider::new()
            .on("analyst", Reply::tool(GET_SHOWN_ITEM, &json!({"position": 1}))))
        .await;
        let err = result.err().unwrap_or_else(|| unreachable!("error expected"));
        assert_eq!(err.failure_kind(), FailureKind::Slow);
    }

    #[tokio::test]
    async fn test_gateway_failures_map_to_categories() {
        let (rate, _) = run(ScriptedProvider::new().on("analyst", Reply::RateLimited)).await;
        assert_eq!(rate.err().map(|e| e.failure_kind()), Some(FailureKind::RateLimited));

        let (empty, _) = run(ScriptedProvider::new().on("analyst", Reply::Text("  ".into()))).await;
        assert_eq!(empty.err().map(|e| e.failure_kind()), Some(FailureKind::NotFound));
    }
}
