//! Response synthesis.
//!
//! Blends the fragments produced by the sub-agents of one turn into a
//! single reply. One fragment passes through untouched; two or more go
//! through one gateway call with role tags that fix the reading order.
//! UI hints never go through the model: interview quick replies and the
//! comparison table are carried over verbatim.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::TokenUsage;
use super::prompt::build_synthesizer_prompt;
use super::subagent::{Services, SubAgentId, SubAgentResult};
use super::traits::Agent;
use crate::core::ComparisonTable;

/// Reply used when no sub-agent produced anything.
pub const INVITATION: &str = "Tell me a bit about what you're looking for and I'll find \
                              some good options for you.";

/// Agent that blends several fragments into one reply.
pub struct SynthesizerAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl SynthesizerAgent {
    /// Creates a new synthesizer agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.synthesizer_model.clone(),
            max_tokens: config.max_tokens,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for SynthesizerAgent {
    fn name(&self) -> &'static str {
        "synthesizer"
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
        self.max_tokens
    }
}

/// The blended reply and the hints that travel with it.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    /// Reply text.
    pub text: String,
    /// Interview quick replies, verbatim.
    pub short_answer_options: Option<Vec<String>>,
    /// Suggested next questions.
    pub followup_options: Vec<String>,
    /// Analytical comparison table.
    pub table: Option<ComparisonTable>,
    /// Usage of the synthesis call, if one was made.
    pub usage: TokenUsage,
}

/// Reading order of each producer in a blended reply.
const fn rank(id: SubAgentId) -> u8 {
    match id {
        SubAgentId::Analytical => 0,
        SubAgentId::Search => 1,
        SubAgentId::Interview => 2,
        SubAgentId::General => 3,
    }
}

/// Instruction tag attached to each producer's fragment.
#[must_use]
pub const fn role_tag(id: SubAgentId) -> &'static str {
    match id {
        SubAgentId::Analytical => "ANSWER FIRST",
        SubAgentId::Search => "PRESENT ITEMS",
        SubAgentId::Interview => "ASK LAST",
        SubAgentId::General => "MENTION BRIEFLY",
    }
}

fn ordered(results: &[SubAgentResult]) -> Vec<&SubAgentResult> {
    let mut ordered: Vec<&SubAgentResult> = results.iter().collect();
    ordered.sort_by_key(|r| rank(r.id));
    ordered
}

fn hints(ordered: &[&SubAgentResult]) -> Synthesis {
    Synthesis {
        short_answer_options: ordered
            .iter()
            .find(|r| r.id == SubAgentId::Interview)
            .and_then(|r| r.short_answer_options.clone()),
        followup_options: ordered
            .iter()
            .find(|r| !r.followup_options.is_empty())
            .map(|r| r.followup_options.clone())
            .unwrap_or_default(),
        table: ordered.iter().find_map(|r| r.table.clone()),
        ..Synthesis::default()
    }
}

/// Joins fragments in reading order without a gateway call.
#[must_use]
pub fn merge_in_order(results: &[SubAgentResult]) -> String {
    ordered(results)
        .iter()
        .map(|r| r.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Blends the results of one turn into a single reply.
///
/// Never fails: a failed or empty synthesis call degrades to
/// [`merge_in_order`].
pub async fn synthesize(services: &Services, message: &str, results: &[SubAgentResult]) -> Synthesis {
    let ordered = ordered(results);
    let mut synthesis = hints(&ordered);

    match ordered.as_slice() {
        [] => {
            synthesis.text = INVITATION.to_string();
            return synthesis;
        }
        [only] => {
            synthesis.text.clone_from(&only.text);
            return synthesis;
        }
        _ => {}
    }

    let parts: Vec<(&str, &str)> = ordered
        .iter()
        .filter(|r| !r.text.trim().is_empty())
        .map(|r| (role_tag(r.id), r.text.as_str()))
        .collect();
    let prompt = build_synthesizer_prompt(message, &parts, services.config.synthesis_word_budget);
    let agent = SynthesizerAgent::new(&services.config, services.prompts.synthesizer.clone());

    match agent.execute(&*services.provider, &prompt).await {
        Ok(response) => {
            debug!(parts = parts.len(), tokens = response.usage.total_tokens, "synthesized reply");
            synthesis.text = response.content.trim().to_string();
            synthesis.usage = response.usage;
        }
        Err(e) => {
            warn!(error = %e, "synthesis failed, merging fragments in order");
            synthesis.text = merge_in_order(results);
        }
    }
    synthesis
}
