//! Search and discovery: retrieval with progressive relaxation, then
//! narration of the best matches.
//!
//! Relaxation drops one filter per retry, inferred filters before explicit
//! ones, and never touches must-have filters. Whatever was relaxed, and a
//! result set that stays empty, is always disclosed in the reply.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::message::{OutputSchema, TokenUsage};
use super::prompt::{NarrationContext, build_narrator_prompt};
use super::subagent::{Invocation, Services, SubAgent, SubAgentId, SubAgentResult};
use super::traits::{Agent, execute_structured};
use crate::core::history::render_transcript;
use crate::core::{
    ConversationState, FilterSnapshot, HistoryPolicy, PreferenceSnapshot, RankedItem,
    dedupe_and_cap,
};
use crate::error::AgentError;
use crate::retrieval::RetrievalService;

/// Maximum follow-up options kept from the narrator.
const MAX_FOLLOWUPS: usize = 5;

/// Items found after relaxation, plus what had to be given up.
#[derive(Debug, Clone, Default)]
pub struct RelaxedRetrieval {
    /// Deduplicated, capped results.
    pub items: Vec<RankedItem>,
    /// Filters dropped to get them, in drop order.
    pub dropped: Vec<String>,
    /// Filters that were actually applied to the successful attempt.
    pub applied: FilterSnapshot,
}

/// Retrieves with progressive relaxation.
///
/// A backend error counts as an empty result for that attempt.
pub async fn retrieve_with_relaxation(
    retrieval: &dyn RetrievalService,
    filters: &FilterSnapshot,
    preferences: &PreferenceSnapshot,
    max_results: usize,
) -> RelaxedRetrieval {
    let mut applied = filters.clone();
    let mut dropped = Vec::new();
    let mut candidates = filters.relaxation_order().into_iter();

    loop {
        let items = match retrieval.search(&applied, preferences).await {
            Ok(items) => dedupe_and_cap(items, max_results),
            Err(e) => {
                warn!(backend = retrieval.name(), error = %e, "retrieval failed");
                Vec::new()
            }
        };
        info!(
            attempt = dropped.len() + 1,
            results = items.len(),
            filters = %applied.describe(),
            "retrieval attempt"
        );
        if !items.is_empty() {
            return RelaxedRetrieval {
                items,
                dropped,
                applied,
            };
        }
        let Some(field) = candidates.next() else {
            return RelaxedRetrieval {
                items,
                dropped,
                applied,
            };
        };
        debug!(field, "relaxing filter");
        applied.remove(&field);
        dropped.push(field);
    }
}

fn humanize(fields: &[String]) -> String {
    let names: Vec<String> = fields.iter().map(|f| f.replace('_', " ")).collect();
    match names.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Locally generated sentence disclosing relaxation or an empty result.
#[must_use]
pub fn disclosure(retrieval: &RelaxedRetrieval, original: &FilterSnapshot) -> Option<String> {
    if retrieval.items.is_empty() {
        let mut sentence = format!(
            "I couldn't find anything matching {}",
            if original.is_empty() {
                "your search".to_string()
            } else {
                original.describe()
            }
        );
        if !retrieval.dropped.is_empty() {
            sentence.push_str(&format!(
                ", even after relaxing {}",
                humanize(&retrieval.dropped)
            ));
        }
        if !retrieval.applied.is_empty() && !retrieval.dropped.is_empty() {
            sentence.push_str(&format!(
                " (I kept your must-haves: {})",
                retrieval.applied.describe()
            ));
        }
        sentence.push('.');
        return Some(sentence);
    }
    (!retrieval.dropped.is_empty()).then(|| {
        format!(
            "I couldn't find exact matches, so I relaxed {} to show you the closest options.",
            humanize(&retrieval.dropped)
        )
    })
}

/// Locally built presentation used when narration is unavailable.
#[must_use]
pub fn fallback_presentation(items: &[RankedItem], top_n: usize) -> String {
    let mut text = format!("Here are the top {} matches I found:", items.len().min(top_n));
    for (i, item) in items.iter().take(top_n).enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, item.headline()));
    }
    text
}

#[derive(Debug, Deserialize)]
struct Narration {
    text: String,
    #[serde(default)]
    followup_options: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
}

/// Agent that presents search results.
pub struct NarratorAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl NarratorAgent {
    /// Creates a narrator agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.agent_model.clone(),
            max_tokens: config.max_tokens,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for NarratorAgent {
    fn name(&self) -> &'static str {
        "narrator"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.4
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn output_schema(&self) -> Option<OutputSchema> {
        Some(OutputSchema {
            name: "narration",
            schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "followup_options": {"type": "array", "items": {"type": "string"}},
                    "topics": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["text", "followup_options", "topics"],
                "additionalProperties": false
            }),
        })
    }
}

/// A narrated result set.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Reply text, disclosure included.
    pub text: String,
    /// Ranked items.
    pub items: Vec<RankedItem>,
    /// Suggested follow-ups.
    pub followup_options: Vec<String>,
    /// Topics the narration asked about.
    pub topics: Vec<String>,
    /// Gateway usage.
    pub usage: TokenUsage,
}

/// Retrieves for `filters` and narrates the outcome. Never fails.
pub async fn discover(
    services: &Services,
    state: &ConversationState,
    filters: &FilterSnapshot,
    preferences: &PreferenceSnapshot,
) -> Discovery {
    let config = &services.config;
    let retrieval =
        retrieve_with_relaxation(&*services.retrieval, filters, preferences, config.max_results)
            .await;
    let disclosure = disclosure(&retrieval, filters);

    if retrieval.items.is_empty() {
        let text = format!(
            "{} Could you loosen one of your requirements, like budget or body style?",
            disclosure.unwrap_or_else(|| "I couldn't find anything yet.".to_string())
        );
        return Discovery {
            text,
            ..Discovery::default()
        };
    }

    let top_n = config.narrate_top_n.min(retrieval.items.len());
    let transcript = render_transcript(
        &state.messages,
        HistoryPolicy::LastK(config.history_window),
    );
    let covered: Vec<String> = state.topics_covered.iter().cloned().collect();
    let prompt = build_narrator_prompt(&NarrationContext {
        transcript: &transcript,
        items: &retrieval.items[..top_n],
        total: retrieval.items.len(),
        filters: &retrieval.applied,
        preferences,
        covered: &covered,
        disclosure: disclosure.as_deref(),
    });

    let narrator = NarratorAgent::new(config, services.prompts.narrator.clone());
    let (mut text, mut followup_options, topics, usage) =
        match execute_structured::<Narration>(&narrator, &*services.provider, &prompt).await {
            Ok((n, response)) if !n.text.trim().is_empty() => {
                (n.text, n.followup_options, n.topics, response.usage)
            }
            Ok(_) => {
                warn!("narration was empty, using fallback presentation");
                (
                    fallback_presentation(&retrieval.items, top_n),
                    Vec::new(),
                    Vec::new(),
                    TokenUsage::default(),
                )
            }
            Err(e) => {
                warn!(error = %e, "narration failed, using fallback presentation");
                (
                    fallback_presentation(&retrieval.items, top_n),
                    Vec::new(),
                    Vec::new(),
                    TokenUsage::default(),
                )
            }
        };

    if let Some(d) = disclosure
        && !text.contains(&d)
    {
        text = format!("{d} {text}");
    }
    followup_options.truncate(MAX_FOLLOWUPS);
    let topics = topics
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && !state.topics_covered.contains(t))
        .collect();

    Discovery {
        text,
        items: retrieval.items,
        followup_options,
        topics,
        usage,
    }
}

/// The search sub-agent.
pub struct SearchSubAgent;

#[async_trait]
impl SubAgent for SearchSubAgent {
    fn id(&self) -> SubAgentId {
        SubAgentId::Search
    }

    async fn run(
        &self,
        services: &Services,
        state: &ConversationState,
        _invocation: &Invocation,
    ) -> Result<SubAgentResult, AgentError> {
        let found = discover(services, state, &state.filters, &state.preferences).await;
        let mut result = SubAgentResult::text(SubAgentId::Search, found.text);
        result.items = Some(found.items);
        result.followup_options = found.followup_options;
        result.topics = found.topics;
        result.retrieval_ran = true;
        result.usage = found.usage;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{Reply, ScriptedProvider, services};
    use crate::core::item::item;
    use crate::core::{Certainty, FilterValue, Message};
    use crate::retrieval::InMemoryCatalog;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn car(id: &str, title: &str, price: f64, body: &str, fuel: &str) -> RankedItem {
        let mut it = item(id, title, price);
        it.attributes = BTreeMap::from([
            ("body_style".to_string(), json!(body)),
            ("fuel_type".to_string(), json!(fuel)),
        ]);
        it
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(vec![
            car("a", "Toyota RAV4 Hybrid", 31_000.0, "suv", "hybrid"),
            car("b", "Honda CR-V", 29_000.0, "suv", "gasoline"),
            car("c", "Toyota Prius", 26_000.0, "hatchback", "hybrid"),
        ])
    }

    #[tokio::test]
    async fn test_relaxation_drops_inferred_before_explicit_keeps_must_have() {
        let filters = FilterSnapshot::new()
            .with("fuel_type", FilterValue::with_certainty("hybrid", Certainty::MustHave))
            .with("body_style", FilterValue::explicit("suv"))
            .with("price_max", FilterValue::with_certainty(20_000, Certainty::Inferred));

        let result =
            retrieve_with_relaxation(&catalog(), &filters, &PreferenceSnapshot::default(), 20)
                .await;

        assert_eq!(result.dropped, vec!["price_max".to_string()]);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, "a");
        assert!(result.applied.get("fuel_type").is_some());
    }

    #[tokio::test]
    async fn test_relaxation_never_drops_must_have() {
        let filters = FilterSnapshot::new()
            .with("fuel_type", FilterValue::with_certainty("diesel", Certainty::MustHave))
            .with("body_style", FilterValue::explicit("suv"));

        let result =
            retrieve_with_relaxation(&catalog(), &filters, &PreferenceSnapshot::default(), 20)
                .await;

        assert!(result.items.is_empty());
        assert_eq!(result.dropped, vec!["body_style".to_string()]);
        assert!(result.applied.get("fuel_type").is_some());

        let sentence = disclosure(&result, &filters).unwrap_or_default();
        assert!(sentence.contains("couldn't find anything"));
        assert!(sentence.contains("body style"));
        assert!(sentence.contains("must-haves"));
    }

    #[test]
    fn test_no_disclosure_without_relaxation() {
        let retrieval = RelaxedRetrieval {
            items: vec![item("a", "A", 1.0)],
            ..RelaxedRetrieval::default()
        };
        assert!(disclosure(&retrieval, &FilterSnapshot::new()).is_none());
    }

    #[tokio::test]
    async fn test_search_sub_agent_narrates_and_marks_retrieval() {
        let provider = Arc::new(ScriptedProvider::new().on(
            "narrator",
            Reply::json(&json!({
                "text": "The RAV4 Hybrid is your best match.",
                "followup_options": ["Compare them", "Show cheaper", "Only AWD"],
                "topics": ["Drivetrain"]
            })),
        ));
        let svc = services(Arc::clone(&provider), Arc::new(catalog()));
        let mut state = ConversationState::new("s1");
        state.messages.push(Message::user("show me suvs"));
        state.filters = FilterSnapshot::new().with("body_style", FilterValue::explicit("suv"));

        let result = SearchSubAgent
            .run(&svc, &state, &Invocation::Search)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert!(result.retrieval_ran);
        assert_eq!(result.items.as_ref().map(Vec::len), Some(2));
        assert_eq!(result.text, "The RAV4 Hybrid is your best match.");
        assert_eq!(result.followup_options.len(), 3);
        assert_eq!(result.topics, vec!["drivetrain".to_string()]);
    }

    #[tokio::test]
    async fn test_narration_failure_falls_back_with_disclosure() {
        let provider = Arc::new(ScriptedProvider::new().on("narrator", Reply::Timeout));
        let svc = services(provider, Arc::new(catalog()));
        let mut state = ConversationState::new("s1");
        state.filters = FilterSnapshot::new()
            .with("body_style", FilterValue::explicit("suv"))
            .with("price_max", FilterValue::with_certainty(1_000, Certainty::Inferred));

        let found = discover(&svc, &state, &state.filters, &state.preferences).await;

        assert_eq!(found.items.len(), 2);
        assert!(found.text.starts_with("I couldn't find exact matches, so I relaxed price max"));
        assert!(found.text.contains("1. Honda CR-V"));
    }
}
