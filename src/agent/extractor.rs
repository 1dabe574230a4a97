//! Filter extraction and categorical validation.
//!
//! The extractor re-reads the whole transcript every turn and returns the
//! complete filter and preference snapshot, which replaces the previous one
//! wholesale. Categorical values are then checked against the catalog
//! allow-lists: exact matches are normalized locally, everything else goes
//! through one batched correction call, and uncorrectable values are
//! dropped rather than guessed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::{OutputSchema, TokenUsage};
use super::prompt::{Correction, build_extractor_prompt, build_validator_prompt};
use super::provider::LlmProvider;
use super::subagent::{Extraction, Services};
use super::traits::{Agent, execute_structured};
use crate::core::history::render_transcript;
use crate::core::{CatalogSchema, FilterSnapshot, FilterValue, HistoryPolicy, Message, PreferenceSnapshot};
use crate::error::AgentError;

/// Outcome of one extraction round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    /// Whether the latest message changed criteria or preferences.
    pub has_new_filters: bool,
    /// Complete validated filter snapshot.
    pub filters: FilterSnapshot,
    /// Complete preference snapshot.
    pub preferences: PreferenceSnapshot,
    /// Gateway usage for extraction and correction.
    pub usage: TokenUsage,
}

impl ExtractionResult {
    /// The replacement to apply, if any.
    #[must_use]
    pub fn replacement(&self) -> Option<Extraction> {
        self.has_new_filters.then(|| Extraction {
            filters: self.filters.clone(),
            preferences: self.preferences.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    has_new_filters: bool,
    #[serde(default)]
    filters: BTreeMap<String, Option<FilterValue>>,
    #[serde(default)]
    preferences: PreferenceSnapshot,
}

/// Agent that derives the filter snapshot from a transcript.
pub struct ExtractorAgent {
    model: String,
    system_prompt: String,
}

impl ExtractorAgent {
    /// Creates an extractor agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.extractor_model.clone(),
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for ExtractorAgent {
    fn name(&self) -> &'static str {
        "extractor"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> u32 {
        800
    }

    fn output_schema(&self) -> Option<OutputSchema> {
        Some(OutputSchema {
            name: "filter_extraction",
            schema: json!({
                "type": "object",
                "properties": {
                    "has_new_filters": {"type": "boolean"},
                    "filters": {
                        "type": "object",
                        "additionalProperties": {
                            "type": "object",
                            "properties": {
                                "value": {},
                                "certainty": {"enum": ["must_have", "explicit", "inferred"]}
                            },
                            "required": ["value", "certainty"]
                        }
                    },
                    "preferences": {
                        "type": "object",
                        "properties": {
                            "liked": {"type": "array", "items": {"type": "string"}},
                            "disliked": {"type": "array", "items": {"type": "string"}},
                            "notes": {"type": "array", "items": {"type": "string"}}
                        }
                    }
                },
                "required": ["has_new_filters", "filters", "preferences"]
            }),
        })
    }
}

/// Agent that maps stray categorical values onto allow-lists.
pub struct ValidatorAgent {
    model: String,
    system_prompt: String,
}

impl ValidatorAgent {
    /// Creates a validator agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.extractor_model.clone(),
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for ValidatorAgent {
    fn name(&self) -> &'static str {
        "validator"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        200
    }
}

/// Keeps only fields the schema knows, coercing numeric bounds.
fn conform(schema: &CatalogSchema, raw: BTreeMap<String, Option<FilterValue>>) -> FilterSnapshot {
    let mut snapshot = FilterSnapshot::new();
    for (field, value) in raw {
        let Some(mut value) = value else { continue };
        if value.value.is_null() {
            continue;
        }
        if schema.numeric.iter().any(|f| f == &field) {
            let number = match &value.value {
                Value::Number(_) => Some(value.value.clone()),
                Value::String(s) => s
                    .trim()
                    .trim_start_matches('$')
                    .replace(',', "")
                    .parse::<f64>()
                    .ok()
                    .map(Value::from),
                _ => None,
            };
            let Some(number) = number else {
                debug!(field, "dropping non-numeric bound");
                continue;
            };
            value.value = number;
        } else if schema.allowed(&field).is_none() && !schema.text.iter().any(|f| f == &field) {
            debug!(field, "dropping field outside catalog schema");
            continue;
        }
        snapshot.insert(field, value);
    }
    snapshot
}

fn categorical_text(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}

/// Validates categorical fields in place.
///
/// Exact case-insensitive matches are normalized; the rest go to one
/// correction call. A correction is kept only when it is itself an
/// allow-list member; otherwise the field is dropped. Never fails.
pub async fn validate_categorical(
    agent: &ValidatorAgent,
    provider: &dyn LlmProvider,
    schema: &CatalogSchema,
    filters: &mut FilterSnapshot,
) -> TokenUsage {
    let mut pending: Vec<(String, String)> = Vec::new();

    for (field, value) in filters.iter_mut() {
        if schema.allowed(field).is_none() {
            continue;
        }
        let text = categorical_text(&value.value);
        match schema.canonical(field, &text) {
            Some(canonical) => value.value = Value::String(canonical),
            None => pending.push((field.clone(), text)),
        }
    }

    if pending.is_empty() {
        return TokenUsage::default();
    }

    let corrections: Vec<Correction<'_>> = pending
        .iter()
        .filter_map(|(field, value)| {
            schema.allowed(field).map(|allowed| Correction {
                field,
                value,
                allowed,
            })
        })
        .collect();
    let prompt = build_validator_prompt(&corrections);

    let (answers, usage) =
        match execute_structured::<BTreeMap<String, Option<String>>>(agent, provider, &prompt)
            .await
        {
            Ok((answers, response)) => (answers, response.usage),
            Err(e) => {
                warn!(error = %e, fields = pending.len(), "categorical correction failed");
                (BTreeMap::new(), TokenUsage::default())
            }
        };

    for (field, original) in &pending {
        let corrected = answers
            .get(field)
            .and_then(Option::as_deref)
            .and_then(|v| schema.canonical(field, v));
        if let Some(corrected) = corrected {
            debug!(field, from = original, to = corrected, "categorical value corrected");
            if let Some(existing) = filters.get(field).cloned() {
                filters.insert(
                    field.clone(),
                    FilterValue::with_certainty(corrected, existing.certainty),
                );
            }
        } else {
            debug!(field, value = original, "dropping uncorrectable categorical value");
            filters.remove(field);
        }
    }

    usage
}

/// Re-derives filters and preferences from the full history.
///
/// # Errors
///
/// Returns the gateway or parse error of the extraction call itself; the
/// caller treats it as ambiguity and leaves filters unchanged.
pub async fn extract_filters(
    services: &Services,
    messages: &[Message],
) -> Result<ExtractionResult, AgentError> {
    let extractor = ExtractorAgent::new(&services.config, services.prompts.extractor.clone());
    let transcript = render_transcript(messages, HistoryPolicy::Full);
    let prompt = build_extractor_prompt(&transcript, &services.schema.describe());

    let (raw, response) =
        execute_structured::<RawExtraction>(&extractor, &*services.provider, &prompt).await?;
    let mut usage = response.usage;

    // Terminal extraction adopts the snapshot even without new filters, so
    // it is always validated.
    let mut filters = conform(&services.schema, raw.filters);
    let validator = ValidatorAgent::new(&services.config, services.prompts.validator.clone());
    usage.accumulate(
        validate_categorical(&validator, &*services.provider, &services.schema, &mut filters).await,
    );

    debug!(
        has_new_filters = raw.has_new_filters,
        filters = %filters.describe(),
        "extraction complete"
    );

    Ok(ExtractionResult {
        has_new_filters: raw.has_new_filters,
        filters,
        preferences: raw.preferences,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{Reply, ScriptedProvider, services};
    use crate::core::Certainty;
    use crate::retrieval::InMemoryCatalog;
    use std::sync::Arc;

    fn history() -> Vec<Message> {
        vec![
            Message::user("I need an SUV under 30k"),
            Message::assistant("Any fuel preference?"),
            Message::user("hybrid, definitely"),
        ]
    }

    #[tokio::test]
    async fn test_extract_full_history_and_normalize() {
        let provider = Arc::new(ScriptedProvider::new().on(
            "extractor",
            Reply::json(&json!({
                "has_new_filters": true,
                "filters": {
                    "body_style": {"value": "SUV", "certainty": "explicit"},
                    "price_max": {"value": "$30,000", "certainty": "explicit"},
                    "fuel_type": {"value": "Hybrid", "certainty": "must_have"},
                    "favourite_colour": {"value": "teal", "certainty": "inferred"}
                },
                "preferences": {"liked": ["good mileage"]}
            })),
        ));
        let svc = services(Arc::clone(&provider), Arc::new(InMemoryCatalog::default()));

        let result = extract_filters(&svc, &history())
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert!(result.has_new_filters);
        assert_eq!(
            result.filters.get("body_style").map(|v| v.value.clone()),
            Some(json!("suv"))
        );
        assert_eq!(
            result.filters.get("price_max").map(|v| v.value.clone()),
            Some(json!(30_000.0))
        );
        assert_eq!(
            result.filters.get("fuel_type").map(|v| v.certainty),
            Some(Certainty::MustHave)
        );
        assert!(result.filters.get("favourite_colour").is_none());
        assert_eq!(result.preferences.liked, vec!["good mileage".to_string()]);
        // No stray categorical values, so no correction call.
        assert_eq!(provider.calls("validator"), 0);

        let request = &provider.requests("extractor")[0];
        let prompt = &request.messages[1].content;
        assert!(prompt.contains("I need an SUV under 30k"));
        assert!(prompt.contains("hybrid, definitely"));
    }

    #[tokio::test]
    async fn test_extraction_is_deterministic_with_deterministic_gateway() {
        let provider = Arc::new(ScriptedProvider::new().on(
            "extractor",
            Reply::json(&json!({
                "has_new_filters": true,
                "filters": {"body_style": {"value": "suv", "certainty": "explicit"}},
                "preferences": {}
            })),
        ));
        let svc = services(Arc::clone(&provider), Arc::new(InMemoryCatalog::default()));

        let first = extract_filters(&svc, &history()).await.ok();
        let second = extract_filters(&svc, &history()).await.ok();
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_validator_batches_and_drops_non_members() {
        let provider = ScriptedProvider::new().on(
            "validator",
            Reply::json(&json!({"body_style": "SUV", "fuel_type": "plutonium"})),
        );
        let agent = ValidatorAgent::new(&crate::agent::testing::test_config(), "validator".into());
        let schema = CatalogSchema::default();
        let mut filters = FilterSnapshot::new()
            .with("body_style", FilterValue::with_certainty("crossover", Certainty::Inferred))
            .with("fuel_type", FilterValue::explicit("nuclear"))
            .with("drivetrain", FilterValue::explicit("AWD"));

        let _ = validate_categorical(&agent, &provider, &schema, &mut filters).await;

        assert_eq!(provider.calls("validator"), 1);
        let body = filters.get("body_style").cloned();
        assert_eq!(body.as_ref().map(|v| v.value.clone()), Some(json!("suv")));
        assert_eq!(body.map(|v| v.certainty), Some(Certainty::Inferred));
        assert!(filters.get("fuel_type").is_none());
        assert_eq!(
            filters.get("drivetrain").map(|v| v.value.clone()),
            Some(json!("awd"))
        );
    }

    #[tokio::test]
    async fn test_validator_failure_drops_pending_fields() {
        let provider = ScriptedProvider::new().on("validator", Reply::Timeout);
        let agent = ValidatorAgent::new(&crate::agent::testing::test_config(), "validator".into());
        let mut filters = FilterSnapshot::new()
            .with("body_style", FilterValue::explicit("spaceship"))
            .with("make", FilterValue::explicit("Toyota"));

        let _ = validate_categorical(&agent, &provider, &CatalogSchema::default(), &mut filters).await;

        assert!(filters.get("body_style").is_none());
        assert!(filters.get("make").is_some());
    }

    #[tokio::test]
    async fn test_snapshot_validated_without_new_filters() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on(
                    "extractor",
                    Reply::json(&json!({
                        "has_new_filters": false,
                        "filters": {
                            "body_style": {"value": "spaceship", "certainty": "explicit"},
                            "fuel_type": {"value": "HYBRID", "certainty": "inferred"}
                        },
                        "preferences": {}
                    })),
                )
                .on("validator", Reply::json(&json!({"body_style": null}))),
        );
        let svc = services(Arc::clone(&provider), Arc::new(InMemoryCatalog::default()));

        let result = extract_filters(&svc, &history())
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert!(!result.has_new_filters);
        assert_eq!(provider.calls("validator"), 1);
        assert!(result.filters.get("body_style").is_none());
        assert_eq!(
            result.filters.get("fuel_type").map(|v| v.value.clone()),
            Some(json!("hybrid"))
        );
    }

    #[tokio::test]
    async fn test_extractor_failure_is_error() {
        let provider = Arc::new(ScriptedProvider::new().on("extractor", Reply::Text("nope".into())));
        let svc = services(provider, Arc::new(InMemoryCatalog::default()));
        let result = extract_filters(&svc, &history()).await;
        assert!(matches!(result, Err(AgentError::ResponseParse { .. })));
    }
}
