//! Request classifier and its memoization cache.
//!
//! One gateway round trip turns the latest message into a multi-label
//! [`ClassificationResult`]. Results are cached by message and state
//! summary; a gateway failure yields the safe default, which is never
//! cached.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::{OutputSchema, TokenUsage};
use super::prompt::build_classifier_prompt;
use super::provider::LlmProvider;
use super::traits::{Agent, execute_structured};
use crate::core::StateSummary;

/// Which behaviors a message needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationResult {
    /// A guided question would help.
    pub needs_interview: bool,
    /// The shopper wants results.
    pub needs_search: bool,
    /// The shopper asked a factual or comparative question.
    pub needs_analytical: bool,
    /// Standalone questions for the analytical agent.
    pub analytical_questions: Vec<String>,
    /// The message changes search criteria.
    pub has_filter_update: bool,
    /// Greeting, thanks or unrelated chat.
    pub is_general_conversation: bool,
    /// Model's short justification.
    pub reasoning: String,
}

impl ClassificationResult {
    /// Result used whenever classification fails.
    #[must_use]
    pub fn safe_default() -> Self {
        Self {
            is_general_conversation: true,
            reasoning: "classification unavailable".to_string(),
            ..Self::default()
        }
    }
}

/// Cache key for a message under a given state summary.
#[must_use]
pub fn cache_key(message: &str, summary: &StateSummary) -> String {
    format!("{}|{}", message.trim(), summary.canonical())
}

struct LruInner {
    tick: u64,
    entries: HashMap<String, (u64, ClassificationResult)>,
    order: BTreeMap<u64, String>,
}

/// Fixed-capacity LRU of classification results.
///
/// Process-wide and shared through `Arc`. A single mutex guards the
/// recency bookkeeping; lookups are cheap compared to a gateway call.
pub struct ClassificationCache {
    capacity: usize,
    inner: Mutex<LruInner>,
}

impl std::fmt::Debug for ClassificationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl ClassificationCache {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LruInner {
                tick: 0,
                entries: HashMap::new(),
                order: BTreeMap::new(),
            }),
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up `key`, marking it most recently used.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ClassificationResult> {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let (old_tick, value) = {
            let entry = inner.entries.get_mut(key)?;
            let old = entry.0;
            entry.0 = tick;
            (old, entry.1.clone())
        };
        inner.order.remove(&old_tick);
        inner.order.insert(tick, key.to_string());
        Some(value)
    }

    /// Inserts or refreshes `key`, evicting the least recently used entry
    /// when full.
    pub fn insert(&self, key: String, value: ClassificationResult) {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if let Some((old_tick, _)) = inner.entries.remove(&key) {
            inner.order.remove(&old_tick);
        } else if inner.entries.len() >= self.capacity
            && let Some((_, evicted)) = inner.order.pop_first()
        {
            debug!(key = evicted, "classification cache eviction");
            inner.entries.remove(&evicted);
        }

        inner.order.insert(tick, key.clone());
        inner.entries.insert(key, (tick, value));
    }

    /// Returns `true` if `key` is present, without touching recency.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }
}

/// Agent that labels a message.
pub struct ClassifierAgent {
    model: String,
    system_prompt: String,
}

impl ClassifierAgent {
    /// Creates a classifier agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.classifier_model.clone(),
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for ClassifierAgent {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> u32 {
        400
    }

    fn output_schema(&self) -> Option<OutputSchema> {
        Some(OutputSchema {
            name: "classification",
            schema: json!({
                "type": "object",
                "properties": {
                    "needs_interview": {"type": "boolean"},
                    "needs_search": {"type": "boolean"},
                    "needs_analytical": {"type": "boolean"},
                    "analytical_questions": {"type": "array", "items": {"type": "string"}},
                    "has_filter_update": {"type": "boolean"},
                    "is_general_conversation": {"type": "boolean"},
                    "reasoning": {"type": "string"}
                },
                "required": [
                    "needs_interview", "needs_search", "needs_analytical",
                    "analytical_questions", "has_filter_update",
                    "is_general_conversation", "reasoning"
                ],
                "additionalProperties": false
            }),
        })
    }
}

/// Classifies `message`, consulting and filling `cache`.
///
/// Never fails: gateway or parse errors produce
/// [`ClassificationResult::safe_default`], which is not cached.
pub async fn classify(
    agent: &ClassifierAgent,
    provider: &dyn LlmProvider,
    cache: &ClassificationCache,
    message: &str,
    summary: &StateSummary,
) -> (ClassificationResult, TokenUsage) {
    let key = cache_key(message, summary);
    if let Some(hit) = cache.get(&key) {
        debug!("classification cache hit");
        return (hit, TokenUsage::default());
    }
    debug!("classification cache miss");

    let prompt = build_classifier_prompt(message, summary);
    match execute_structured::<ClassificationResult>(agent, provider, &prompt).await {
        Ok((mut result, response)) => {
            result.analytical_questions.retain(|q| !q.trim().is_empty());
            debug!(
                interview = result.needs_interview,
                search = result.needs_search,
                analytical = result.needs_analytical,
                filter_update = result.has_filter_update,
                general = result.is_general_conversation,
                "classified"
            );
            cache.insert(key, result.clone());
            (result, response.usage)
        }
        Err(e) => {
            warn!(error = %e, "classification failed, using safe default");
            (ClassificationResult::safe_default(), TokenUsage::default())
        }
    }
}
