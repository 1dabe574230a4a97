//! JSON-backed in-memory catalog.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::RetrievalService;
use crate::core::{FilterSnapshot, FilterValue, PreferenceSnapshot, RankedItem};
use crate::error::AgentError;

/// Attribute holding an item's feature list, matched against preferences.
const FEATURES_ATTRIBUTE: &str = "features";

/// A catalog held entirely in memory.
///
/// Filters are matched against item attributes: `<field>_min` and
/// `<field>_max` bound numeric attributes (`price` maps to the item's
/// price), every other field must equal the attribute case-insensitively
/// (or appear in it, for list attributes). Ranking favours liked features,
/// penalizes disliked ones, then prefers higher ratings and lower prices.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: Vec<RankedItem>,
}

impl InMemoryCatalog {
    /// Creates a catalog from items.
    #[must_use]
    pub const fn new(items: Vec<RankedItem>) -> Self {
        Self { items }
    }

    /// Loads a catalog from a JSON array of items.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            message: format!("cannot read catalog {}: {e}", path.display()),
        })?;
        let items: Vec<RankedItem> =
            serde_json::from_str(&raw).map_err(|e| AgentError::Config {
                message: format!("invalid catalog {}: {e}", path.display()),
            })?;
        Ok(Self::new(items))
    }

    /// Number of items in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the catalog holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn numeric_attribute(item: &RankedItem, field: &str) -> Option<f64> {
        if field == "price" {
            return Some(item.price);
        }
        item.attributes.get(field).and_then(Value::as_f64)
    }

    fn value_matches(attribute: &Value, wanted: &Value) -> bool {
        match (attribute, wanted) {
            (Value::String(a), Value::String(w)) => a.eq_ignore_ascii_case(w.trim()),
            (Value::Array(list), w) => list.iter().any(|a| Self::value_matches(a, w)),
            (Value::Number(a), Value::Number(w)) => a.as_f64() == w.as_f64(),
            (a, w) => a == w,
        }
    }

    fn matches(item: &RankedItem, field: &str, filter: &FilterValue) -> bool {
        if let Some(base) = field.strip_suffix("_max") {
            return match (Self::numeric_attribute(item, base), filter.value.as_f64()) {
                (Some(actual), Some(limit)) => actual <= limit,
                _ => false,
            };
        }
        if let Some(base) = field.strip_suffix("_min") {
            return match (Self::numeric_attribute(item, base), filter.value.as_f64()) {
                (Some(actual), Some(limit)) => actual >= limit,
                _ => false,
            };
        }
        item.attributes
            .get(field)
            .is_some_and(|attribute| Self::value_matches(attribute, &filter.value))
    }

    fn mentions(item: &RankedItem, feature: &str) -> bool {
        let needle = feature.to_lowercase();
        if item.title.to_lowercase().contains(&needle) {
            return true;
        }
        item.attributes
            .get(FEATURES_ATTRIBUTE)
            .and_then(Value::as_array)
            .is_some_and(|features| {
                features
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|f| f.to_lowercase().contains(&needle))
            })
    }

    fn preference_score(item: &RankedItem, preferences: &PreferenceSnapshot) -> f64 {
        let liked = preferences
            .liked
            .iter()
            .filter(|f| Self::mentions(item, f))
            .count();
        let disliked = preferences
            .disliked
            .iter()
            .filter(|f| Self::mentions(item, f))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let score = 2.0 * (liked as f64) - 2.0 * (disliked as f64);
        score + f64::from(item.rating.unwrap_or(0.0))
    }

    fn searchable_text(item: &RankedItem) -> String {
        let mut text = item.title.to_lowercase();
        for value in item.attributes.values() {
            text.push(' ');
            match value {
                Value::String(s) => text.push_str(&s.to_lowercase()),
                other => text.push_str(&other.to_string().to_lowercase()),
            }
        }
        text
    }
}

#[async_trait]
impl RetrievalService for InMemoryCatalog {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn search(
        &self,
        filters: &FilterSnapshot,
        preferences: &PreferenceSnapshot,
    ) -> Result<Vec<RankedItem>, AgentError> {
        let mut scored: Vec<(f64, &RankedItem)> = self
            .items
            .iter()
            .filter(|item| filters.iter().all(|(k, v)| Self::matches(item, k, v)))
            .map(|item| (Self::preference_score(item, preferences), item))
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.price.total_cmp(&b.1.price))
        });

        debug!(
            filters = filters.len(),
            matched = scored.len(),
            "in-memory catalog search"
        );

        Ok(scored.into_iter().map(|(_, item)| item.clone()).collect())
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RankedItem>, AgentError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .filter(|t| t.len() > 1)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, &RankedItem)> = self
            .items
            .iter()
            .map(|item| {
                let text = Self::searchable_text(item);
                (terms.iter().filter(|t| text.contains(t.as_str())).count(), item)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn item_details(&self, id: &str) -> Result<RankedItem, AgentError> {
        self.items
            .iter()
            .filter(|item| item.id == id)
            .min_by(|a, b| a.price.total_cmp(&b.price))
            .cloned()
            .ok_or_else(|| AgentError::NotFound {
                what: format!("item {id}"),
            })
    }
}
