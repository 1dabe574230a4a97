//! Ranked catalog items returned by the retrieval service.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Default cap on items presented or cached per session.
pub const DEFAULT_MAX_RESULTS: usize = 20;

/// A single candidate returned by the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    /// Stable identifier across retrievals.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Listed price.
    pub price: f64,
    /// Listing source (dealer, marketplace, ...).
    pub source: String,
    /// Optional aggregate rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    /// Photo references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
    /// Catalog attributes (schema is backend-defined).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl RankedItem {
    /// One-line summary used in prompts and generic presentations.
    #[must_use]
    pub fn headline(&self) -> String {
        let rating = self
            .rating
            .map_or_else(String::new, |r| format!(", rated {r:.1}"));
        format!("{} (${:.0}{rating}, {})", self.title, self.price, self.source)
    }
}

/// Deduplicates candidates by identifier and caps the list.
///
/// When two candidates share an identifier the lower-priced one wins and
/// takes the rank position of the first occurrence. The result keeps rank
/// order and holds at most `max` items.
#[must_use]
pub fn dedupe_and_cap(items: Vec<RankedItem>, max: usize) -> Vec<RankedItem> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut deduped: Vec<RankedItem> = Vec::with_capacity(items.len());

    for item in items {
        if let Some(&pos) = positions.get(&item.id) {
            if item.price < deduped[pos].price {
                deduped[pos] = item;
            }
        } else {
            positions.insert(item.id.clone(), deduped.len());
            deduped.push(item);
        }
    }

    deduped.truncate(max);
    deduped
}

#[cfg(test)]
pub(crate) fn item(id: &str, title: &str, price: f64) -> RankedItem {
    RankedItem {
        id: id.to_string(),
        title: title.to_string(),
        price,
        source: "test-lot".to_string(),
        rating: None,
        photos: Vec::new(),
        attributes: BTreeMap::new(),
    }
}
