//! Filter and preference snapshots, plus the catalog schema that defines
//! which filter fields are categorical.
//!
//! A [`FilterSnapshot`] is always produced whole by the extractor and
//! swapped in wholesale; nothing in the crate patches individual fields of
//! the session's authoritative snapshot.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AgentError;

/// How firmly the shopper stated a filter. Drives relaxation order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Certainty {
    /// Guessed from context. Relaxed first.
    Inferred,
    /// Stated directly. Relaxed after inferred filters.
    #[default]
    Explicit,
    /// Declared non-negotiable. Never relaxed.
    MustHave,
}

/// A single filter constraint with its certainty label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterValue {
    /// Constraint value (string, number, or bool).
    pub value: serde_json::Value,
    /// Certainty label assigned by the extractor this turn.
    pub certainty: Certainty,
}

impl FilterValue {
    /// Creates an explicit filter value.
    #[must_use]
    pub fn explicit(value: impl Into<serde_json::Value>) -> Self {
        Self {
            value: value.into(),
            certainty: Certainty::Explicit,
        }
    }

    /// Creates a filter value with the given certainty.
    #[must_use]
    pub fn with_certainty(value: impl Into<serde_json::Value>, certainty: Certainty) -> Self {
        Self {
            value: value.into(),
            certainty,
        }
    }

    /// Renders the value for prompts and disclosures.
    #[must_use]
    pub fn display_value(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for FilterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Models sometimes emit bare values instead of {value, certainty}.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Labeled {
                value: serde_json::Value,
                #[serde(default)]
                certainty: Certainty,
            },
            Bare(serde_json::Value),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Labeled { value, certainty } => Self { value, certainty },
            Raw::Bare(value) => Self {
                value,
                certainty: Certainty::Explicit,
            },
        })
    }
}

/// Authoritative set of hard constraints, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSnapshot(BTreeMap<String, FilterValue>);

impl FilterSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    /// Inserts or overwrites a field.
    pub fn insert(&mut self, field: impl Into<String>, value: FilterValue) {
        self.0.insert(field.into(), value);
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<FilterValue> {
        self.0.remove(field)
    }

    /// Looks up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.0.get(field)
    }

    /// Number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates fields in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }

    /// Returns `true` when both snapshots constrain the same fields to the
    /// same values. Certainty labels are ignored.
    #[must_use]
    pub fn same_constraints(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|((ka, va), (kb, vb))| ka == kb && va.value == vb.value)
    }

    /// Mutable iteration, used by the categorical validator.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut FilterValue)> {
        self.0.iter_mut()
    }

    /// Fields that may be dropped when a search comes back empty, in the
    /// order they should be dropped: inferred first, then explicit.
    /// Must-have filters are never returned.
    #[must_use]
    pub fn relaxation_order(&self) -> Vec<String> {
        let mut fields: Vec<(&String, Certainty)> = self
            .0
            .iter()
            .filter(|(_, v)| v.certainty != Certainty::MustHave)
            .map(|(k, v)| (k, v.certainty))
            .collect();
        fields.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        fields.into_iter().map(|(k, _)| k.clone()).collect()
    }

    /// Compact `field = value` rendering for prompts and disclosures.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.0.is_empty() {
            return "none".to_string();
        }
        self.0
            .iter()
            .map(|(k, v)| format!("{} = {}", k.replace('_', " "), v.display_value()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Softer signals gathered from the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceSnapshot {
    /// Features the shopper wants.
    #[serde(default)]
    pub liked: Vec<String>,
    /// Features the shopper wants to avoid.
    #[serde(default)]
    pub disliked: Vec<String>,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Vec<String>,
}

impl PreferenceSnapshot {
    /// Returns `true` when no preference has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.liked.is_empty() && self.disliked.is_empty() && self.notes.is_empty()
    }

    /// The most recently captured preference, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.notes
            .last()
            .or_else(|| self.liked.last())
            .or_else(|| self.disliked.last())
            .map(String::as_str)
    }
}

/// Describes the catalog fields the extractor may fill.
///
/// Categorical fields carry a fixed allow-list; anything the model
/// produces for those fields must land on an allow-list entry or be
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSchema {
    /// Categorical fields and their allowed values.
    #[serde(default)]
    pub categorical: BTreeMap<String, Vec<String>>,
    /// Numeric fields (range bounds use `_min`/`_max` suffixes).
    #[serde(default)]
    pub numeric: Vec<String>,
    /// Free-text fields (make, model, ...).
    #[serde(default)]
    pub text: Vec<String>,
}

impl Default for CatalogSchema {
    fn default() -> Self {
        let categorical = [
            (
                "body_style",
                &[
                    "suv",
                    "sedan",
                    "hatchback",
                    "coupe",
                    "convertible",
                    "wagon",
                    "minivan",
                    "pickup",
                ][..],
            ),
            (
                "fuel_type",
                &["gasoline", "diesel", "hybrid", "plug-in hybrid", "electric"][..],
            ),
            (
                "drivetrain",
                &["fwd", "rwd", "awd", "4wd"][..],
            ),
            (
                "transmission",
                &["automatic", "manual"][..],
            ),
        ]
        .into_iter()
        .map(|(field, values)| {
            (
                field.to_string(),
                values.iter().map(ToString::to_string).collect(),
            )
        })
        .collect();

        Self {
            categorical,
            numeric: vec![
                "price_min".to_string(),
                "price_max".to_string(),
                "year_min".to_string(),
                "year_max".to_string(),
                "mileage_max".to_string(),
                "seats_min".to_string(),
            ],
            text: vec!["make".to_string(), "model".to_string()],
        }
    }
}

impl CatalogSchema {
    /// Loads a schema from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            message: format!("cannot read schema {}: {e}", path.display()),
        })?;
        serde_json::from_str(&raw).map_err(|e| AgentError::Config {
            message: format!("invalid schema {}: {e}", path.display()),
        })
    }

    /// Allow-list for a categorical field.
    #[must_use]
    pub fn allowed(&self, field: &str) -> Option<&[String]> {
        self.categorical.get(field).map(Vec::as_slice)
    }

    /// Returns the allow-list spelling of `value` when it matches
    /// case-insensitively.
    #[must_use]
    pub fn canonical(&self, field: &str, value: &str) -> Option<String> {
        let needle = value.trim();
        self.allowed(field)?
            .iter()
            .find(|allowed| allowed.eq_ignore_ascii_case(needle))
            .cloned()
    }

    /// Human-readable field listing for the extractor prompt.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut lines: Vec<String> = self
            .categorical
            .iter()
            .map(|(field, values)| format!("- {field}: one of [{}]", values.join(", ")))
            .collect();
        lines.extend(self.numeric.iter().map(|f| format!("- {f}: number")));
        lines.extend(self.text.iter().map(|f| format!("- {f}: text")));
        lines.join("\n")
    }
}
