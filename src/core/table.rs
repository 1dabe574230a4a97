//! Structured comparison tables extracted from analytical answers.
//!
//! The analytical agent is asked to format side-by-side comparisons as a
//! markdown table. [`ComparisonTable::parse`] accepts only the exact shape
//! the UI can render (2–4 named items by one or more attribute rows);
//! anything else yields `None` and the answer stays prose.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum number of compared items.
pub const MIN_ITEMS: usize = 2;
/// Maximum number of compared items.
pub const MAX_ITEMS: usize = 4;

static SEPARATOR_CELL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^:?-{3,}:?$").ok());

/// One attribute row of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRow {
    /// Attribute being compared.
    pub attribute: String,
    /// One value per compared item, in column order.
    pub values: Vec<String>,
}

/// A side-by-side comparison of 2–4 items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonTable {
    /// Item names, in column order.
    pub items: Vec<String>,
    /// Attribute rows.
    pub rows: Vec<ComparisonRow>,
}

fn split_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|c| c.trim().to_string())
        .collect()
}

fn is_separator(cells: &[String]) -> bool {
    let Some(re) = SEPARATOR_CELL.as_ref() else {
        return false;
    };
    !cells.is_empty() && cells.iter().all(|c| re.is_match(c))
}

impl ComparisonTable {
    /// Parses the first markdown table in `text`.
    ///
    /// Returns `None` unless the table has a header naming 2–4 items, a
    /// separator line, and at least one row whose cell count matches the
    /// header.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let block: Vec<&str> = text
            .lines()
            .map(str::trim)
            .skip_while(|l| !l.starts_with('|'))
            .take_while(|l| l.starts_with('|'))
            .collect();

        let (header, rest) = block.split_first()?;
        let (separator, body) = rest.split_first()?;

        let header = split_cells(header);
        if !is_separator(&split_cells(separator)) {
            return None;
        }

        let items: Vec<String> = header.iter().skip(1).cloned().collect();
        if !(MIN_ITEMS..=MAX_ITEMS).contains(&items.len()) || items.iter().any(String::is_empty) {
            return None;
        }

        let mut rows = Vec::with_capacity(body.len());
        for line in body {
            let cells = split_cells(line);
            if cells.len() != header.len() {
                return None;
            }
            let (attribute, values) = cells.split_first()?;
            if attribute.is_empty() {
                return None;
            }
            rows.push(ComparisonRow {
                attribute: attribute.trim_matches('*').to_string(),
                values: values.to_vec(),
            });
        }

        if rows.is_empty() {
            return None;
        }

        Some(Self { items, rows })
    }
}
