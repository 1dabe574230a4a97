//! Retrieval service abstraction.
//!
//! The ranking backend (keyword, vector, graph) lives outside this crate;
//! the orchestration core only depends on the [`RetrievalService`] call
//! contract. [`InMemoryCatalog`] is a small JSON-backed implementation
//! used by the CLI and tests.

pub mod catalog;

use async_trait::async_trait;

use crate::core::{FilterSnapshot, PreferenceSnapshot, RankedItem};
use crate::error::AgentError;

pub use catalog::InMemoryCatalog;

/// Trait for catalog retrieval backends.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Returns candidates matching the filters, best first.
    ///
    /// Results may contain duplicates; callers deduplicate and cap.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Retrieval`] when the backend is unavailable.
    async fn search(
        &self,
        filters: &FilterSnapshot,
        preferences: &PreferenceSnapshot,
    ) -> Result<Vec<RankedItem>, AgentError>;

    /// Free-text keyword search.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Retrieval`] when the backend is unavailable.
    async fn keyword_search(&self, query: &str, limit: usize)
    -> Result<Vec<RankedItem>, AgentError>;

    /// Full record for one item.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotFound`] for unknown identifiers.
    async fn item_details(&self, id: &str) -> Result<RankedItem, AgentError>;

    /// Open web search, used by the analytical agent as a last resort.
    ///
    /// Backends without web access keep the default, which reports the
    /// tool as unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolExecution`] when web search is not
    /// configured.
    async fn web_search(&self, query: &str) -> Result<String, AgentError> {
        Err(AgentError::ToolExecution {
            name: "web_search".to_string(),
            message: format!("web search is not configured (query: {query})"),
        })
    }
}
