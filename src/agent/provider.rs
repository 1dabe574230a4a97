//! Language model gateway trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls. Every failure must surface as one of
//! the recoverable [`AgentError`] variants (`RateLimited`, `Timeout`,
//! `InvalidResponse`, `ApiRequest`) so callers can degrade gracefully.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Trait for LLM provider backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts, or unusable output.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
