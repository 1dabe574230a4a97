//! Agentic tool-calling loop.
//!
//! Drives the LLM ↔ tool execution round-trip: sends a request to the model,
//! executes any tool calls in the response, appends results, and repeats
//! until the model produces a final text response or the iteration limit
//! is reached.

use tracing::debug;

use super::executor::ToolExecutor;
use super::message::{
    ChatRequest, ChatResponse, TokenUsage, assistant_tool_calls_message, tool_message,
};
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Runs an agentic loop: model → tool calls → tool results → model → …
///
/// Continues until the model responds without tool calls or
/// `max_iterations` is reached. The request is mutated in place, so after
/// return it holds the full tool transcript.
///
/// Returns the final response together with usage summed over every
/// round trip.
///
/// # Errors
///
/// Returns [`AgentError::ToolLoopExceeded`] if the model keeps requesting
/// tools beyond `max_iterations`. Propagates any provider errors.
pub async fn agentic_loop(
    provider: &dyn LlmProvider,
    request: &mut ChatRequest,
    executor: &ToolExecutor,
    max_iterations: usize,
) -> Result<(ChatResponse, TokenUsage), AgentError> {
    let mut usage = TokenUsage::default();

    for iteration in 0..max_iterations {
        let response = provider.chat(request).await?;
        usage.accumulate(response.usage);

        if response.tool_calls.is_empty() {
            debug!(iteration, "agentic loop completed with final text response");
            return Ok((response, usage));
        }

        debug!(
            iteration,
            tool_count = response.tool_calls.len(),
            "executing tool calls"
        );

        request
            .messages
            .push(assistant_tool_calls_message(response.tool_calls.clone()));

        for call in &response.tool_calls {
            let result = executor.execute(call).await;
            debug!(
                tool = call.name,
                call_id = call.id,
                is_error = result.is_error,
                "tool execution complete"
            );
            request
                .messages
                .push(tool_message(&result.tool_call_id, &result.content));
        }
    }

    Err(AgentError::ToolLoopExceeded { max_iterations })
}
