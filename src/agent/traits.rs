//! Agent trait definition.
//!
//! Every gateway-backed component (classifier, extractor, interviewer,
//! narrator, analyst, verifier, chat responder, synthesizer) implements
//! [`Agent`], which fixes its model, system prompt, and output mode and
//! provides uniform request construction.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::agentic_loop::agentic_loop;
use super::executor::ToolExecutor;
use super::message::{
    ChatMessage, ChatRequest, OutputSchema, Role, TokenUsage, system_message, user_message,
};
use super::provider::LlmProvider;
use super::tool::ToolDefinition;
use crate::error::AgentError;

/// Response from an agent execution.
#[derive(Debug, Clone, Default)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call (all loop iterations for tool agents).
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
    /// Tool outputs the model saw, in call order.
    pub tool_outputs: Vec<String>,
}

/// Trait implemented by all gateway-backed agents.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Structured-output schema, when the agent returns a fixed shape.
    fn output_schema(&self) -> Option<OutputSchema> {
        None
    }

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        1024
    }

    /// Tool definitions available to this agent. Empty by default.
    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Maximum tool-calling loop iterations before aborting.
    fn max_tool_iterations(&self) -> usize {
        6
    }

    /// Builds a request with the system prompt followed by `messages`.
    fn build_request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        let schema = self.output_schema();
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(system_message(self.system_prompt()));
        all.extend(messages);
        ChatRequest {
            model: self.model().to_string(),
            messages: all,
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode() || schema.is_some(),
            output_schema: schema,
            tools: Vec::new(),
        }
    }

    /// Executes the agent with a single user message (no tools).
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on gateway failures or an empty completion.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        let request = self.build_request(vec![user_message(user_msg)]);
        let response = provider.chat(&request).await?;

        if response.content.trim().is_empty() {
            return Err(AgentError::InvalidResponse {
                message: format!("{} returned an empty completion", self.name()),
            });
        }

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
            tool_outputs: Vec::new(),
        })
    }
}

/// Executes an agent and parses its JSON output into `T`.
///
/// # Errors
///
/// Returns gateway errors unchanged and [`AgentError::ResponseParse`] when
/// the output does not match `T`.
pub async fn execute_structured<T: DeserializeOwned>(
    agent: &dyn Agent,
    provider: &dyn LlmProvider,
    user_msg: &str,
) -> Result<(T, AgentResponse), AgentError> {
    let response = agent.execute(provider, user_msg).await?;
    let parsed = parse_structured(&response.content)?;
    Ok((parsed, response))
}

/// Parses model output as JSON, tolerating markdown code fences.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] if the content is not valid JSON
/// for `T`.
pub fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, AgentError> {
    let trimmed = content.trim();

    let json_str = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str::<T>(json_str).map_err(|e| {
        let preview_len = json_str.len().min(200);
        AgentError::ResponseParse {
            message: format!(
                "{e} (response length: {} bytes, preview: {:?})",
                json_str.len(),
                json_str.get(..preview_len).unwrap_or(json_str)
            ),
            content: content.to_string(),
        }
    })
}

/// Executes an agent with tool-calling support.
///
/// Runs the agentic loop when the agent declares tools, otherwise falls
/// through to [`Agent::execute`]. Tool outputs seen by the model are
/// returned in [`AgentResponse::tool_outputs`].
///
/// # Errors
///
/// Returns [`AgentError`] on gateway failures or if the tool loop exceeds
/// the agent's max iterations.
pub async fn execute_with_tools(
    agent: &dyn Agent,
    provider: &dyn LlmProvider,
    user_msg: &str,
    executor: &ToolExecutor,
) -> Result<AgentResponse, AgentError> {
    let tool_defs = agent.tools();

    if tool_defs.is_empty() {
        return agent.execute(provider, user_msg).await;
    }

    let mut request = agent.build_request(vec![user_message(user_msg)]);
    request.tools = tool_defs;

    let (response, usage) =
        agentic_loop(provider, &mut request, executor, agent.max_tool_iterations()).await?;

    let tool_outputs = request
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.clone())
        .collect();

    Ok(AgentResponse {
        content: response.content,
        usage,
        finish_reason: response.finish_reason,
        tool_outputs,
    })
}
