//! Tool executor that dispatches analytical tool calls.
//!
//! Maps tool names to the retrieval service and to the results already
//! shown in this session. Errors are reported back to the model as tool
//! results rather than aborting the loop.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::tool::{GET_ITEM_DETAILS, GET_SHOWN_ITEM, KEYWORD_SEARCH, ToolCall, ToolResult, WEB_SEARCH};
use crate::core::RankedItem;
use crate::error::AgentError;
use crate::retrieval::RetrievalService;

/// Maximum raw byte length of tool argument JSON from the LLM.
const MAX_TOOL_ARGS_LEN: usize = 10_000;
/// Maximum results for `keyword_search`.
const MAX_KEYWORD_RESULTS: usize = 10;

#[derive(Deserialize)]
struct ShownItemArgs {
    position: usize,
}

#[derive(Deserialize)]
struct KeywordArgs {
    query: String,
    #[serde(default = "default_keyword_limit")]
    limit: usize,
}

const fn default_keyword_limit() -> usize {
    5
}

#[derive(Deserialize)]
struct DetailsArgs {
    id: String,
}

#[derive(Deserialize)]
struct WebArgs {
    query: String,
}

/// Executes tool calls for one analytical run.
pub struct ToolExecutor {
    retrieval: Arc<dyn RetrievalService>,
    shown: Vec<RankedItem>,
}

impl ToolExecutor {
    /// Creates an executor over the retrieval service and the items the
    /// shopper has already been shown.
    #[must_use]
    pub fn new(retrieval: Arc<dyn RetrievalService>, shown: Vec<RankedItem>) -> Self {
        Self { retrieval, shown }
    }

    /// Dispatches a tool call and wraps the outcome as a [`ToolResult`].
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        match self.dispatch(call).await {
            Ok(content) => ToolResult {
                tool_call_id: call.id.clone(),
                content,
                is_error: false,
            },
            Err(e) => {
                debug!(tool = call.name, error = %e, "tool call failed");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    content: format!("error: {e}"),
                    is_error: true,
                }
            }
        }
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<String, AgentError> {
        if call.arguments.len() > MAX_TOOL_ARGS_LEN {
            return Err(tool_error(
                &call.name,
                format!("arguments exceed {MAX_TOOL_ARGS_LEN} bytes"),
            ));
        }

        match call.name.as_str() {
            GET_SHOWN_ITEM => {
                let args: ShownItemArgs = parse_args(call)?;
                let item = args
                    .position
                    .checked_sub(1)
                    .and_then(|idx| self.shown.get(idx))
                    .ok_or_else(|| AgentError::NotFound {
                        what: format!(
                            "shown item at position {} ({} shown)",
                            args.position,
                            self.shown.len()
                        ),
                    })?;
                to_json(&call.name, item)
            }
            KEYWORD_SEARCH => {
                let args: KeywordArgs = parse_args(call)?;
                let items = self
                    .retrieval
                    .keyword_search(&args.query, args.limit.clamp(1, MAX_KEYWORD_RESULTS))
                    .await?;
                to_json(&call.name, &items)
            }
            GET_ITEM_DETAILS => {
                let args: DetailsArgs = parse_args(call)?;
                let item = match self.shown.iter().find(|i| i.id == args.id) {
                    Some(item) => item.clone(),
                    None => self.retrieval.item_details(&args.id).await?,
                };
                to_json(&call.name, &item)
            }
            WEB_SEARCH => {
                let args: WebArgs = parse_args(call)?;
                self.retrieval.web_search(&args.query).await
            }
            other => Err(tool_error(other, "unknown tool".to_string())),
        }
    }
}

fn tool_error(name: &str, message: String) -> AgentError {
    AgentError::ToolExecution {
        name: name.to_string(),
        message,
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(call: &ToolCall) -> Result<T, AgentError> {
    serde_json::from_str(&call.arguments)
        .map_err(|e| tool_error(&call.name, format!("invalid arguments: {e}")))
}

fn to_json<T: serde::Serialize + ?Sized>(name: &str, value: &T) -> Result<String, AgentError> {
    serde_json::to_string(value).map_err(|e| tool_error(name, format!("serialization: {e}")))
}
