//! Scripted gateway and fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::config::AgentConfig;
use super::message::{ChatRequest, ChatResponse, TokenUsage};
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::subagent::Services;
use super::tool::ToolCall;
use crate::core::CatalogSchema;
use crate::error::AgentError;
use crate::retrieval::RetrievalService;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Plain completion text.
    Text(String),
    /// A tool-call round.
    Tools(Vec<ToolCall>),
    /// Gateway timeout.
    Timeout,
    /// Gateway rate limit.
    RateLimited,
    /// Unusable output.
    Invalid,
}

impl Reply {
    /// JSON completion.
    pub fn json(value: &Value) -> Self {
        Self::Text(value.to_string())
    }

    /// Single tool call.
    pub fn tool(name: &str, arguments: &Value) -> Self {
        Self::Tools(vec![ToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }])
    }
}

/// Routes requests by their system prompt, which in tests is the role name.
///
/// Each route replays its queue in order; the last reply repeats.
#[derive(Default)]
pub struct ScriptedProvider {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    seen: Mutex<Vec<(String, ChatRequest)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for `route`.
    #[must_use]
    pub fn on(self, route: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Number of calls made on `route`.
    pub fn calls(&self, route: &str) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(r, _)| r == route)
            .count()
    }

    /// Requests made on `route`, oldest first.
    pub fn requests(&self, route: &str) -> Vec<ChatRequest> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(r, _)| r == route)
            .map(|(_, req)| req.clone())
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let route = request
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((route.clone(), request.clone()));

        let reply = {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            let queue = routes.get_mut(&route);
            match queue {
                Some(q) if q.len() > 1 => q.pop_front(),
                Some(q) => q.front().cloned(),
                None => None,
            }
        };

        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        match reply {
            Some(Reply::Text(content)) => Ok(ChatResponse {
                content,
                usage,
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            }),
            Some(Reply::Tools(tool_calls)) => Ok(ChatResponse {
                content: String::new(),
                usage,
                tool_calls,
                finish_reason: Some("tool_calls".to_string()),
            }),
            Some(Reply::Timeout) => Err(AgentError::Timeout { seconds: 30 }),
            Some(Reply::RateLimited) => Err(AgentError::RateLimited {
                message: "slow down".to_string(),
            }),
            Some(Reply::Invalid) | None => Err(AgentError::InvalidResponse {
                message: format!("no script for route {route:?}"),
            }),
        }
    }
}

/// Prompts whose text is the route name.
pub fn route_prompts() -> PromptSet {
    PromptSet {
        classifier: "classifier".to_string(),
        extractor: "extractor".to_string(),
        validator: "validator".to_string(),
        interviewer: "interviewer".to_string(),
        narrator: "narrator".to_string(),
        analyst: "analyst".to_string(),
        verifier: "verifier".to_string(),
        general: "general".to_string(),
        synthesizer: "synthesizer".to_string(),
    }
}

pub fn test_config() -> AgentConfig {
    AgentConfig::builder()
        .api_key("test")
        .build()
        .unwrap_or_else(|e| unreachable!("{e}"))
}

pub fn services(provider: Arc<ScriptedProvider>, retrieval: Arc<dyn RetrievalService>) -> Services {
    Services {
        provider,
        retrieval,
        config: Arc::new(test_config()),
        prompts: Arc::new(route_prompts()),
        schema: Arc::new(CatalogSchema::default()),
    }
}
