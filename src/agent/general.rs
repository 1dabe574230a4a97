//! Conversational replies for greetings, small talk, and out-of-scope turns.

use async_trait::async_trait;
use tracing::debug;

use super::config::AgentConfig;
use super::message::{ChatMessage, user_message};
use super::subagent::{Invocation, Services, SubAgent, SubAgentId, SubAgentResult};
use super::traits::Agent;
use crate::core::history::window;
use crate::core::{ConversationState, HistoryPolicy};
use crate::error::AgentError;

/// Placeholder user turn sent when the log is empty.
const EMPTY_TURN: &str = "(the shopper has not said anything yet)";

/// Agent that chats without touching the catalog.
pub struct GeneralAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl GeneralAgent {
    /// Creates a general agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.agent_model.clone(),
            max_tokens: config.max_tokens,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for GeneralAgent {
    fn name(&self) -> &'static str {
        "general"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.7
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// The general-conversation sub-agent.
pub struct GeneralSubAgent;

#[async_trait]
impl SubAgent for GeneralSubAgent {
    fn id(&self) -> SubAgentId {
        SubAgentId::General
    }

    async fn run(
        &self,
        services: &Services,
        state: &ConversationState,
        _invocation: &Invocation,
    ) -> Result<SubAgentResult, AgentError> {
        let agent = GeneralAgent::new(&services.config, services.prompts.general.clone());
        let mut messages: Vec<ChatMessage> =
            window(&state.messages, HistoryPolicy::LastK(services.config.history_window))
                .iter()
                .map(ChatMessage::from)
                .collect();
        if messages.is_empty() {
            messages.push(user_message(EMPTY_TURN));
        }
        debug!(history = messages.len(), "general reply");

        let response = services.provider.chat(&agent.build_request(messages)).await?;
        if response.content.trim().is_empty() {
            return Err(AgentError::InvalidResponse {
                message: "general returned an empty completion".to_string(),
            });
        }

        let mut result = SubAgentResult::text(SubAgentId::General, response.content);
        result.usage = response.usage;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::Role;
    use crate::agent::testing::{Reply, ScriptedProvider, services};
    use crate::core::Message;
    use crate::error::FailureKind;
    use crate::retrieval::InMemoryCatalog;
    use std::sync::Arc;

    fn svc(provider: &Arc<ScriptedProvider>) -> Services {
        services(Arc::clone(provider), Arc::new(InMemoryCatalog::default()))
    }

    #[tokio::test]
    async fn test_general_sees_recent_history_only() {
        let provider = Arc::new(ScriptedProvider::new().on("general", Reply::Text("Happy to help!".into())));
        let mut state = ConversationState::new("s");
        for i in 0..10 {
            state.messages.push(Message::user(format!("u{i}")));
            state.messages.push(Message::assistant(format!("a{i}")));
        }

        let result = GeneralSubAgent
            .run(&svc(&provider), &state, &Invocation::General)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(result.text, "Happy to help!");
        let request = &provider.requests("general")[0];
        // system prompt plus the six most recent messages
        assert_eq!(request.messages.len(), 7);
        assert_eq!(request.messages[1].content, "u7");
        assert_eq!(request.messages[6].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_general_empty_history_sends_placeholder() {
        let provider = Arc::new(ScriptedProvider::new().on("general", Reply::Text("Hello!".into())));
        let result = GeneralSubAgent
            .run(&svc(&provider), &ConversationState::new("s"), &Invocation::General)
            .await;
        assert!(result.is_ok());
        assert_eq!(provider.requests("general")[0].messages[1].content, EMPTY_TURN);
    }

    #[tokio::test]
    async fn test_general_failure_carries_kind() {
        let provider = Arc::new(ScriptedProvider::new().on("general", Reply::Timeout));
        let mut state = ConversationState::new("s");
        state.messages.push(Message::user("hey"));
        let err = GeneralSubAgent
            .run(&svc(&provider), &state, &Invocation::General)
            .await
            .err()
            .unwrap_or_else(|| unreachable!("error expected"));
        assert_eq!(err.failure_kind(), FailureKind::Slow);
    }
}
