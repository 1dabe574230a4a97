//! Sub-agent contract shared by the interview, discovery, analytical and
//! general behaviors.
//!
//! The supervisor only knows sub-agents through [`SubAgent`]: it hands each
//! one a read-only snapshot of the session plus an [`Invocation`], and
//! merges the returned [`SubAgentResult`] afterwards. Sub-agents never
//! mutate state themselves.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::config::AgentConfig;
use super::message::TokenUsage;
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use crate::core::{
    CatalogSchema, ComparisonTable, ConversationState, FilterSnapshot, PreferenceSnapshot,
    RankedItem,
};
use crate::error::{AgentError, FailureKind};
use crate::retrieval::RetrievalService;

/// Identifies a sub-agent. Ordering is the plan's iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentId {
    /// Guided interview.
    Interview,
    /// Catalog search and narration.
    Search,
    /// Tool-using question answering.
    Analytical,
    /// Small talk fallback.
    General,
}

impl SubAgentId {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interview => "interview",
            Self::Search => "search",
            Self::Analytical => "analytical",
            Self::General => "general",
        }
    }
}

impl fmt::Display for SubAgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation parameters carried by the execution plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Run the interview; `force_end` skips straight to END.
    Interview {
        /// The shopper asked for results.
        force_end: bool,
    },
    /// Retrieve and narrate with the current filters.
    Search,
    /// Answer these questions with tools.
    Analytical {
        /// Standalone questions.
        questions: Vec<String>,
    },
    /// Reply conversationally.
    General,
}

impl Invocation {
    /// The sub-agent this invocation targets.
    #[must_use]
    pub const fn id(&self) -> SubAgentId {
        match self {
            Self::Interview { .. } => SubAgentId::Interview,
            Self::Search => SubAgentId::Search,
            Self::Analytical { .. } => SubAgentId::Analytical,
            Self::General => SubAgentId::General,
        }
    }
}

/// A wholesale replacement of filters and preferences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// New authoritative filters.
    pub filters: FilterSnapshot,
    /// New preferences.
    pub preferences: PreferenceSnapshot,
}

/// Interview bookkeeping produced by one interview step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterviewUpdate {
    /// New value of the ASK counter.
    pub turns: u32,
    /// Whether the interview has ended.
    pub complete: bool,
}

/// Everything a sub-agent produced during one turn.
#[derive(Debug, Clone)]
pub struct SubAgentResult {
    /// Producer.
    pub id: SubAgentId,
    /// Reply fragment.
    pub text: String,
    /// Fresh ranked results, when a retrieval ran.
    pub items: Option<Vec<RankedItem>>,
    /// Parsed comparison table.
    pub table: Option<ComparisonTable>,
    /// Filter replacement (terminal interview extraction).
    pub extraction: Option<Extraction>,
    /// Quick replies for the shopper.
    pub short_answer_options: Option<Vec<String>>,
    /// Suggested next questions.
    pub followup_options: Vec<String>,
    /// Topics to add to the coverage set.
    pub topics: Vec<String>,
    /// Interview bookkeeping.
    pub interview: Option<InterviewUpdate>,
    /// Whether a retrieval actually executed.
    pub retrieval_ran: bool,
    /// Token usage across every gateway call made.
    pub usage: TokenUsage,
    /// Set when the text is an apology.
    pub failure: Option<FailureKind>,
}

impl SubAgentResult {
    /// A text-only result.
    #[must_use]
    pub fn text(id: SubAgentId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            items: None,
            table: None,
            extraction: None,
            short_answer_options: None,
            followup_options: Vec::new(),
            topics: Vec::new(),
            interview: None,
            retrieval_ran: false,
            usage: TokenUsage::default(),
            failure: None,
        }
    }

    /// The category-specific apology for a failed sub-agent.
    #[must_use]
    pub fn apology(id: SubAgentId, err: &AgentError) -> Self {
        let kind = err.failure_kind();
        let mut result = Self::text(id, kind.apology());
        result.failure = Some(kind);
        result
    }
}

/// Shared collaborators handed to every sub-agent.
#[derive(Clone)]
pub struct Services {
    /// Language model gateway.
    pub provider: Arc<dyn LlmProvider>,
    /// Catalog retrieval backend.
    pub retrieval: Arc<dyn RetrievalService>,
    /// Runtime configuration.
    pub config: Arc<AgentConfig>,
    /// System prompts.
    pub prompts: Arc<PromptSet>,
    /// Catalog field schema.
    pub schema: Arc<CatalogSchema>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("provider", &self.provider.name())
            .field("retrieval", &self.retrieval.name())
            .finish_non_exhaustive()
    }
}

/// A behavior the supervisor can plan and run.
#[async_trait]
pub trait SubAgent: Send + Sync {
    /// Which plan slot this sub-agent fills.
    fn id(&self) -> SubAgentId;

    /// Runs against a read-only state snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] when the sub-agent cannot produce a reply;
    /// the supervisor converts it into an apology.
    async fn run(
        &self,
        services: &Services,
        state: &ConversationState,
        invocation: &Invocation,
    ) -> Result<SubAgentResult, AgentError>;
}

/// Sub-agents by id.
#[derive(Clone, Default)]
pub struct SubAgentRegistry {
    agents: HashMap<SubAgentId, Arc<dyn SubAgent>>,
}

impl SubAgentRegistry {
    /// Registry with the four built-in sub-agents.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(super::interview::InterviewSubAgent));
        registry.register(Arc::new(super::discovery::SearchSubAgent));
        registry.register(Arc::new(super::analytical::AnalyticalSubAgent));
        registry.register(Arc::new(super::general::GeneralSubAgent));
        registry
    }

    /// Adds or replaces a sub-agent under its own id.
    pub fn register(&mut self, agent: Arc<dyn SubAgent>) {
        self.agents.insert(agent.id(), agent);
    }

    /// Looks up a sub-agent.
    #[must_use]
    pub fn get(&self, id: SubAgentId) -> Option<Arc<dyn SubAgent>> {
        self.agents.get(&id).cloned()
    }
}
