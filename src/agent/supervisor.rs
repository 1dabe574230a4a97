//! Per-turn supervisor.
//!
//! Coordinates one conversational turn: classify ∥ extract → plan →
//! bounded fan-out over sub-agents → merge → synthesize. The supervisor
//! never mutates the caller's state; it returns an updated copy so a turn
//! that is dropped midway commits nothing.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::classifier::{ClassificationCache, ClassifierAgent, classify};
use super::client::create_provider;
use super::config::AgentConfig;
use super::extractor::extract_filters;
use super::message::TokenUsage;
use super::plan::{ExecutionPlan, build_plan};
use super::progress::{Progress, steps};
use super::prompt::PromptSet;
use super::subagent::{Invocation, Services, SubAgentId, SubAgentRegistry, SubAgentResult};
use super::synthesizer::{Synthesis, synthesize};
use crate::core::{
    CatalogSchema, ComparisonTable, ConversationState, FilterSnapshot, Message,
    PreferenceSnapshot, RankedItem, dedupe_and_cap,
};
use crate::error::AgentError;
use crate::retrieval::RetrievalService;

/// Quick replies are shown only in this range.
const SHORT_ANSWER_RANGE: std::ops::RangeInclusive<usize> = 2..=4;
/// Fewest follow-ups worth showing.
const MIN_FOLLOWUPS: usize = 3;
/// Most follow-ups shown.
const MAX_FOLLOWUPS: usize = 5;

/// What the caller shows for one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutput {
    /// Session identifier.
    pub session_id: String,
    /// Reply text.
    pub reply: String,
    /// Current ranked results.
    pub items: Vec<RankedItem>,
    /// Current explicit filters.
    pub filters: FilterSnapshot,
    /// Current preferences.
    pub preferences: PreferenceSnapshot,
    /// Whether the guided interview has ended.
    pub interview_complete: bool,
    /// Quick replies, 2 to 4 of them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_answer_options: Option<Vec<String>>,
    /// Suggested follow-ups, 3 to 5 of them or none.
    pub followup_options: Vec<String>,
    /// Comparison table for analytical answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_table: Option<ComparisonTable>,
    /// Sub-agents that ran, in plan order.
    pub executed: Vec<SubAgentId>,
    /// Token usage across the turn.
    pub usage: TokenUsage,
}

/// Result of [`Supervisor::run_turn`].
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Updated session state to commit.
    pub state: ConversationState,
    /// What to show the shopper.
    pub output: TurnOutput,
}

/// Runs conversational turns.
#[derive(Clone)]
pub struct Supervisor {
    services: Services,
    registry: Arc<SubAgentRegistry>,
    cache: Arc<ClassificationCache>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("services", &self.services)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Creates a supervisor with the standard sub-agents.
    #[must_use]
    pub fn new(services: Services, cache: Arc<ClassificationCache>) -> Self {
        Self {
            services,
            registry: Arc::new(SubAgentRegistry::standard()),
            cache,
        }
    }

    /// Wires a supervisor from configuration.
    ///
    /// Prompts are loaded from [`AgentConfig::prompt_dir`] with compiled-in
    /// fallbacks.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnsupportedProvider`] for unknown providers.
    pub fn from_config(
        config: AgentConfig,
        retrieval: Arc<dyn RetrievalService>,
        schema: CatalogSchema,
    ) -> Result<Self, AgentError> {
        let provider = create_provider(&config)?;
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let cache = Arc::new(ClassificationCache::new(config.cache_capacity));
        let services = Services {
            provider,
            retrieval,
            config: Arc::new(config),
            prompts: Arc::new(prompts),
            schema: Arc::new(schema),
        };
        Ok(Self::new(services, cache))
    }

    /// Replaces the sub-agent registry.
    #[must_use]
    pub fn with_registry(mut self, registry: SubAgentRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Shared collaborators.
    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// The classification cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    /// Runs one turn against a copy of `state`.
    ///
    /// Always produces a reply; component failures degrade into defaults
    /// or apologies.
    pub async fn run_turn(
        &self,
        message: &str,
        state: &ConversationState,
        progress: &Progress,
    ) -> TurnOutcome {
        let start = Instant::now();
        let message = message.trim();
        let mut state = state.clone();
        state.short_answer_options = None;
        state.followup_options.clear();
        state.comparison_table = None;
        let mut usage = TokenUsage::default();

        let plan = if message.is_empty() {
            debug!("empty message, opening turn");
            ExecutionPlan::single(if state.interview_complete {
                Invocation::General
            } else {
                Invocation::Interview { force_end: false }
            })
        } else {
            self.understand(message, &mut state, &mut usage, progress).await
        };
        let executed = plan.ids();
        info!(session = %state.session_id, plan = ?executed, "executing plan");

        let announced = plans_retrieval(&plan, &state, self.services.config.interview_max_turns);
        if announced {
            progress.start(steps::RETRIEVAL, "Looking through the catalog");
        }
        let results = self.execute(&plan, &state).await;
        if announced || results.iter().any(|r| r.retrieval_ran) {
            progress.done(steps::RETRIEVAL, "Catalog checked");
        }

        let retrieval_ran = merge(
            &mut state,
            &results,
            &mut usage,
            self.services.config.max_results,
        );

        progress.start(steps::GENERATION, "Writing a reply");
        let synthesis = if plan.bypasses_synthesis()
            && let [only] = results.as_slice()
        {
            Synthesis {
                text: only.text.clone(),
                short_answer_options: only.short_answer_options.clone(),
                followup_options: only.followup_options.clone(),
                table: only.table.clone(),
                usage: TokenUsage::default(),
            }
        } else {
            synthesize(&self.services, message, &results).await
        };
        usage.accumulate(synthesis.usage);
        progress.done(steps::GENERATION, "Reply ready");

        if retrieval_ran {
            state.previous_filters = state.filters.clone();
        }

        let mut followups = synthesis.followup_options;
        followups.truncate(MAX_FOLLOWUPS);
        if followups.len() < MIN_FOLLOWUPS {
            followups.clear();
        }
        state.short_answer_options = synthesis
            .short_answer_options
            .filter(|o| SHORT_ANSWER_RANGE.contains(&o.len()));
        state.followup_options = followups;
        state.comparison_table = synthesis.table;
        state.last_reply = Some(synthesis.text.clone());
        state.messages.push(Message::assistant(synthesis.text.clone()));

        info!(
            session = %state.session_id,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            tokens = usage.total_tokens,
            "turn complete"
        );
        progress.done(steps::COMPLETION, "Done");

        let output = TurnOutput {
            session_id: state.session_id.clone(),
            reply: synthesis.text,
            items: state.items.clone(),
            filters: state.filters.clone(),
            preferences: state.preferences.clone(),
            interview_complete: state.interview_complete,
            short_answer_options: state.short_answer_options.clone(),
            followup_options: state.followup_options.clone(),
            comparison_table: state.comparison_table.clone(),
            executed,
            usage,
        };
        TurnOutcome { state, output }
    }

    /// Appends the message, classifies and extracts concurrently, applies
    /// the extraction, and plans.
    async fn understand(
        &self,
        message: &str,
        state: &mut ConversationState,
        usage: &mut TokenUsage,
        progress: &Progress,
    ) -> ExecutionPlan {
        let summary = state.summary();
        state.messages.push(Message::user(message));

        progress.start(steps::CLASSIFICATION, "Understanding your message");
        progress.start(steps::EXTRACTION, "Updating your search criteria");
        let classifier =
            ClassifierAgent::new(&self.services.config, self.services.prompts.classifier.clone());
        let ((classification, classify_usage), extraction) = tokio::join!(
            classify(
                &classifier,
                &*self.services.provider,
                &self.cache,
                message,
                &summary
            ),
            extract_filters(&self.services, &state.messages),
        );
        usage.accumulate(classify_usage);
        progress.done(steps::CLASSIFICATION, "Message understood");

        match extraction {
            Ok(extracted) => {
                usage.accumulate(extracted.usage);
                if let Some(replacement) = extracted.replacement() {
                    state.filters = replacement.filters;
                    state.preferences = replacement.preferences;
                }
            }
            Err(e) => warn!(error = %e, "extraction failed, filters unchanged"),
        }
        progress.done(steps::EXTRACTION, "Search criteria updated");

        build_plan(&classification, state, message)
    }

    /// Runs every planned sub-agent on a bounded pool.
    ///
    /// Results come back in plan order; errors and panics become apologies.
    async fn execute(&self, plan: &ExecutionPlan, state: &ConversationState) -> Vec<SubAgentResult> {
        let semaphore = Arc::new(Semaphore::new(self.services.config.max_concurrency));
        let snapshot = Arc::new(state.clone());
        let mut handles = Vec::with_capacity(plan.len());

        for invocation in plan.invocations() {
            let id = invocation.id();
            let sem = Arc::clone(&semaphore);
            let services = self.services.clone();
            let registry = Arc::clone(&self.registry);
            let snapshot = Arc::clone(&snapshot);
            let invocation = invocation.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await.map_err(|e| AgentError::Orchestration {
                    message: format!("semaphore acquire failed: {e}"),
                })?;
                let agent = registry.get(id).ok_or_else(|| AgentError::Orchestration {
                    message: format!("no sub-agent registered for {id}"),
                })?;
                let start = Instant::now();
                let result = agent.run(&services, &snapshot, &invocation).await;
                debug!(
                    agent = %id,
                    ok = result.is_ok(),
                    elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "sub-agent finished"
                );
                result
            });
            handles.push((id, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(agent = %id, error = %e, "sub-agent failed");
                    SubAgentResult::apology(id, &e)
                }
                Err(e) => {
                    warn!(agent = %id, error = %e, "sub-agent task aborted");
                    SubAgentResult::apology(
                        id,
                        &AgentError::Orchestration {
                            message: format!("task join failed: {e}"),
                        },
                    )
                }
            };
            results.push(result);
        }
        results
    }
}

/// Folds side payloads into `state`. Returns whether a retrieval ran.
/// Whether `plan` is known to search the catalog before it runs. An
/// interview only searches when it ends.
fn plans_retrieval(plan: &ExecutionPlan, state: &ConversationState, max_turns: u32) -> bool {
    plan.invocations().any(|invocation| match invocation {
        Invocation::Search => true,
        Invocation::Interview { force_end } => {
            state.user_turns() > 0 && (*force_end || state.interview_turns >= max_turns)
        }
        Invocation::Analytical { .. } | Invocation::General => false,
    })
}

fn merge(
    state: &mut ConversationState,
    results: &[SubAgentResult],
    usage: &mut TokenUsage,
    max_results: usize,
) -> bool {
    let mut retrieval_ran = false;
    for result in results {
        usage.accumulate(result.usage);
        retrieval_ran |= result.retrieval_ran;
        if let Some(items) = &result.items {
            state.items = dedupe_and_cap(items.clone(), max_results);
        }
        if let Some(extraction) = &result.extraction {
            state.filters = extraction.filters.clone();
            state.preferences = extraction.preferences.clone();
        }
        if let Some(update) = result.interview {
            state.interview_turns = update.turns;
            state.interview_complete |= update.complete;
        }
        state.topics_covered.extend(result.topics.iter().cloned());
        if let Some(kind) = result.failure {
            debug!(agent = %result.id, ?kind, "merged apology");
        }
    }
    retrieval_ran
}
