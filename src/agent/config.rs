//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

/// Default model for the classifier and extractor round trips.
const DEFAULT_FAST_MODEL: &str = "gpt-4o-mini";
/// Default model for sub-agents and the synthesizer.
const DEFAULT_AGENT_MODEL: &str = "gpt-4o";
/// Default sub-agent worker pool size.
const DEFAULT_MAX_CONCURRENCY: usize = 2;
/// Default classification cache capacity.
const DEFAULT_CACHE_CAPACITY: usize = 128;
/// Default interview ASK ceiling per session.
const DEFAULT_INTERVIEW_MAX_TURNS: u32 = 8;
/// Default maximum ranked items kept per turn.
const DEFAULT_MAX_RESULTS: usize = 20;
/// Default number of items the narrator describes.
const DEFAULT_NARRATE_TOP_N: usize = 5;
/// Default maximum analytical tool-calling iterations.
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 6;
/// Default verifier confidence below which answers are hedged.
const DEFAULT_VERIFICATION_THRESHOLD: f32 = 0.6;
/// Default synthesizer word budget.
const DEFAULT_SYNTHESIS_WORD_BUDGET: usize = 150;
/// Default recent-history window for discovery, analytical and general.
const DEFAULT_HISTORY_WINDOW: usize = 6;
/// Default max tokens per completion.
const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for the orchestration core.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for request classification.
    pub classifier_model: String,
    /// Model for filter extraction and categorical correction.
    pub extractor_model: String,
    /// Model for the interview, discovery, analytical and general agents.
    pub agent_model: String,
    /// Model for the response synthesizer.
    pub synthesizer_model: String,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Sub-agent worker pool size.
    pub max_concurrency: usize,
    /// Classification cache capacity.
    pub cache_capacity: usize,
    /// ASK turns allowed before the interview ends on its own.
    pub interview_max_turns: u32,
    /// Ranked items kept per turn.
    pub max_results: usize,
    /// Items described by the discovery narrator.
    pub narrate_top_n: usize,
    /// Analytical tool loop bound.
    pub max_tool_iterations: usize,
    /// Verifier confidence below which an answer is hedged.
    pub verification_threshold: f32,
    /// Word budget for blended replies.
    pub synthesis_word_budget: usize,
    /// Messages visible to discovery, analytical and general agents.
    pub history_window: usize,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to compiled-in defaults.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    classifier_model: Option<String>,
    extractor_model: Option<String>,
    agent_model: Option<String>,
    synthesizer_model: Option<String>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    max_concurrency: Option<usize>,
    cache_capacity: Option<usize>,
    interview_max_turns: Option<u32>,
    max_results: Option<usize>,
    narrate_top_n: Option<usize>,
    max_tool_iterations: Option<usize>,
    verification_threshold: Option<f32>,
    synthesis_word_budget: Option<usize>,
    history_window: Option<usize>,
    prompt_dir: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("SHOP_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("SHOP_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("SHOP_BASE_URL"))
                .ok();
        }
        if self.classifier_model.is_none() {
            self.classifier_model = std::env::var("SHOP_CLASSIFIER_MODEL").ok();
        }
        if self.extractor_model.is_none() {
            self.extractor_model = std::env::var("SHOP_EXTRACTOR_MODEL").ok();
        }
        if self.agent_model.is_none() {
            self.agent_model = std::env::var("SHOP_AGENT_MODEL").ok();
        }
        if self.synthesizer_model.is_none() {
            self.synthesizer_model = std::env::var("SHOP_SYNTHESIZER_MODEL").ok();
        }
        if self.cache_capacity.is_none() {
            self.cache_capacity = env_parse("SHOP_CACHE_CAPACITY");
        }
        if self.interview_max_turns.is_none() {
            self.interview_max_turns = env_parse("SHOP_INTERVIEW_MAX_TURNS");
        }
        if self.max_results.is_none() {
            self.max_results = env_parse("SHOP_MAX_RESULTS");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("SHOP_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the classifier model.
    #[must_use]
    pub fn classifier_model(mut self, model: impl Into<String>) -> Self {
        self.classifier_model = Some(model.into());
        self
    }

    /// Sets the extractor model.
    #[must_use]
    pub fn extractor_model(mut self, model: impl Into<String>) -> Self {
        self.extractor_model = Some(model.into());
        self
    }

    /// Sets the sub-agent model.
    #[must_use]
    pub fn agent_model(mut self, model: impl Into<String>) -> Self {
        self.agent_model = Some(model.into());
        self
    }

    /// Sets the synthesizer model.
    #[must_use]
    pub fn synthesizer_model(mut self, model: impl Into<String>) -> Self {
        self.synthesizer_model = Some(model.into());
        self
    }

    /// Sets the per-completion token limit.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the sub-agent worker pool size.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the classification cache capacity.
    #[must_use]
    pub const fn cache_capacity(mut self, n: usize) -> Self {
        self.cache_capacity = Some(n);
        self
    }

    /// Sets the interview ASK ceiling.
    #[must_use]
    pub const fn interview_max_turns(mut self, n: u32) -> Self {
        self.interview_max_turns = Some(n);
        self
    }

    /// Sets the ranked item cap.
    #[must_use]
    pub const fn max_results(mut self, n: usize) -> Self {
        self.max_results = Some(n);
        self
    }

    /// Sets how many items the narrator describes.
    #[must_use]
    pub const fn narrate_top_n(mut self, n: usize) -> Self {
        self.narrate_top_n = Some(n);
        self
    }

    /// Sets the maximum tool-calling loop iterations.
    #[must_use]
    pub const fn max_tool_iterations(mut self, n: usize) -> Self {
        self.max_tool_iterations = Some(n);
        self
    }

    /// Sets the verifier confidence threshold.
    #[must_use]
    pub const fn verification_threshold(mut self, threshold: f32) -> Self {
        self.verification_threshold = Some(threshold);
        self
    }

    /// Sets the synthesizer word budget.
    #[must_use]
    pub const fn synthesis_word_budget(mut self, words: usize) -> Self {
        self.synthesis_word_budget = Some(words);
        self
    }

    /// Sets the recent-history window.
    #[must_use]
    pub const fn history_window(mut self, k: usize) -> Self {
        self.history_window = Some(k);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, and
    /// [`AgentError::Config`] for zero-sized pools, caches or caps.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        let config = AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            classifier_model: self
                .classifier_model
                .unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
            extractor_model: self
                .extractor_model
                .unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
            agent_model: self
                .agent_model
                .unwrap_or_else(|| DEFAULT_AGENT_MODEL.to_string()),
            synthesizer_model: self
                .synthesizer_model
                .unwrap_or_else(|| DEFAULT_AGENT_MODEL.to_string()),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            cache_capacity: self.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
            interview_max_turns: self
                .interview_max_turns
                .unwrap_or(DEFAULT_INTERVIEW_MAX_TURNS),
            max_results: self.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            narrate_top_n: self.narrate_top_n.unwrap_or(DEFAULT_NARRATE_TOP_N),
            max_tool_iterations: self
                .max_tool_iterations
                .unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS),
            verification_threshold: self
                .verification_threshold
                .unwrap_or(DEFAULT_VERIFICATION_THRESHOLD),
            synthesis_word_budget: self
                .synthesis_word_budget
                .unwrap_or(DEFAULT_SYNTHESIS_WORD_BUDGET),
            history_window: self.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW),
            prompt_dir: self.prompt_dir,
        };

        for (name, value) in [
            ("max_concurrency", config.max_concurrency),
            ("cache_capacity", config.cache_capacity),
            ("max_results", config.max_results),
            ("max_tool_iterations", config.max_tool_iterations),
        ] {
            if value == 0 {
                return Err(AgentError::Config {
                    message: format!("{name} must be at least 1"),
                });
            }
        }

        Ok(config)
    }
}
