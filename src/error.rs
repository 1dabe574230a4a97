//! Error types for the orchestration core.
//!
//! Every component returns [`AgentError`]. Component boundaries decide
//! how a failure degrades: the classifier absorbs it into a safe default,
//! the extractor leaves filters untouched, and sub-agents turn it into a
//! category-specific apology via [`AgentError::failure_kind`].

use thiserror::Error;

/// Errors raised by the gateway, retrieval backend, tools, or orchestration.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured for the language model provider.
    #[error("API key missing: set OPENAI_API_KEY or SHOP_API_KEY")]
    ApiKeyMissing,

    /// Requested provider name is not known.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name that was requested.
        name: String,
    },

    /// Provider rejected the request because of rate limiting.
    #[error("rate limited by provider: {message}")]
    RateLimited {
        /// Provider message.
        message: String,
    },

    /// Request did not complete in time.
    #[error("request timed out after {seconds}s")]
    Timeout {
        /// Elapsed budget in seconds.
        seconds: u64,
    },

    /// Provider returned something that is not a usable completion.
    #[error("invalid response from provider: {message}")]
    InvalidResponse {
        /// Description of what was wrong.
        message: String,
    },

    /// Any other provider API failure.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// Model output could not be parsed into the expected shape.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// Parse diagnostic.
        message: String,
        /// Raw content that failed to parse.
        content: String,
    },

    /// Retrieval backend failure.
    #[error("retrieval failed: {message}")]
    Retrieval {
        /// Backend message.
        message: String,
    },

    /// A requested item or record does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Tool dispatch failure inside the analytical loop.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// The model kept requesting tools past the iteration limit.
    #[error("tool loop exceeded {max_iterations} iterations")]
    ToolLoopExceeded {
        /// Configured limit.
        max_iterations: usize,
    },

    /// Invalid configuration or configuration file.
    #[error("configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },

    /// Orchestration-level failure (task join, invalid input).
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Description.
        message: String,
    },
}

/// Apology category a failure degrades into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Too many requests upstream.
    RateLimited,
    /// Something took too long.
    Slow,
    /// The thing asked about could not be found.
    NotFound,
    /// Anything else.
    Unavailable,
}

impl FailureKind {
    /// User-facing apology for this category.
    #[must_use]
    pub const fn apology(self) -> &'static str {
        match self {
            Self::RateLimited => {
                "Sorry, I'm handling a lot of requests right now. Give me a moment and ask again?"
            }
            Self::Slow => {
                "Sorry, that took longer than expected and I had to stop. Could you try asking again, maybe a bit more specifically?"
            }
            Self::NotFound => {
                "Sorry, I couldn't find information about that. Could you tell me which item you mean?"
            }
            Self::Unavailable => {
                "Sorry, something went wrong on my side while working on that. Could you try again?"
            }
        }
    }
}

impl AgentError {
    /// Maps the error onto the apology category shown to the user.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } | Self::ApiRequest {
                status: Some(429), ..
            } => FailureKind::RateLimited,
            Self::Timeout { .. } | Self::ToolLoopExceeded { .. } => FailureKind::Slow,
            Self::NotFound { .. } => FailureKind::NotFound,
            _ => FailureKind::Unavailable,
        }
    }

    /// Returns `true` for transient language-model failures.
    #[must_use]
    pub const fn is_gateway_failure(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Timeout { .. }
                | Self::InvalidResponse { .. }
                | Self::ApiRequest { .. }
                | Self::ResponseParse { .. }
        )
    }
}
