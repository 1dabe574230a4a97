//! Per-turn orchestration for the shopping assistant.
//!
//! A pluggable provider abstraction backed by OpenAI-compatible APIs
//! drives a set of small agents, coordinated by the [`Supervisor`].
//!
//! # Architecture
//!
//! ```text
//! User message → Supervisor
//!   ├── Classifier ∥ Extractor (→ Validator)
//!   ├── build_plan → ExecutionPlan
//!   ├── Fan-out on a bounded pool
//!   │   ├── Interview   (GREET / ASK / END)
//!   │   ├── Search      (relax → retrieve → narrate)
//!   │   ├── Analytical  (tool loop → verify)
//!   │   └── General     (chat)
//!   └── Synthesizer → TurnOutput
//! ```

pub mod agentic_loop;
pub mod analytical;
pub mod classifier;
pub mod client;
pub mod config;
pub mod discovery;
pub mod executor;
pub mod extractor;
pub mod general;
pub mod interview;
pub mod message;
pub mod plan;
pub mod progress;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod subagent;
pub mod supervisor;
pub mod synthesizer;
#[cfg(test)]
pub(crate) mod testing;
pub mod tool;
pub mod traits;

// Re-export key types
pub use classifier::{ClassificationCache, ClassificationResult};
pub use config::AgentConfig;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use plan::{ExecutionPlan, build_plan};
pub use progress::{Progress, ProgressCallback, ProgressEvent, StepStatus};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use subagent::{Invocation, Services, SubAgent, SubAgentId, SubAgentRegistry, SubAgentResult};
pub use supervisor::{Supervisor, TurnOutcome, TurnOutput};
pub use tool::{ToolCall, ToolDefinition, ToolResult, ToolSet};
pub use traits::{Agent, execute_with_tools};
