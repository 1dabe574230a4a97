//! # shop-assist
//!
//! Per-turn orchestration core for a conversational shopping assistant.
//!
//! Each shopper message is classified and mined for filters in parallel,
//! planned onto up to four sub-agents (guided interview, catalog search,
//! tool-using analysis, small talk), executed on a bounded pool, and
//! blended into one reply.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shop_assist::agent::{AgentConfig, Progress, Supervisor};
//! use shop_assist::core::{CatalogSchema, ConversationState};
//! use shop_assist::retrieval::InMemoryCatalog;
//!
//! # async fn demo() -> Result<(), shop_assist::error::AgentError> {
//! let config = AgentConfig::from_env()?;
//! let catalog = InMemoryCatalog::load("cars.json".as_ref())?;
//! let supervisor = Supervisor::from_config(config, Arc::new(catalog), CatalogSchema::default())?;
//!
//! let state = ConversationState::new("demo");
//! let outcome = supervisor
//!     .run_turn("a hybrid SUV under $35k", &state, &Progress::default())
//!     .await;
//! assert!(!outcome.output.reply.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;
pub mod retrieval;
pub mod session;

pub use crate::agent::{Supervisor, TurnOutcome, TurnOutput};
pub use crate::core::ConversationState;
pub use crate::error::AgentError;
pub use crate::session::SessionStore;
