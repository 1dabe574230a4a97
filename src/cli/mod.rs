//! CLI layer for shop-assist.
//!
//! Provides the command-line interface using clap, with commands for
//! interactive chat, single persisted turns, and prompt scaffolding.

pub mod commands;
pub mod parser;

pub use commands::execute;
pub use parser::{Cli, Commands, PromptCommands};
