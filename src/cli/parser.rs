//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default session id for CLI turns.
pub const DEFAULT_SESSION: &str = "cli";

/// shop-assist: conversational shopping assistant.
///
/// Runs the per-turn orchestration core against a JSON catalog using an
/// OpenAI-compatible model API.
#[derive(Parser, Debug)]
#[command(name = "shop-assist")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory containing prompt template files.
    #[arg(long, global = true, env = "SHOP_PROMPT_DIR")]
    pub prompt_dir: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat interactively on stdin/stdout.
    ///
    /// Progress is reported on stderr. An empty line asks the assistant to
    /// continue; `/reset` starts over; `/quit` or end of input exits.
    #[command(after_help = r#"Examples:
  shop-assist chat --catalog cars.json
  shop-assist chat --catalog cars.json --schema schema.json --session alice
  OPENAI_API_KEY=sk-... shop-assist -v chat --catalog cars.json
"#)]
    Chat {
        /// JSON catalog file.
        #[arg(short, long)]
        catalog: PathBuf,

        /// JSON catalog schema (defaults to the built-in vehicle schema).
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Session identifier.
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
    },

    /// Run one turn against a persisted state file.
    ///
    /// Reads the state (or starts a new session if the file does not
    /// exist), runs the turn, writes the updated state back and prints the
    /// turn output as JSON.
    #[command(after_help = r#"Examples:
  shop-assist turn --catalog cars.json --state session.json "a hybrid SUV under 35k"
  shop-assist turn --catalog cars.json --state session.json ""
"#)]
    Turn {
        /// JSON catalog file.
        #[arg(short, long)]
        catalog: PathBuf,

        /// JSON catalog schema (defaults to the built-in vehicle schema).
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Conversation state file.
        #[arg(short, long)]
        state: PathBuf,

        /// Session identifier for a new state file.
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,

        /// The shopper's message.
        message: String,
    },

    /// Prompt template operations.
    #[command(subcommand)]
    Prompts(PromptCommands),
}

/// Prompt template subcommands.
#[derive(Subcommand, Debug)]
pub enum PromptCommands {
    /// Write the default prompt templates for customization.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  shop-assist prompts init
  shop-assist prompts init --dir ./prompts
"#)]
    Init {
        /// Target directory (defaults to ~/.config/shop-assist/prompts).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}
