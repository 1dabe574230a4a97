//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

#![allow(clippy::format_push_string)]

use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::agent::prompt::PromptSet;
use crate::agent::{AgentConfig, Progress, ProgressCallback, ProgressEvent, StepStatus, Supervisor, TurnOutput};
use crate::cli::parser::{Cli, Commands, PromptCommands};
use crate::core::{CatalogSchema, ConversationState};
use crate::retrieval::InMemoryCatalog;
use crate::session::SessionStore;

/// Executes the CLI command.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if configuration, file access, or the runtime fails.
pub fn execute(cli: &Cli) -> Result<String> {
    match &cli.command {
        Commands::Chat {
            catalog,
            schema,
            session,
        } => {
            let supervisor = build_supervisor(cli.prompt_dir.as_deref(), catalog, schema.as_deref())?;
            runtime()?.block_on(cmd_chat(supervisor, session))
        }
        Commands::Turn {
            catalog,
            schema,
            state,
            session,
            message,
        } => {
            let supervisor = build_supervisor(cli.prompt_dir.as_deref(), catalog, schema.as_deref())?;
            runtime()?.block_on(cmd_turn(&supervisor, state, session, message))
        }
        Commands::Prompts(PromptCommands::Init { dir }) => cmd_init_prompts(dir.as_deref()),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to create async runtime")
}

/// Wires a supervisor from the environment and CLI overrides.
fn build_supervisor(
    prompt_dir: Option<&Path>,
    catalog: &Path,
    schema: Option<&Path>,
) -> Result<Supervisor> {
    let mut builder = AgentConfig::builder();
    if let Some(dir) = prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder
        .from_env()
        .build()
        .context("agent configuration error")?;

    let catalog = InMemoryCatalog::load(catalog).context("failed to load catalog")?;
    let schema = match schema {
        Some(path) => CatalogSchema::load(path).context("failed to load catalog schema")?,
        None => CatalogSchema::default(),
    };

    Supervisor::from_config(config, Arc::new(catalog), schema).context("provider creation failed")
}

/// Progress reporter writing one line per finished step to stderr.
fn stderr_progress() -> Progress {
    let callback: ProgressCallback = Arc::new(|event: &ProgressEvent| {
        if event.status == StepStatus::InProgress {
            let _ = writeln!(std::io::stderr(), "  … {}", event.description);
        }
    });
    Progress::new(Some(callback))
}

/// Renders a turn for the terminal.
fn render_turn(output: &TurnOutput) -> String {
    let mut text = format!("\n{}\n", output.reply);

    if let Some(table) = &output.comparison_table {
        text.push_str(&format!("\n| | {} |\n", table.items.join(" | ")));
        for row in &table.rows {
            text.push_str(&format!("| {} | {} |\n", row.attribute, row.values.join(" | ")));
        }
    }
    if let Some(options) = &output.short_answer_options {
        text.push_str(&format!("\n[{}]\n", options.join("] [")));
    }
    if !output.followup_options.is_empty() {
        text.push_str("\nYou could ask:\n");
        for option in &output.followup_options {
            let _ = writeln!(text, "  - {option}");
        }
    }
    if !output.items.is_empty() {
        let _ = writeln!(
            text,
            "\n({} result(s), filters: {})",
            output.items.len(),
            output.filters.describe()
        );
    }
    text
}

async fn cmd_chat(supervisor: Supervisor, session: &str) -> Result<String> {
    let store = SessionStore::new(supervisor);
    let progress = stderr_progress();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut turns = 0usize;

    // open the session so the assistant speaks first
    let opening = store.run_turn(session, "", &progress).await;
    stdout.write_all(render_turn(&opening).as_bytes()).await?;

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "/quit" | "/exit" => break,
            "/reset" => {
                store.reset(session);
                let opening = store.run_turn(session, "", &progress).await;
                stdout.write_all(render_turn(&opening).as_bytes()).await?;
            }
            message => {
                let output = store.run_turn(session, message, &progress).await;
                stdout.write_all(render_turn(&output).as_bytes()).await?;
                turns += 1;
            }
        }
    }

    Ok(format!("\nSession '{session}' ended after {turns} turn(s)."))
}

async fn cmd_turn(
    supervisor: &Supervisor,
    state_path: &Path,
    session: &str,
    message: &str,
) -> Result<String> {
    let state = if state_path.exists() {
        let raw = std::fs::read_to_string(state_path)
            .with_context(|| format!("failed to read state {}", state_path.display()))?;
        serde_json::from_str::<ConversationState>(&raw)
            .with_context(|| format!("invalid state file {}", state_path.display()))?
    } else {
        ConversationState::new(session)
    };

    let outcome = supervisor.run_turn(message, &state, &stderr_progress()).await;

    let json = serde_json::to_string_pretty(&outcome.state).context("state serialization failed")?;
    std::fs::write(state_path, json)
        .with_context(|| format!("failed to write state {}", state_path.display()))?;

    serde_json::to_string_pretty(&outcome.output).context("output serialization failed")
}

fn cmd_init_prompts(dir: Option<&Path>) -> Result<String> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .context("could not determine home directory for default prompt path")?;

    let written =
        PromptSet::write_defaults(&target_dir).context("failed to write prompt templates")?;

    if written.is_empty() {
        return Ok(format!(
            "All prompt templates already exist in: {}\n",
            target_dir.display()
        ));
    }

    let mut output = format!(
        "Wrote {} prompt template(s) to: {}\n",
        written.len(),
        target_dir.display()
    );
    for path in &written {
        let _ = writeln!(
            output,
            "  {}",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
        );
    }
    output.push_str("\nEdit these files to customize agent system prompts.\n");
    Ok(output)
}
