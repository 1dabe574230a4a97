//! shop-assist command-line entry point.

use std::io::Write;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use shop_assist::cli::{Cli, execute};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let output = execute(&cli)?;
    writeln!(std::io::stdout(), "{output}")?;
    Ok(())
}
