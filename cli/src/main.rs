// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # EdgeFleet Controller CLI
//!
//! The `edgefleet` binary wraps the controller core for operators.
//!
//! ## Commands
//!
//! - `edgefleet config show|validate|generate` - Configuration management
//! - `edgefleet update [--dry-run]` - Apply database migrations
//! - `edgefleet plan <SCENARIO>` - Dry-run lifecycle operations in memory

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use edgefleet_controller::commands::{self, ConfigCommand, PlanCommand, UpdateCommand};

/// EdgeFleet controller - microservice lifecycle for edge hosts
#[derive(Parser)]
#[command(name = "edgefleet")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "EDGEFLEET_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "EDGEFLEET_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Update the controller database
    #[command(name = "update")]
    Update {
        #[command(flatten)]
        command: UpdateCommand,
    },

    /// Run a scenario against an in-memory store and show the outcome
    #[command(name = "plan")]
    Plan {
        #[command(flatten)]
        command: PlanCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Update { command }) => commands::update::execute(command, cli.config).await,
        Some(Commands::Plan { command }) => commands::plan::execute(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
