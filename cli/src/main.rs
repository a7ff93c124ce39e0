// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! # Chorus CLI
//!
//! The `chorus` binary fronts the negotiation engine:
//!
//! - `chorus serve` - run the engine as an HTTP server
//! - `chorus scenario submit|result|cancel` - scenario operations,
//!   delegated to a running server when one is reachable, otherwise run
//!   against an embedded engine
//! - `chorus config validate|generate` - manifest management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

use commands::{ConfigCommand, ScenarioCommand};

/// Chorus - multi-agent negotiation engine for supply-chain disruptions
#[derive(Parser)]
#[command(name = "chorus")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to an EngineConfig manifest (YAML)
    #[arg(
        short,
        long,
        global = true,
        env = "CHORUS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP API host
    #[arg(long, global = true, env = "CHORUS_HOST", default_value = "127.0.0.1")]
    host: String,

    /// HTTP API port
    #[arg(long, global = true, env = "CHORUS_PORT", default_value = "8700")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CHORUS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the negotiation engine as an HTTP server
    Serve,

    /// Scenario operations
    #[command(name = "scenario")]
    Scenario {
        #[command(subcommand)]
        command: ScenarioCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Serve) => {
            commands::serve::run(cli.config, &cli.host, cli.port).await
        }
        Some(Commands::Scenario { command }) => {
            commands::scenario::handle_command(command, cli.config, &cli.host, cli.port).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
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
