// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use chorus_negotiation_core::infrastructure::manifest::load_manifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate an EngineConfig manifest
    Validate {
        /// Path to the manifest (default: --config)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a sample manifest
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./chorus-engine.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn validate(path: Option<PathBuf>) -> Result<()> {
    let Some(path) = path else {
        anyhow::bail!("No manifest given; pass a file or --config");
    };
    let manifest = load_manifest(&path)?;
    println!(
        "{} {} ({})",
        "Valid:".green().bold(),
        manifest.metadata.name,
        path.display()
    );
    println!(
        "  agent timeout {:?}, {} retry attempts, {} negotiation rounds",
        manifest.spec.agent_timeout,
        manifest.spec.retry.max_attempts,
        manifest.spec.negotiation.max_rounds
    );
    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    let sample = r#"apiVersion: chorus.dev/v1
kind: EngineConfig
metadata:
  name: default-engine
spec:
  agent_timeout: 60s
  retry:
    base_delay: 2s
    max_attempts: 3
    jitter: 0.2
  negotiation:
    max_rounds: 3
    similarity_tolerance: 0.05
    conflict_tolerance: 0.25
  negotiation_budget: 10s
  snapshot_timeout: 1s
  retention: 1h
  # audit_path: /var/lib/chorus/audit
"#;
    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("{} {}", "Wrote".green().bold(), output.display());
    Ok(())
}
