// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! Scenario operations
//!
//! Commands: submit, result, cancel
//!
//! `submit` delegates to a running server when the health check answers;
//! otherwise it runs an embedded engine and waits for the outcome.
//! `result` and `cancel` always need a server, since an embedded engine's
//! state ends with the process.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use chorus_negotiation_core::application::{builtin_orchestrator, ResultStatus};
use chorus_negotiation_core::domain::explain::NegotiationResult;
use chorus_negotiation_core::domain::negotiation::NegotiationOutcome;
use chorus_negotiation_core::domain::scenario::ScenarioRequest;

use super::serve::load_engine_config;

#[derive(Subcommand)]
pub enum ScenarioCommand {
    /// Submit a disruption scenario
    Submit {
        /// Scenario JSON (inline string or @file.json)
        #[arg(value_name = "SCENARIO")]
        input: String,

        /// Wait for the outcome and print the full result
        #[arg(long)]
        wait: bool,
    },

    /// Fetch the result of a submitted scenario
    Result {
        /// Scenario identifier
        #[arg(value_name = "SCENARIO_ID")]
        id: String,
    },

    /// Cancel a running scenario
    Cancel {
        /// Scenario identifier
        #[arg(value_name = "SCENARIO_ID")]
        id: String,
    },
}

pub async fn handle_command(
    command: ScenarioCommand,
    config: Option<PathBuf>,
    host: &str,
    port: u16,
) -> Result<()> {
    let base = format!("http://{host}:{port}");
    match command {
        ScenarioCommand::Submit { input, wait } => {
            let request = parse_request(&input)?;
            if server_reachable(&base).await {
                submit_remote(&base, request, wait).await
            } else {
                println!(
                    "{}",
                    "No server reachable; running embedded engine".dimmed()
                );
                submit_embedded(config, request).await
            }
        }
        ScenarioCommand::Result { id } => {
            require_server(&base).await?;
            let response: serde_json::Value = reqwest::Client::new()
                .get(format!("{base}/scenarios/{id}/result"))
                .send()
                .await
                .context("Request failed")?
                .json()
                .await
                .context("Malformed response")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        ScenarioCommand::Cancel { id } => {
            require_server(&base).await?;
            let response = reqwest::Client::new()
                .delete(format!("{base}/scenarios/{id}"))
                .send()
                .await
                .context("Request failed")?;
            if response.status().is_success() {
                println!("{}", "Cancellation requested".yellow());
            } else {
                println!("{}", "Scenario is not live".red());
            }
            Ok(())
        }
    }
}

fn parse_request(input: &str) -> Result<ScenarioRequest> {
    let content = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {path}"))?,
        None => input.to_string(),
    };
    serde_json::from_str(&content).context("Failed to parse scenario JSON")
}

async fn server_reachable(base: &str) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };
    client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}

async fn require_server(base: &str) -> Result<()> {
    if !server_reachable(base).await {
        bail!("No server reachable at {base}; start one with `chorus serve`");
    }
    Ok(())
}

async fn submit_remote(base: &str, request: ScenarioRequest, wait: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/scenarios"))
        .json(&request)
        .send()
        .await
        .context("Submission failed")?;
    if !response.status().is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        bail!("Scenario rejected: {body}");
    }
    let accepted: serde_json::Value = response.json().await.context("Malformed response")?;
    let id = accepted["scenario_id"]
        .as_str()
        .context("Response missing scenario_id")?
        .to_string();
    println!("{} {}", "Accepted:".green().bold(), id);

    if !wait {
        return Ok(());
    }
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let status: serde_json::Value = client
            .get(format!("{base}/scenarios/{id}/result"))
            .send()
            .await
            .context("Result poll failed")?
            .json()
            .await
            .context("Malformed response")?;
        match status["status"].as_str() {
            Some("pending") => continue,
            Some("ready") => {
                let result: NegotiationResult =
                    serde_json::from_value(status["result"].clone())
                        .context("Malformed result payload")?;
                print_result(&result);
                return Ok(());
            }
            _ => {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
        }
    }
}

async fn submit_embedded(config: Option<PathBuf>, request: ScenarioRequest) -> Result<()> {
    let config = load_engine_config(config)?;
    let orchestrator = builtin_orchestrator(config).context("Failed to build the engine")?;
    let accepted = orchestrator
        .submit(request)
        .await
        .context("Scenario rejected")?;
    println!("{} {}", "Accepted:".green().bold(), accepted.scenario_id);

    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        match orchestrator.get_result(accepted.scenario_id).await {
            ResultStatus::Pending { .. } => continue,
            ResultStatus::Ready(result) => {
                print_result(&result);
                return Ok(());
            }
            ResultStatus::Failed { reason } => bail!("Session failed: {reason}"),
            ResultStatus::NotFound => bail!("Session vanished before completing"),
        }
    }
}

fn print_result(result: &NegotiationResult) {
    match &result.outcome {
        NegotiationOutcome::Converged { shortlist, rounds } => {
            println!(
                "{} after {} round(s){}",
                "Converged".green().bold(),
                rounds,
                if result.partial {
                    " (partial)".yellow().to_string()
                } else {
                    String::new()
                }
            );
            for (rank, scored) in shortlist.iter().enumerate() {
                println!(
                    "  {}. {} {}",
                    rank + 1,
                    scored.proposal.title.bold(),
                    format!("(score {:.3})", scored.consensus_score).dimmed()
                );
                println!("     {}", scored.proposal.rationale.dimmed());
            }
        }
        NegotiationOutcome::Escalated { conflict, rounds } => {
            println!(
                "{} after {} round(s): {}",
                "Escalated".red().bold(),
                rounds,
                conflict.reason
            );
            for best in &conflict.best_per_objective {
                println!(
                    "  best for {}: {} {}",
                    best.objective,
                    best.proposal.proposal.title.bold(),
                    format!("(score {:.3})", best.proposal.consensus_score).dimmed()
                );
            }
        }
    }
}
