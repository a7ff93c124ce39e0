// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! Run the engine as an HTTP server.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use chorus_negotiation_core::application::builtin_orchestrator;
use chorus_negotiation_core::domain::config::EngineConfig;
use chorus_negotiation_core::infrastructure::manifest::load_manifest;
use chorus_negotiation_core::presentation::app;

pub async fn run(config_path: Option<PathBuf>, host: &str, port: u16) -> Result<()> {
    let config = load_engine_config(config_path)?;
    let orchestrator = builtin_orchestrator(config).context("Failed to build the engine")?;
    let router = app(orchestrator.clone());

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    println!(
        "{} listening on {}",
        "Chorus negotiation engine".bold(),
        addr.green()
    );
    info!(addr = %addr, "Server started");

    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested; cancelling live sessions");
        orchestrator.cancel_all();
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    Ok(())
}

/// Manifest from the given path when set, defaults otherwise.
pub fn load_engine_config(config_path: Option<PathBuf>) -> Result<EngineConfig> {
    match config_path {
        Some(path) => Ok(load_manifest(path)?.spec),
        None => Ok(EngineConfig::default()),
    }
}
