// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

// Engine Configuration Types
//
// Kubernetes-style manifest format (apiVersion/kind/metadata/spec) for
// the negotiation engine's tunables: per-agent timeout, retry policy,
// negotiation limits, idempotency retention and the audit store path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::negotiation::NegotiationConfig;

pub const API_VERSION: &str = "chorus.dev/v1";
pub const CONFIG_KIND: &str = "EngineConfig";

/// Top-level manifest wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable engine instance name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl EngineConfigManifest {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::InvalidApiVersion(self.api_version.clone()));
        }
        if self.kind != CONFIG_KIND {
            return Err(ConfigError::InvalidKind(self.kind.clone()));
        }
        if self.metadata.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        self.spec.validate()
    }
}

/// Retry policy applied by the supervisor to transient agent failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// First backoff delay; doubles per attempt
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    pub base_delay: Duration,

    /// Total attempts including the first (not retries after it)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Jitter fraction applied to each backoff delay (0.2 → ±20%)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_attempts: default_max_attempts(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-agent invocation deadline; also the per-stage ceiling, so the
    /// coordinator's total agent wait never exceeds twice this value
    #[serde(with = "humantime_serde", default = "default_agent_timeout")]
    pub agent_timeout: Duration,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub negotiation: NegotiationConfig,

    /// Budget for the consensus rounds once agents have returned
    #[serde(with = "humantime_serde", default = "default_negotiation_budget")]
    pub negotiation_budget: Duration,

    /// Deadline for the outbound state snapshot read
    #[serde(with = "humantime_serde", default = "default_snapshot_timeout")]
    pub snapshot_timeout: Duration,

    /// Idempotency window: duplicate submissions within this window
    /// return the existing session's result
    #[serde(with = "humantime_serde", default = "default_retention")]
    pub retention: Duration,

    /// Audit store location; in-memory when absent (tests, dry runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_path: Option<PathBuf>,
}

fn default_agent_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_base_delay() -> Duration {
    Duration::from_secs(2)
}
fn default_max_attempts() -> u32 {
    3
}
fn default_jitter() -> f64 {
    0.2
}
fn default_negotiation_budget() -> Duration {
    Duration::from_secs(10)
}
fn default_snapshot_timeout() -> Duration {
    Duration::from_secs(1)
}
fn default_retention() -> Duration {
    Duration::from_secs(3600)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agent_timeout: default_agent_timeout(),
            retry: RetryConfig::default(),
            negotiation: NegotiationConfig::default(),
            negotiation_budget: default_negotiation_budget(),
            snapshot_timeout: default_snapshot_timeout(),
            retention: default_retention(),
            audit_path: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("agent_timeout"));
        }
        if self.negotiation_budget.is_zero() {
            return Err(ConfigError::ZeroDuration("negotiation_budget"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !(0.0..1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::OutOfRange {
                field: "retry.jitter",
                value: self.retry.jitter,
            });
        }
        if self.negotiation.max_rounds == 0 {
            return Err(ConfigError::OutOfRange {
                field: "negotiation.max_rounds",
                value: 0.0,
            });
        }
        for (field, value) in [
            (
                "negotiation.similarity_tolerance",
                self.negotiation.similarity_tolerance,
            ),
            (
                "negotiation.conflict_tolerance",
                self.negotiation.conflict_tolerance,
            ),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid apiVersion: expected '{API_VERSION}', got '{0}'")]
    InvalidApiVersion(String),

    #[error("invalid kind: expected '{CONFIG_KIND}', got '{0}'")]
    InvalidKind(String),

    #[error("metadata.name cannot be empty")]
    EmptyName,

    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),

    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn defaults_match_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.agent_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.base_delay, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 3);
        assert!((config.retry.jitter - 0.2).abs() < 1e-9);
        assert_eq!(config.negotiation.max_rounds, 3);
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroAttempts));
    }

    #[test]
    fn rejects_tolerance_out_of_range() {
        let mut config = EngineConfig::default();
        config.negotiation.conflict_tolerance = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "negotiation.conflict_tolerance", .. })
        ));
    }
}
