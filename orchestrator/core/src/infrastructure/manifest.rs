// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Manifest Loading
//!
//! Parses `EngineConfig` manifests from YAML files and validates them
//! before the engine starts. Parse and validation failures carry enough
//! context to point at the offending field.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::config::EngineConfigManifest;

/// Load and validate an engine manifest from a YAML file.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<EngineConfigManifest> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest file: {}", path.display()))?;
    let manifest = parse_manifest(&contents)
        .with_context(|| format!("invalid manifest: {}", path.display()))?;
    info!(
        name = %manifest.metadata.name,
        "Loaded engine manifest"
    );
    Ok(manifest)
}

/// Parse and validate a manifest from a YAML string.
pub fn parse_manifest(yaml: &str) -> Result<EngineConfigManifest> {
    let manifest: EngineConfigManifest =
        serde_yaml::from_str(yaml).context("failed to parse engine manifest YAML")?;
    manifest.validate().context("manifest validation failed")?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MINIMAL: &str = r#"
apiVersion: chorus.dev/v1
kind: EngineConfig
metadata:
  name: default-engine
spec: {}
"#;

    const FULL: &str = r#"
apiVersion: chorus.dev/v1
kind: EngineConfig
metadata:
  name: prod-engine
  version: "0.4.0"
  labels:
    env: production
spec:
  agent_timeout: 30s
  retry:
    base_delay: 1s
    max_attempts: 5
    jitter: 0.1
  negotiation:
    max_rounds: 5
    similarity_tolerance: 0.1
    conflict_tolerance: 0.3
  negotiation_budget: 5s
  snapshot_timeout: 500ms
  retention: 30m
  audit_path: /var/lib/chorus/audit
"#;

    #[test]
    fn minimal_manifest_uses_defaults() {
        let manifest = parse_manifest(MINIMAL).unwrap();
        assert_eq!(manifest.metadata.name, "default-engine");
        assert_eq!(manifest.spec.agent_timeout, Duration::from_secs(60));
        assert_eq!(manifest.spec.retry.max_attempts, 3);
        assert!(manifest.spec.audit_path.is_none());
    }

    #[test]
    fn full_manifest_parses_all_fields() {
        let manifest = parse_manifest(FULL).unwrap();
        assert_eq!(manifest.spec.agent_timeout, Duration::from_secs(30));
        assert_eq!(manifest.spec.retry.base_delay, Duration::from_secs(1));
        assert_eq!(manifest.spec.retry.max_attempts, 5);
        assert_eq!(manifest.spec.negotiation.max_rounds, 5);
        assert_eq!(manifest.spec.snapshot_timeout, Duration::from_millis(500));
        assert_eq!(manifest.spec.retention, Duration::from_secs(1800));
        assert!(manifest.spec.audit_path.is_some());
    }

    #[test]
    fn rejects_wrong_kind() {
        let yaml = MINIMAL.replace("EngineConfig", "WorkerPool");
        assert!(parse_manifest(&yaml).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_manifest("/nonexistent/engine.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read manifest file"));
    }
}
