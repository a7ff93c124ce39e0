// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a submitted disruption scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScenarioId(pub Uuid);

impl ScenarioId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ScenarioId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Scaling factor used by built-in agents and impact math
    pub fn factor(&self) -> f64 {
        match self {
            Severity::Low => 0.3,
            Severity::Medium => 0.6,
            Severity::High => 1.0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// User preference weights over the four negotiation objectives.
///
/// Each weight is in [0,1] and the vector must sum to 1. Defaults to an
/// equal split when the caller does not express a preference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreferenceWeights {
    pub cost: f64,
    pub time: f64,
    pub risk: f64,
    pub sustainability: f64,
}

impl Default for PreferenceWeights {
    fn default() -> Self {
        Self {
            cost: 0.25,
            time: 0.25,
            risk: 0.25,
            sustainability: 0.25,
        }
    }
}

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

impl PreferenceWeights {
    /// Weight vector in objective order: cost, risk, sustainability, time
    pub fn as_array(&self) -> [f64; 4] {
        [self.cost, self.risk, self.sustainability, self.time]
    }

    pub fn validate(&self) -> Result<(), ScenarioValidationError> {
        for (name, w) in [
            ("cost", self.cost),
            ("time", self.time),
            ("risk", self.risk),
            ("sustainability", self.sustainability),
        ] {
            if !(0.0..=1.0).contains(&w) || !w.is_finite() {
                return Err(ScenarioValidationError::WeightOutOfRange {
                    objective: name.to_string(),
                    value: w,
                });
            }
        }
        let sum = self.cost + self.time + self.risk + self.sustainability;
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ScenarioValidationError::WeightsDoNotSumToOne { sum });
        }
        Ok(())
    }
}

/// A raw disruption scenario as submitted by the caller.
///
/// Immutable once accepted; identified by a generated [`ScenarioId`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRequest {
    /// Disruption category (e.g., "port-closure", "supplier-outage")
    pub disruption_type: String,

    /// Geographic location or region label
    pub location: String,

    pub severity: Severity,

    /// Expected disruption duration in days
    pub duration_days: u32,

    /// Supply-chain node identifiers affected by the disruption
    pub affected_nodes: Vec<String>,

    /// Optional preference weights; equal split when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<PreferenceWeights>,

    /// Caller-supplied idempotency key. When absent, a canonical request
    /// hash is derived so duplicate submissions still dedup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl ScenarioRequest {
    /// Validate the request before a session is created.
    ///
    /// Rejection here is a hard error to the caller and is never retried.
    pub fn validate(&self) -> Result<(), ScenarioValidationError> {
        if self.disruption_type.trim().is_empty() {
            return Err(ScenarioValidationError::EmptyDisruptionType);
        }
        if self.duration_days == 0 {
            return Err(ScenarioValidationError::ZeroDuration);
        }
        if self.affected_nodes.is_empty() {
            return Err(ScenarioValidationError::NoAffectedNodes);
        }
        if self
            .affected_nodes
            .iter()
            .any(|n| n.trim().is_empty())
        {
            return Err(ScenarioValidationError::EmptyNodeId);
        }
        if let Some(weights) = &self.weights {
            weights.validate()?;
        }
        Ok(())
    }

    /// Effective weights: caller preference or the equal-split default
    pub fn effective_weights(&self) -> PreferenceWeights {
        self.weights.unwrap_or_default()
    }

    /// Idempotency key: caller-supplied, or a SHA-256 over the canonical
    /// request content.
    pub fn dedup_key(&self) -> String {
        if let Some(key) = &self.idempotency_key {
            return key.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.disruption_type.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.location.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.severity.to_string().as_bytes());
        hasher.update(self.duration_days.to_le_bytes());
        for node in &self.affected_nodes {
            hasher.update(b"\0");
            hasher.update(node.as_bytes());
        }
        if let Some(w) = &self.weights {
            for v in w.as_array() {
                hasher.update(v.to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScenarioValidationError {
    #[error("disruption_type cannot be empty")]
    EmptyDisruptionType,

    #[error("duration_days must be at least 1")]
    ZeroDuration,

    #[error("at least one affected node is required")]
    NoAffectedNodes,

    #[error("affected node identifiers cannot be empty")]
    EmptyNodeId,

    #[error("weight for objective '{objective}' out of range: {value}")]
    WeightOutOfRange { objective: String, value: f64 },

    #[error("preference weights must sum to 1.0, got {sum}")]
    WeightsDoNotSumToOne { sum: f64 },
}

/// Submission timestamped with its accepted identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedScenario {
    pub scenario_id: ScenarioId,
    pub request: ScenarioRequest,
    pub accepted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ScenarioRequest {
        ScenarioRequest {
            disruption_type: "port-closure".to_string(),
            location: "rotterdam".to_string(),
            severity: Severity::High,
            duration_days: 14,
            affected_nodes: vec!["dc-eu-1".to_string(), "port-rtm".to_string()],
            weights: None,
            idempotency_key: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_zero_duration() {
        let mut req = request();
        req.duration_days = 0;
        assert_eq!(req.validate(), Err(ScenarioValidationError::ZeroDuration));
    }

    #[test]
    fn rejects_missing_nodes() {
        let mut req = request();
        req.affected_nodes.clear();
        assert_eq!(req.validate(), Err(ScenarioValidationError::NoAffectedNodes));
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let mut req = request();
        req.weights = Some(PreferenceWeights {
            cost: 0.5,
            time: 0.5,
            risk: 0.5,
            sustainability: 0.5,
        });
        assert!(matches!(
            req.validate(),
            Err(ScenarioValidationError::WeightsDoNotSumToOne { .. })
        ));
    }

    #[test]
    fn dedup_key_is_stable_and_content_sensitive() {
        let a = request();
        let b = request();
        assert_eq!(a.dedup_key(), b.dedup_key());

        let mut c = request();
        c.duration_days = 15;
        assert_ne!(a.dedup_key(), c.dedup_key());
    }

    #[test]
    fn caller_supplied_key_wins() {
        let mut req = request();
        req.idempotency_key = Some("caller-key-1".to_string());
        assert_eq!(req.dedup_key(), "caller-key-1");
    }
}
