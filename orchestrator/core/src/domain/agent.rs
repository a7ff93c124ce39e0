// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::proposal::Proposal;
use crate::domain::scenario::ScenarioRequest;
use crate::domain::snapshot::StateSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four analytical agent roles the engine coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Info,
    Scenario,
    Impact,
    Strategy,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Info,
        AgentKind::Scenario,
        AgentKind::Impact,
        AgentKind::Strategy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Info => "info",
            AgentKind::Scenario => "scenario",
            AgentKind::Impact => "impact",
            AgentKind::Strategy => "strategy",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Agent payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub node_id: String,
    pub description: String,
    /// Severity of the anomaly itself, in [0,1]
    pub severity: f64,
}

/// Info Agent output: anomalies detected in current node state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePhase {
    pub name: String,
    pub start_day: u32,
    pub end_day: u32,
    pub description: String,
}

/// Scenario Agent output: classified disruption with a projected timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTimeline {
    /// Short classification label (e.g., "regional-logistics-disruption")
    pub classification: String,
    pub phases: Vec<TimelinePhase>,
}

/// Closed interval describing the Impact Agent's confidence in its own
/// estimates, expressed as multipliers around the expected value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Impact Agent output: estimated disruption impact distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAssessment {
    /// Estimated cost impact in currency units
    pub cost_impact: f64,
    /// Estimated recovery time in days
    pub time_impact_days: f64,
    /// Estimated inventory shortfall as a fraction of demand, in [0,1]
    pub inventory_impact: f64,
    /// Estimated sustainability impact (normalized emissions delta), in [0,1]
    pub sustainability_impact: f64,
    pub confidence_interval: ConfidenceInterval,
}

/// Strategy Agent output: ranked candidate mitigations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySet {
    pub proposals: Vec<Proposal>,
}

/// Tagged union over the four agent outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentPayload {
    Info(AnomalyReport),
    Scenario(ScenarioTimeline),
    Impact(ImpactAssessment),
    Strategy(StrategySet),
}

impl AgentPayload {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentPayload::Info(_) => AgentKind::Info,
            AgentPayload::Scenario(_) => AgentKind::Scenario,
            AgentPayload::Impact(_) => AgentKind::Impact,
            AgentPayload::Strategy(_) => AgentKind::Strategy,
        }
    }
}

/// One completed agent analysis.
///
/// Never mutated after creation; a re-analysis produces a new result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: AgentId,
    pub payload: AgentPayload,
    /// Agent's own confidence in its payload, in [0,1]
    pub confidence: f64,
    pub computed_at: DateTime<Utc>,
}

impl AgentResult {
    pub fn new(agent_id: AgentId, payload: AgentPayload, confidence: f64) -> Self {
        Self {
            agent_id,
            payload,
            confidence: confidence.clamp(0.0, 1.0),
            computed_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.payload.kind()
    }
}

// ============================================================================
// Agent capability port
// ============================================================================

/// Input handed to an agent for one analysis.
///
/// Stage-1 agents receive the state snapshot; stage-2 agents additionally
/// receive the Scenario output (and the Info output when available). A
/// failed upstream agent appears in `missing_inputs` rather than blocking
/// the downstream call.
#[derive(Debug, Clone)]
pub struct AgentInput {
    pub scenario: ScenarioRequest,
    pub snapshot: Option<StateSnapshot>,
    pub scenario_output: Option<ScenarioTimeline>,
    pub info_output: Option<AnomalyReport>,
    /// Upstream agent kinds that failed terminally (degraded mode marker)
    pub missing_inputs: Vec<AgentKind>,
}

impl AgentInput {
    pub fn stage_one(scenario: ScenarioRequest, snapshot: Option<StateSnapshot>) -> Self {
        Self {
            scenario,
            snapshot,
            scenario_output: None,
            info_output: None,
            missing_inputs: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.missing_inputs.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    /// Network/transport class failure; retriable
    #[error("transport failure: {0}")]
    Transport(String),

    /// One attempt exceeded its deadline; retriable
    #[error("agent '{agent}' timed out after {timeout:?}")]
    Timeout {
        agent: AgentKind,
        timeout: std::time::Duration,
    },

    /// Malformed input; never retried
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The agent's internal reasoning failed in a non-transient way
    #[error("agent internal failure: {0}")]
    Internal(String),

    /// Retry budget exhausted; the agent is treated as terminally failed
    #[error("agent '{agent}' unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        agent: AgentKind,
        attempts: u32,
        last_error: String,
    },

    /// The surrounding session was cancelled
    #[error("invocation cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Transport(_) | AgentError::Timeout { .. })
    }
}

/// Uniform wrapper each of the four agents implements.
///
/// Internal reasoning is opaque: a rule engine, an ML model, or a remote
/// model call all satisfy this contract equally. The engine depends only
/// on the latency/failure behavior.
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn analyze(&self, input: AgentInput) -> Result<AgentResult, AgentError>;
}
