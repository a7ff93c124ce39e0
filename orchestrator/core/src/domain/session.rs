// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Negotiation Session Aggregate
//!
//! One session owns the full lifecycle of one scenario's agent run. The
//! session is exclusively owned and mutated by the coordinator's thread of
//! control; everything else sees immutable snapshots.
//!
//! # State Machine
//!
//! ```text
//! Pending → Running → Aggregating → Negotiating → {Converged | Escalated} → Completed
//!    \________\___________\______________\________________________________→ Failed
//! ```
//!
//! Terminal states are `Completed` and `Failed`; there is no retry from a
//! terminal state. A new scenario submission starts a fresh session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::{AgentKind, AgentResult};
use crate::domain::negotiation::NegotiationOutcome;
use crate::domain::scenario::{ScenarioId, ScenarioRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Running,
    Aggregating,
    Negotiating,
    Converged,
    Escalated,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Legal forward edges of the session state machine. `Failed` is
    /// reachable from every non-terminal state (cancellation, deadline,
    /// audit write failure).
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Aggregating)
                | (Aggregating, Negotiating)
                | (Negotiating, Converged)
                | (Negotiating, Escalated)
                | (Converged, Completed)
                | (Escalated, Completed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Pending => "pending",
            SessionState::Running => "running",
            SessionState::Aggregating => "aggregating",
            SessionState::Negotiating => "negotiating",
            SessionState::Converged => "converged",
            SessionState::Escalated => "escalated",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The caller's cancellation propagated into the session
    Cancelled,
    /// The overall session deadline elapsed before agents returned
    DeadlineExceeded,
    /// Negotiation succeeded but the decision could not be durably audited
    AuditWrite { detail: String },
    /// Unexpected engine-side failure
    Internal { detail: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::DeadlineExceeded => write!(f, "deadline exceeded"),
            FailureReason::AuditWrite { detail } => write!(f, "audit write failed: {}", detail),
            FailureReason::Internal { detail } => write!(f, "internal failure: {}", detail),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("invalid transition: {from} → {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("duplicate result for agent '{0}' in this round")]
    DuplicateResult(AgentKind),
}

/// Per-scenario unit of orchestration state.
///
/// # Invariants
/// - At most one [`AgentResult`] per agent kind per round
/// - State changes only through [`NegotiationSession::transition_to`]
/// - An outcome is present exactly when the session passed through
///   `Converged` or `Escalated`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub scenario_id: ScenarioId,
    pub request: ScenarioRequest,
    pub state: SessionState,
    /// Current consensus round (0 until negotiation starts)
    pub round: u32,
    pub results: HashMap<AgentKind, AgentResult>,
    /// Agent kinds that failed terminally during this run
    pub failed_agents: Vec<AgentKind>,
    /// True when any launched agent failed and the run continued degraded
    pub partial: bool,
    pub outcome: Option<NegotiationOutcome>,
    pub failure: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NegotiationSession {
    pub fn new(scenario_id: ScenarioId, request: ScenarioRequest) -> Self {
        let now = Utc::now();
        Self {
            scenario_id,
            request,
            state: SessionState::Pending,
            round: 0,
            results: HashMap::new(),
            failed_agents: Vec::new(),
            partial: false,
            outcome: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, returning the previous state for event publication.
    pub fn transition_to(&mut self, next: SessionState) -> Result<SessionState, SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        let old = self.state;
        self.state = next;
        self.updated_at = Utc::now();
        Ok(old)
    }

    /// Record one agent's result, enforcing the one-result-per-kind
    /// invariant.
    pub fn record_result(&mut self, result: AgentResult) -> Result<(), SessionError> {
        let kind = result.kind();
        if self.results.contains_key(&kind) {
            return Err(SessionError::DuplicateResult(kind));
        }
        self.results.insert(kind, result);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark one agent as terminally failed; the session continues degraded.
    pub fn record_agent_failure(&mut self, kind: AgentKind) {
        if !self.failed_agents.contains(&kind) {
            self.failed_agents.push(kind);
        }
        self.partial = true;
        self.updated_at = Utc::now();
    }

    pub fn result(&self, kind: AgentKind) -> Option<&AgentResult> {
        self.results.get(&kind)
    }

    /// Force the session into `Failed`. Legal from any non-terminal state.
    pub fn fail(&mut self, reason: FailureReason) -> Result<SessionState, SessionError> {
        let old = self.transition_to(SessionState::Failed)?;
        self.failure = Some(reason);
        Ok(old)
    }
}
