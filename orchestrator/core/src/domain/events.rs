// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentKind;
use crate::domain::scenario::ScenarioId;
use crate::domain::session::SessionState;

/// Domain events emitted during one session's lifecycle.
///
/// Published on the event bus for external dashboards; the negotiation
/// logic itself never depends on subscribers being present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStateChanged {
        scenario_id: ScenarioId,
        old_state: SessionState,
        new_state: SessionState,
        at: DateTime<Utc>,
    },
    AgentCompleted {
        scenario_id: ScenarioId,
        agent: AgentKind,
        confidence: f64,
        at: DateTime<Utc>,
    },
    AgentFailed {
        scenario_id: ScenarioId,
        agent: AgentKind,
        error: String,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn scenario_id(&self) -> ScenarioId {
        match self {
            SessionEvent::SessionStateChanged { scenario_id, .. } => *scenario_id,
            SessionEvent::AgentCompleted { scenario_id, .. } => *scenario_id,
            SessionEvent::AgentFailed { scenario_id, .. } => *scenario_id,
        }
    }

    pub fn state_changed(
        scenario_id: ScenarioId,
        old_state: SessionState,
        new_state: SessionState,
    ) -> Self {
        SessionEvent::SessionStateChanged {
            scenario_id,
            old_state,
            new_state,
            at: Utc::now(),
        }
    }
}
