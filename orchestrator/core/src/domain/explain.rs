// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

// Explainability Model
//
// Every field of a final result carries the agent that contributed it and
// that agent's confidence; the decision tree gives dashboards a renderable
// account of how the shortlist came to be.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentId, AgentKind};
use crate::domain::negotiation::NegotiationOutcome;
use crate::domain::scenario::{PreferenceWeights, ScenarioId};
use crate::domain::session::SessionState;

/// Which agent contributed a value, and how confident it was
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub agent: AgentKind,
    pub agent_id: AgentId,
    pub confidence: f64,
}

/// Attribution for one named field of the final output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAttribution {
    pub field: String,
    #[serde(flatten)]
    pub attribution: Attribution,
}

/// Best/expected/worst consensus score for one shortlisted proposal,
/// derived from the Impact Agent's confidence interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UncertaintyRange {
    pub best: f64,
    pub expected: f64,
    pub worst: f64,
}

impl UncertaintyRange {
    /// Scale `expected` by the interval's multipliers. A missing interval
    /// (degraded run without an Impact result) collapses the range.
    pub fn from_interval(expected: f64, lower: Option<f64>, upper: Option<f64>) -> Self {
        Self {
            best: expected * upper.unwrap_or(1.0),
            expected,
            worst: expected * lower.unwrap_or(1.0),
        }
    }
}

/// One node of the decision tree: root is the scenario classification,
/// children are per-agent contributions, leaves are the final proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionNode {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<Attribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<UncertaintyRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DecisionNode>,
}

impl DecisionNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            attribution: None,
            detail: None,
            uncertainty: None,
            children: Vec::new(),
        }
    }

    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = Some(attribution);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_uncertainty(mut self, range: UncertaintyRange) -> Self {
        self.uncertainty = Some(range);
        self
    }

    pub fn with_children(mut self, children: Vec<DecisionNode>) -> Self {
        self.children = children;
        self
    }

    pub fn leaf_count(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.iter().map(DecisionNode::leaf_count).sum()
        }
    }
}

/// Final annotated result returned to the caller once a session completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationResult {
    pub scenario_id: ScenarioId,
    /// Outcome state the result was produced from (`Converged` or `Escalated`)
    pub state: SessionState,
    pub outcome: NegotiationOutcome,
    /// True when any agent failed and the run continued degraded
    pub partial: bool,
    /// Weight vector the consensus scores were computed against
    pub weights: PreferenceWeights,
    pub field_attributions: Vec<FieldAttribution>,
    pub decision_tree: DecisionNode,
    /// Uncertainty per shortlisted proposal, in shortlist order
    pub uncertainty: Vec<UncertaintyRange>,
    pub completed_at: DateTime<Utc>,
}
