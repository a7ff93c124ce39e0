// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::scenario::PreferenceWeights;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub Uuid);

impl ProposalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four negotiation objectives, in canonical vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Cost,
    RiskReduction,
    Sustainability,
    TimeToImplement,
}

impl Objective {
    pub const ALL: [Objective; 4] = [
        Objective::Cost,
        Objective::RiskReduction,
        Objective::Sustainability,
        Objective::TimeToImplement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::Cost => "cost",
            Objective::RiskReduction => "risk_reduction",
            Objective::Sustainability => "sustainability",
            Objective::TimeToImplement => "time_to_implement",
        }
    }

    /// Index into [`ObjectiveVector::as_array`]
    pub fn index(&self) -> usize {
        match self {
            Objective::Cost => 0,
            Objective::RiskReduction => 1,
            Objective::Sustainability => 2,
            Objective::TimeToImplement => 3,
        }
    }
}

impl std::fmt::Display for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized objective scores for one proposal.
///
/// All dimensions are "higher is better" in [0,1]: `cost` is cost
/// effectiveness, `time_to_implement` is speed. Normalizing at the source
/// keeps the weighted sum a plain dot product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveVector {
    pub cost: f64,
    pub risk_reduction: f64,
    pub sustainability: f64,
    pub time_to_implement: f64,
}

impl ObjectiveVector {
    pub fn new(cost: f64, risk_reduction: f64, sustainability: f64, time_to_implement: f64) -> Self {
        Self {
            cost: cost.clamp(0.0, 1.0),
            risk_reduction: risk_reduction.clamp(0.0, 1.0),
            sustainability: sustainability.clamp(0.0, 1.0),
            time_to_implement: time_to_implement.clamp(0.0, 1.0),
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [
            self.cost,
            self.risk_reduction,
            self.sustainability,
            self.time_to_implement,
        ]
    }

    pub fn get(&self, objective: Objective) -> f64 {
        self.as_array()[objective.index()]
    }

    /// Weighted consensus score against the request's preference weights.
    ///
    /// Weight order matches [`PreferenceWeights::as_array`]: the `cost`
    /// weight applies to cost effectiveness, `time` to implementation
    /// speed, `risk` to risk reduction.
    pub fn weighted_score(&self, weights: &PreferenceWeights) -> f64 {
        let w = weights.as_array();
        let v = self.as_array();
        v.iter().zip(w.iter()).map(|(a, b)| a * b).sum()
    }

    /// L-infinity distance; two proposals within the similarity tolerance
    /// on every dimension are merge candidates.
    pub fn distance(&self, other: &ObjectiveVector) -> f64 {
        self.as_array()
            .iter()
            .zip(other.as_array().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// True when `self` is at least as good as `other` on every objective
    /// and strictly better on at least one.
    pub fn dominates(&self, other: &ObjectiveVector) -> bool {
        let a = self.as_array();
        let b = other.as_array();
        let all_geq = a.iter().zip(b.iter()).all(|(x, y)| x >= y);
        let any_gt = a.iter().zip(b.iter()).any(|(x, y)| x > y);
        all_geq && any_gt
    }

    pub fn mean(&self, other: &ObjectiveVector) -> ObjectiveVector {
        ObjectiveVector::new(
            (self.cost + other.cost) / 2.0,
            (self.risk_reduction + other.risk_reduction) / 2.0,
            (self.sustainability + other.sustainability) / 2.0,
            (self.time_to_implement + other.time_to_implement) / 2.0,
        )
    }
}

/// One candidate mitigation strategy produced by the Strategy Agent.
///
/// Proposals are inputs to negotiation and never mutated by it; merging
/// produces a new proposal that keeps the earliest constituent's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub objectives: ObjectiveVector,
    /// Free-text rationale from the producing agent
    pub rationale: String,
    pub estimated_cost: f64,
    pub estimated_benefit: f64,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(
        title: impl Into<String>,
        objectives: ObjectiveVector,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            id: ProposalId::new(),
            title: title.into(),
            objectives,
            rationale: rationale.into(),
            estimated_cost: 0.0,
            estimated_benefit: 0.0,
            created_at: Utc::now(),
        }
    }
}

/// A proposal wrapped with its weighted consensus score.
///
/// Produced by negotiation; rankings over these are always a total order,
/// with ties broken by the underlying proposal's creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredProposal {
    pub proposal: Proposal,
    pub consensus_score: f64,
    /// Identifiers of proposals folded into this one during merge rounds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<ProposalId>,
}
