// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Negotiation Engine — Consensus Rounds
//!
//! Pure domain logic: given the Strategy Agent's proposals and the
//! request's preference weights, run bounded merge/prune rounds and
//! produce either a ranked shortlist (at most 3) or an escalation record.
//!
//! # Algorithm
//!
//! Each round:
//! 1. **Merge** proposals whose objective vectors are within the
//!    similarity tolerance (L∞): scores are averaged, rationale is
//!    concatenated, the earliest proposal's identity survives.
//! 2. **Prune** proposals dominated by another (worse or equal on every
//!    objective; exact ties keep the earliest).
//!
//! The loop stops early when the set is stable between rounds or shrinks
//! to ≤ 3 candidates. After the final round, a set of ≤ 3 survivors (or a
//! larger set whose per-objective spread stays within the conflict
//! tolerance) converges; otherwise the session escalates with a
//! [`ConflictRecord`] naming the disagreeing dimensions.
//!
//! Rankings are a deterministic total order: descending consensus score,
//! ties broken by earliest proposal creation time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::proposal::{Objective, Proposal, ProposalId, ScoredProposal};
use crate::domain::scenario::PreferenceWeights;

/// Maximum number of proposals in a converged shortlist
pub const SHORTLIST_LIMIT: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Maximum refinement rounds before escalation is considered
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// L∞ distance under which two proposals merge
    #[serde(default = "default_similarity_tolerance")]
    pub similarity_tolerance: f64,

    /// Per-objective score spread above which survivors are in conflict
    #[serde(default = "default_conflict_tolerance")]
    pub conflict_tolerance: f64,
}

fn default_max_rounds() -> u32 {
    3
}
fn default_similarity_tolerance() -> f64 {
    0.05
}
fn default_conflict_tolerance() -> f64 {
    0.25
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            similarity_tolerance: default_similarity_tolerance(),
            conflict_tolerance: default_conflict_tolerance(),
        }
    }
}

/// One objective dimension on which the surviving proposals disagree
/// beyond the configured tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveConflict {
    pub objective: Objective,
    /// max − min of this objective's score across survivors
    pub spread: f64,
    pub tolerance: f64,
}

/// Best surviving proposal from one objective's perspective
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveBest {
    pub objective: Objective,
    pub proposal: ScoredProposal,
}

/// Produced only when consensus fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub reason: String,
    /// Dimensions that disagreed beyond tolerance, and by how much
    pub dimensions: Vec<ObjectiveConflict>,
    /// The competing top proposal per conflicting objective
    pub best_per_objective: Vec<ObjectiveBest>,
}

/// Terminal negotiation outcome. Non-convergence is a first-class outcome,
/// never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum NegotiationOutcome {
    Converged {
        /// At most [`SHORTLIST_LIMIT`] proposals, descending consensus score
        shortlist: Vec<ScoredProposal>,
        rounds: u32,
    },
    Escalated {
        conflict: ConflictRecord,
        rounds: u32,
    },
}

impl NegotiationOutcome {
    pub fn rounds(&self) -> u32 {
        match self {
            NegotiationOutcome::Converged { rounds, .. } => *rounds,
            NegotiationOutcome::Escalated { rounds, .. } => *rounds,
        }
    }
}

/// Run the bounded consensus algorithm.
pub fn negotiate(
    proposals: Vec<Proposal>,
    weights: &PreferenceWeights,
    config: &NegotiationConfig,
) -> NegotiationOutcome {
    if proposals.is_empty() {
        return NegotiationOutcome::Converged {
            shortlist: Vec::new(),
            rounds: 0,
        };
    }

    // Creation order is the stable tie-break everywhere below.
    let mut working = proposals;
    working.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));

    let mut merged_from: HashMap<ProposalId, Vec<ProposalId>> = HashMap::new();
    let mut rounds_used = 0;

    for _ in 0..config.max_rounds {
        rounds_used += 1;
        let before: Vec<ProposalId> = working.iter().map(|p| p.id).collect();

        working = merge_similar(working, config.similarity_tolerance, &mut merged_from);
        working = prune_dominated(working);

        let after: Vec<ProposalId> = working.iter().map(|p| p.id).collect();
        if working.len() <= SHORTLIST_LIMIT || before == after {
            break;
        }
    }

    let conflicts = conflicting_dimensions(&working, config.conflict_tolerance);
    if working.len() > SHORTLIST_LIMIT && !conflicts.is_empty() {
        let best_per_objective = conflicts
            .iter()
            .map(|c| ObjectiveBest {
                objective: c.objective,
                proposal: best_for_objective(&working, c.objective, weights, &merged_from),
            })
            .collect();
        return NegotiationOutcome::Escalated {
            conflict: ConflictRecord {
                reason: format!(
                    "{} non-dominated proposals remain after {} rounds with objective spread above tolerance",
                    working.len(),
                    rounds_used
                ),
                dimensions: conflicts,
                best_per_objective,
            },
            rounds: rounds_used,
        };
    }

    let mut shortlist: Vec<ScoredProposal> = working
        .into_iter()
        .map(|p| score(p, weights, &merged_from))
        .collect();
    shortlist.sort_by(|a, b| {
        b.consensus_score
            .partial_cmp(&a.consensus_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.proposal.created_at.cmp(&b.proposal.created_at))
    });
    shortlist.truncate(SHORTLIST_LIMIT);

    NegotiationOutcome::Converged {
        shortlist,
        rounds: rounds_used,
    }
}

/// Escalation produced when the negotiation budget elapses before the
/// round loop finishes. The conflict reason is system-generated; the
/// caller still receives the best proposal per objective over the raw set.
pub fn escalate_on_timeout(
    proposals: &[Proposal],
    weights: &PreferenceWeights,
) -> NegotiationOutcome {
    let empty = HashMap::new();
    let best_per_objective = Objective::ALL
        .iter()
        .filter(|_| !proposals.is_empty())
        .map(|&objective| ObjectiveBest {
            objective,
            proposal: best_for_objective(proposals, objective, weights, &empty),
        })
        .collect();
    NegotiationOutcome::Escalated {
        conflict: ConflictRecord {
            reason: "negotiation budget exhausted before consensus".to_string(),
            dimensions: Vec::new(),
            best_per_objective,
        },
        rounds: 0,
    }
}

fn score(
    proposal: Proposal,
    weights: &PreferenceWeights,
    merged_from: &HashMap<ProposalId, Vec<ProposalId>>,
) -> ScoredProposal {
    let consensus_score = proposal.objectives.weighted_score(weights);
    let merged = merged_from.get(&proposal.id).cloned().unwrap_or_default();
    ScoredProposal {
        proposal,
        consensus_score,
        merged_from: merged,
    }
}

/// Greedy merge in creation order: each proposal folds into the first
/// earlier representative within tolerance.
fn merge_similar(
    proposals: Vec<Proposal>,
    tolerance: f64,
    merged_from: &mut HashMap<ProposalId, Vec<ProposalId>>,
) -> Vec<Proposal> {
    let mut representatives: Vec<Proposal> = Vec::with_capacity(proposals.len());
    for candidate in proposals {
        match representatives
            .iter_mut()
            .find(|rep| rep.objectives.distance(&candidate.objectives) <= tolerance)
        {
            Some(rep) => {
                rep.objectives = rep.objectives.mean(&candidate.objectives);
                rep.rationale = format!("{} | {}", rep.rationale, candidate.rationale);
                rep.estimated_cost = (rep.estimated_cost + candidate.estimated_cost) / 2.0;
                rep.estimated_benefit = (rep.estimated_benefit + candidate.estimated_benefit) / 2.0;

                let mut absorbed = merged_from.remove(&candidate.id).unwrap_or_default();
                absorbed.push(candidate.id);
                merged_from.entry(rep.id).or_default().extend(absorbed);
            }
            None => representatives.push(candidate),
        }
    }
    representatives
}

/// Drop proposals dominated by another survivor. Exact objective ties keep
/// the earlier proposal.
fn prune_dominated(proposals: Vec<Proposal>) -> Vec<Proposal> {
    let keep: Vec<bool> = proposals
        .iter()
        .enumerate()
        .map(|(i, p)| {
            !proposals.iter().enumerate().any(|(j, q)| {
                if i == j {
                    return false;
                }
                q.objectives.dominates(&p.objectives)
                    || (q.objectives == p.objectives && j < i)
            })
        })
        .collect();
    proposals
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect()
}

fn conflicting_dimensions(proposals: &[Proposal], tolerance: f64) -> Vec<ObjectiveConflict> {
    if proposals.len() < 2 {
        return Vec::new();
    }
    Objective::ALL
        .iter()
        .filter_map(|&objective| {
            let values = proposals.iter().map(|p| p.objectives.get(objective));
            let max = values.clone().fold(f64::MIN, f64::max);
            let min = values.fold(f64::MAX, f64::min);
            let spread = max - min;
            (spread > tolerance).then_some(ObjectiveConflict {
                objective,
                spread,
                tolerance,
            })
        })
        .collect()
}

fn best_for_objective(
    proposals: &[Proposal],
    objective: Objective,
    weights: &PreferenceWeights,
    merged_from: &HashMap<ProposalId, Vec<ProposalId>>,
) -> ScoredProposal {
    let best = proposals
        .iter()
        .max_by(|a, b| {
            a.objectives
                .get(objective)
                .partial_cmp(&b.objectives.get(objective))
                .unwrap_or(std::cmp::Ordering::Equal)
                // Prefer the earlier proposal on ties, so take the later
                // one as "less" here.
                .then(b.created_at.cmp(&a.created_at))
        })
        .expect("caller guarantees at least one proposal");
    score(best.clone(), weights, merged_from)
}
