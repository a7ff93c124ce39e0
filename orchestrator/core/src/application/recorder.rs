// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Explainability Recorder
//!
//! Turns a session that has reached its outcome into the annotated result
//! returned to callers and the audit record persisted to the log. Every
//! surfaced field carries the agent that produced it and that agent's
//! confidence; the decision tree is a renderable account of how the
//! shortlist (or escalation) came to be.

use anyhow::{bail, Result};
use chrono::Utc;

use crate::domain::agent::{AgentKind, AgentPayload, AgentResult, ConfidenceInterval};
use crate::domain::audit::{AuditDecision, AuditRecord};
use crate::domain::explain::{
    Attribution, DecisionNode, FieldAttribution, NegotiationResult, UncertaintyRange,
};
use crate::domain::negotiation::NegotiationOutcome;
use crate::domain::session::NegotiationSession;

pub struct ExplainabilityRecorder;

impl ExplainabilityRecorder {
    /// Annotate a session whose outcome is decided.
    ///
    /// Fails only when called before negotiation produced an outcome,
    /// which is a sequencing bug in the caller.
    pub fn annotate(session: &NegotiationSession) -> Result<(NegotiationResult, AuditRecord)> {
        let Some(outcome) = &session.outcome else {
            bail!(
                "session {} has no negotiation outcome to record",
                session.scenario_id
            );
        };
        let weights = session.request.effective_weights();

        let interval = impact_interval(session);
        let uncertainty = match outcome {
            NegotiationOutcome::Converged { shortlist, .. } => shortlist
                .iter()
                .map(|s| {
                    UncertaintyRange::from_interval(
                        s.consensus_score,
                        interval.map(|i| i.lower),
                        interval.map(|i| i.upper),
                    )
                })
                .collect(),
            NegotiationOutcome::Escalated { .. } => Vec::new(),
        };

        let result = NegotiationResult {
            scenario_id: session.scenario_id,
            state: session.state,
            outcome: outcome.clone(),
            partial: session.partial,
            weights,
            field_attributions: field_attributions(session),
            decision_tree: decision_tree(session, outcome, interval),
            uncertainty,
            completed_at: Utc::now(),
        };

        let decision = match outcome {
            NegotiationOutcome::Converged { shortlist, .. } => AuditDecision::Selected {
                shortlist: shortlist.clone(),
            },
            NegotiationOutcome::Escalated { conflict, .. } => AuditDecision::Escalated {
                conflict: conflict.clone(),
            },
        };
        let audit = AuditRecord {
            scenario_id: session.scenario_id,
            decision,
            weights,
            partial: session.partial,
            recorded_at: result.completed_at,
        };

        Ok((result, audit))
    }
}

fn attribution(result: &AgentResult, kind: AgentKind) -> Attribution {
    Attribution {
        agent: kind,
        agent_id: result.agent_id,
        confidence: result.confidence,
    }
}

fn impact_interval(session: &NegotiationSession) -> Option<ConfidenceInterval> {
    session
        .result(AgentKind::Impact)
        .and_then(|r| match &r.payload {
            AgentPayload::Impact(assessment) => Some(assessment.confidence_interval),
            _ => None,
        })
}

/// One attribution per surfaced output field, in canonical agent order.
fn field_attributions(session: &NegotiationSession) -> Vec<FieldAttribution> {
    let mut attributions = Vec::new();
    for kind in AgentKind::ALL {
        let Some(result) = session.result(kind) else {
            continue;
        };
        let fields: &[&str] = match kind {
            AgentKind::Info => &["anomalies"],
            AgentKind::Scenario => &["classification", "timeline"],
            AgentKind::Impact => &["impact_assessment", "uncertainty"],
            AgentKind::Strategy => &["proposals"],
        };
        for field in fields {
            attributions.push(FieldAttribution {
                field: (*field).to_string(),
                attribution: attribution(result, kind),
            });
        }
    }
    attributions
}

fn decision_tree(
    session: &NegotiationSession,
    outcome: &NegotiationOutcome,
    interval: Option<ConfidenceInterval>,
) -> DecisionNode {
    let mut agent_nodes = Vec::new();
    for kind in AgentKind::ALL {
        match session.result(kind) {
            Some(result) => {
                let detail = match &result.payload {
                    AgentPayload::Info(report) => {
                        format!("{} anomalies detected", report.anomalies.len())
                    }
                    AgentPayload::Scenario(timeline) => format!(
                        "classified '{}' across {} phases",
                        timeline.classification,
                        timeline.phases.len()
                    ),
                    AgentPayload::Impact(assessment) => format!(
                        "estimated cost impact {:.0}, recovery {:.1} days",
                        assessment.cost_impact, assessment.time_impact_days
                    ),
                    AgentPayload::Strategy(set) => {
                        format!("{} candidate proposals", set.proposals.len())
                    }
                };
                agent_nodes.push(
                    DecisionNode::new(format!("{} agent", kind))
                        .with_attribution(attribution(result, kind))
                        .with_detail(detail),
                );
            }
            None if session.failed_agents.contains(&kind) => {
                agent_nodes.push(
                    DecisionNode::new(format!("{} agent", kind))
                        .with_detail("failed terminally; run continued degraded"),
                );
            }
            None => {}
        }
    }

    let negotiation_node = match outcome {
        NegotiationOutcome::Converged { shortlist, rounds } => DecisionNode::new("consensus")
            .with_detail(format!(
                "converged on {} proposals after {} rounds",
                shortlist.len(),
                rounds
            ))
            .with_children(
                shortlist
                    .iter()
                    .map(|s| {
                        let mut node = DecisionNode::new(s.proposal.title.clone()).with_detail(
                            format!(
                                "consensus score {:.3}; merged {} proposals",
                                s.consensus_score,
                                s.merged_from.len()
                            ),
                        );
                        if interval.is_some() {
                            node = node.with_uncertainty(UncertaintyRange::from_interval(
                                s.consensus_score,
                                interval.map(|i| i.lower),
                                interval.map(|i| i.upper),
                            ));
                        }
                        node
                    })
                    .collect(),
            ),
        NegotiationOutcome::Escalated { conflict, rounds } => DecisionNode::new("escalation")
            .with_detail(format!("{} (after {} rounds)", conflict.reason, rounds))
            .with_children(
                conflict
                    .best_per_objective
                    .iter()
                    .map(|best| {
                        let mut node = DecisionNode::new(format!("best for {}", best.objective))
                            .with_detail(format!(
                                "'{}' (score {:.3})",
                                best.proposal.proposal.title, best.proposal.consensus_score
                            ));
                        if interval.is_some() {
                            node = node.with_uncertainty(UncertaintyRange::from_interval(
                                best.proposal.consensus_score,
                                interval.map(|i| i.lower),
                                interval.map(|i| i.upper),
                            ));
                        }
                        node
                    })
                    .collect(),
            ),
    };

    let root_label = session
        .result(AgentKind::Scenario)
        .and_then(|r| match &r.payload {
            AgentPayload::Scenario(timeline) => Some(timeline.classification.clone()),
            _ => None,
        })
        .unwrap_or_else(|| session.request.disruption_type.clone());

    DecisionNode::new(root_label)
        .with_detail(format!(
            "{} at {} ({} severity, {} days)",
            session.request.disruption_type,
            session.request.location,
            session.request.severity,
            session.request.duration_days
        ))
        .with_children(
            agent_nodes
                .into_iter()
                .chain(std::iter::once(negotiation_node))
                .collect(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, AnomalyReport, ImpactAssessment, StrategySet};
    use crate::domain::negotiation::{negotiate, NegotiationConfig};
    use crate::domain::proposal::{ObjectiveVector, Proposal};
    use crate::domain::scenario::{ScenarioId, ScenarioRequest, Severity};
    use crate::domain::session::SessionState;

    fn session_with_outcome() -> NegotiationSession {
        let request = ScenarioRequest {
            disruption_type: "port-closure".to_string(),
            location: "rotterdam".to_string(),
            severity: Severity::High,
            duration_days: 10,
            affected_nodes: vec!["dc-1".to_string()],
            weights: None,
            idempotency_key: None,
        };
        let mut session = NegotiationSession::new(ScenarioId::new(), request);
        session.transition_to(SessionState::Running).unwrap();

        session
            .record_result(AgentResult::new(
                AgentId::new(),
                AgentPayload::Info(AnomalyReport { anomalies: vec![] }),
                0.9,
            ))
            .unwrap();
        session.record_agent_failure(AgentKind::Scenario);

        session.transition_to(SessionState::Aggregating).unwrap();
        session
            .record_result(AgentResult::new(
                AgentId::new(),
                AgentPayload::Impact(ImpactAssessment {
                    cost_impact: 120_000.0,
                    time_impact_days: 9.0,
                    inventory_impact: 0.4,
                    sustainability_impact: 0.2,
                    confidence_interval: ConfidenceInterval {
                        lower: 0.8,
                        upper: 1.2,
                    },
                }),
                0.8,
            ))
            .unwrap();

        let proposals = vec![
            Proposal::new(
                "reroute",
                ObjectiveVector::new(0.8, 0.2, 0.3, 0.9),
                "shift volume",
            ),
            Proposal::new(
                "dual-source",
                ObjectiveVector::new(0.2, 0.9, 0.8, 0.3),
                "second supplier",
            ),
        ];
        session
            .record_result(AgentResult::new(
                AgentId::new(),
                AgentPayload::Strategy(StrategySet {
                    proposals: proposals.clone(),
                }),
                0.75,
            ))
            .unwrap();

        session.transition_to(SessionState::Negotiating).unwrap();
        let outcome = negotiate(
            proposals,
            &session.request.effective_weights(),
            &NegotiationConfig::default(),
        );
        session.round = outcome.rounds();
        session.outcome = Some(outcome);
        session.transition_to(SessionState::Converged).unwrap();
        session
    }

    fn session_with_escalation() -> NegotiationSession {
        let mut session = session_with_outcome();
        // Replace the converged outcome with an escalation over a spread
        // set that nothing merges or dominates.
        let spread = [
            [0.95, 0.05, 0.50, 0.50],
            [0.05, 0.95, 0.50, 0.50],
            [0.50, 0.50, 0.95, 0.05],
            [0.50, 0.50, 0.05, 0.95],
            [0.70, 0.30, 0.70, 0.30],
        ];
        let proposals: Vec<Proposal> = spread
            .iter()
            .enumerate()
            .map(|(i, v)| {
                Proposal::new(
                    format!("option-{i}"),
                    ObjectiveVector::new(v[0], v[1], v[2], v[3]),
                    "fixture",
                )
            })
            .collect();
        let outcome = negotiate(
            proposals,
            &session.request.effective_weights(),
            &NegotiationConfig::default(),
        );
        assert!(matches!(outcome, NegotiationOutcome::Escalated { .. }));
        session.state = SessionState::Escalated;
        session.outcome = Some(outcome);
        session
    }

    #[test]
    fn annotate_requires_an_outcome() {
        let mut session = session_with_outcome();
        session.outcome = None;
        assert!(ExplainabilityRecorder::annotate(&session).is_err());
    }

    #[test]
    fn every_present_agent_is_attributed() {
        let session = session_with_outcome();
        let (result, audit) = ExplainabilityRecorder::annotate(&session).unwrap();

        let attributed: Vec<AgentKind> = result
            .field_attributions
            .iter()
            .map(|f| f.attribution.agent)
            .collect();
        assert!(attributed.contains(&AgentKind::Info));
        assert!(attributed.contains(&AgentKind::Impact));
        assert!(attributed.contains(&AgentKind::Strategy));
        // Scenario failed: nothing of its output may be attributed.
        assert!(!attributed.contains(&AgentKind::Scenario));

        assert!(result.partial);
        assert!(audit.partial);
        assert_eq!(audit.scenario_id, session.scenario_id);
    }

    #[test]
    fn uncertainty_tracks_the_impact_interval() {
        let session = session_with_outcome();
        let (result, _) = ExplainabilityRecorder::annotate(&session).unwrap();

        match &result.outcome {
            NegotiationOutcome::Converged { shortlist, .. } => {
                assert_eq!(result.uncertainty.len(), shortlist.len());
                for (range, scored) in result.uncertainty.iter().zip(shortlist.iter()) {
                    assert!((range.expected - scored.consensus_score).abs() < 1e-9);
                    assert!(range.best > range.expected);
                    assert!(range.worst < range.expected);
                }
            }
            other => panic!("expected converged, got {:?}", other),
        }
    }

    #[test]
    fn escalation_leaves_carry_the_impact_uncertainty() {
        let session = session_with_escalation();
        let (result, _) = ExplainabilityRecorder::annotate(&session).unwrap();

        let escalation = result.decision_tree.children.last().unwrap();
        assert_eq!(escalation.label, "escalation");
        assert!(!escalation.children.is_empty());
        for leaf in &escalation.children {
            let range = leaf.uncertainty.expect("champion leaf missing uncertainty");
            assert!(range.best > range.expected);
            assert!(range.worst < range.expected);
        }
        // Uncertainty-per-shortlist-entry stays empty: there is no shortlist.
        assert!(result.uncertainty.is_empty());
    }

    #[test]
    fn decision_tree_covers_agents_and_shortlist() {
        let session = session_with_outcome();
        let (result, _) = ExplainabilityRecorder::annotate(&session).unwrap();

        let tree = &result.decision_tree;
        // 3 agent nodes + 1 failed-agent node + the consensus branch.
        assert_eq!(tree.children.len(), 5);
        let consensus = tree.children.last().unwrap();
        assert_eq!(consensus.label, "consensus");
        assert_eq!(consensus.children.len(), 2);
        let failed = tree
            .children
            .iter()
            .find(|n| n.label == "scenario agent")
            .unwrap();
        assert!(failed.attribution.is_none());
    }
}
