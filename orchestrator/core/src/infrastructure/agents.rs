// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Built-in Heuristic Agents
//!
//! Deterministic rule-based implementations of the four agent roles, so
//! the orchestrator runs end-to-end without an external reasoning
//! backend. Any other [`Agent`] implementation can replace these; the
//! engine depends only on the capability contract, never on how an agent
//! reasons.

use async_trait::async_trait;

use crate::domain::agent::{
    Agent, AgentError, AgentId, AgentInput, AgentKind, AgentPayload, AgentResult, Anomaly,
    AnomalyReport, ConfidenceInterval, ImpactAssessment, ScenarioTimeline, StrategySet,
    TimelinePhase,
};
use crate::domain::proposal::{ObjectiveVector, Proposal};
use crate::domain::scenario::Severity;

/// Flags nodes whose snapshot state looks unhealthy.
pub struct HeuristicInfoAgent {
    id: AgentId,
}

impl HeuristicInfoAgent {
    pub fn new() -> Self {
        Self { id: AgentId::new() }
    }
}

impl Default for HeuristicInfoAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for HeuristicInfoAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Info
    }

    async fn analyze(&self, input: AgentInput) -> Result<AgentResult, AgentError> {
        let snapshot = input
            .snapshot
            .as_ref()
            .ok_or_else(|| AgentError::InvalidInput("info agent requires a snapshot".into()))?;

        let anomalies: Vec<Anomaly> = snapshot
            .nodes
            .iter()
            .filter_map(|node| {
                let overloaded = node.utilization > 0.85;
                let starved = node.inventory_level < 0.15;
                if !(overloaded || starved) {
                    return None;
                }
                let what = if overloaded {
                    "utilization above capacity threshold"
                } else {
                    "inventory below safety stock"
                };
                Some(Anomaly {
                    node_id: node.node_id.clone(),
                    description: what.to_string(),
                    severity: if overloaded { node.utilization } else { 1.0 - node.inventory_level },
                })
            })
            .collect();

        // Confidence degrades with the fraction of affected nodes missing
        // from the snapshot.
        let requested = input.scenario.affected_nodes.len() as f64;
        let seen = snapshot.nodes.len() as f64;
        let confidence = 0.6 + 0.4 * (seen / requested.max(1.0)).min(1.0);

        Ok(AgentResult::new(
            self.id,
            AgentPayload::Info(AnomalyReport { anomalies }),
            confidence,
        ))
    }
}

/// Projects a phased disruption timeline from severity and duration.
pub struct HeuristicScenarioAgent {
    id: AgentId,
}

impl HeuristicScenarioAgent {
    pub fn new() -> Self {
        Self { id: AgentId::new() }
    }
}

impl Default for HeuristicScenarioAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for HeuristicScenarioAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Scenario
    }

    async fn analyze(&self, input: AgentInput) -> Result<AgentResult, AgentError> {
        let scenario = &input.scenario;
        let duration = scenario.duration_days;
        let onset_end = (duration / 4).max(1);
        let peak_end = (duration * 3 / 4).max(onset_end + 1);

        let classification = format!(
            "{}-{}",
            scenario.disruption_type,
            match scenario.severity {
                Severity::Low => "contained",
                Severity::Medium => "regional",
                Severity::High => "systemic",
            }
        );

        let phases = vec![
            TimelinePhase {
                name: "onset".to_string(),
                start_day: 0,
                end_day: onset_end,
                description: format!("{} begins affecting {}", scenario.disruption_type, scenario.location),
            },
            TimelinePhase {
                name: "peak".to_string(),
                start_day: onset_end,
                end_day: peak_end,
                description: format!(
                    "{} affected nodes at peak disruption",
                    scenario.affected_nodes.len()
                ),
            },
            TimelinePhase {
                name: "recovery".to_string(),
                start_day: peak_end,
                end_day: duration,
                description: "throughput returns toward baseline".to_string(),
            },
        ];

        Ok(AgentResult::new(
            self.id,
            AgentPayload::Scenario(ScenarioTimeline {
                classification,
                phases,
            }),
            0.85,
        ))
    }
}

/// Estimates the impact distribution from severity, duration and the
/// scenario timeline.
pub struct HeuristicImpactAgent {
    id: AgentId,
}

impl HeuristicImpactAgent {
    pub fn new() -> Self {
        Self { id: AgentId::new() }
    }
}

impl Default for HeuristicImpactAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for HeuristicImpactAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Impact
    }

    async fn analyze(&self, input: AgentInput) -> Result<AgentResult, AgentError> {
        let scenario = &input.scenario;
        let factor = scenario.severity.factor();
        let nodes = scenario.affected_nodes.len() as f64;
        let days = scenario.duration_days as f64;

        // Degraded runs widen the interval instead of failing.
        let degraded = input.is_degraded() || input.scenario_output.is_none();
        let (lower, upper) = if degraded { (0.6, 1.4) } else { (0.8, 1.2) };

        let assessment = ImpactAssessment {
            cost_impact: 50_000.0 * factor * nodes * days.sqrt(),
            time_impact_days: days * (0.5 + factor),
            inventory_impact: (0.1 + 0.5 * factor).min(1.0),
            sustainability_impact: (0.05 + 0.3 * factor).min(1.0),
            confidence_interval: ConfidenceInterval { lower, upper },
        };

        Ok(AgentResult::new(
            self.id,
            AgentPayload::Impact(assessment),
            if degraded { 0.55 } else { 0.8 },
        ))
    }
}

/// Generates candidate mitigations with normalized objective vectors.
pub struct HeuristicStrategyAgent {
    id: AgentId,
}

impl HeuristicStrategyAgent {
    pub fn new() -> Self {
        Self { id: AgentId::new() }
    }
}

impl Default for HeuristicStrategyAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for HeuristicStrategyAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Strategy
    }

    async fn analyze(&self, input: AgentInput) -> Result<AgentResult, AgentError> {
        let factor = input.scenario.severity.factor();

        // Candidate playbook: objective trade-offs shift with severity.
        let mut proposals = vec![
            Proposal::new(
                "reroute-through-alternate-lanes",
                ObjectiveVector::new(0.7 - 0.2 * factor, 0.5 + 0.2 * factor, 0.4, 0.8),
                "shift affected volume to alternate transport lanes; fast but lane capacity is finite",
            ),
            Proposal::new(
                "activate-backup-suppliers",
                ObjectiveVector::new(0.4, 0.7 + 0.2 * factor, 0.6, 0.4),
                "qualify and activate secondary suppliers for affected nodes; slower, strong risk reduction",
            ),
            Proposal::new(
                "draw-down-safety-stock",
                ObjectiveVector::new(0.85, 0.3, 0.7, 0.9),
                "serve demand from regional safety stock while the disruption clears; cheap and immediate",
            ),
        ];
        if factor >= 0.6 {
            proposals.push(Proposal::new(
                "expedite-air-freight",
                ObjectiveVector::new(0.15, 0.8, 0.1, 0.95),
                "bridge critical demand by air; very fast, costly and emission-heavy",
            ));
        }

        for p in &mut proposals {
            p.estimated_cost = 10_000.0 + 90_000.0 * (1.0 - p.objectives.cost);
            p.estimated_benefit = 100_000.0 * p.objectives.risk_reduction * factor.max(0.2);
        }

        Ok(AgentResult::new(
            self.id,
            AgentPayload::Strategy(StrategySet { proposals }),
            if input.is_degraded() { 0.6 } else { 0.75 },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scenario::{ScenarioRequest, Severity};
    use crate::infrastructure::snapshot::StaticSnapshotReader;
    use crate::domain::snapshot::SnapshotReader;

    fn request(severity: Severity) -> ScenarioRequest {
        ScenarioRequest {
            disruption_type: "port-closure".to_string(),
            location: "rotterdam".to_string(),
            severity,
            duration_days: 12,
            affected_nodes: vec!["dc-1".to_string(), "port-2".to_string()],
            weights: None,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn info_agent_requires_snapshot() {
        let agent = HeuristicInfoAgent::new();
        let input = AgentInput::stage_one(request(Severity::Low), None);
        assert!(matches!(
            agent.analyze(input).await,
            Err(AgentError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn scenario_agent_phases_cover_duration() {
        let agent = HeuristicScenarioAgent::new();
        let input = AgentInput::stage_one(request(Severity::Medium), None);
        let result = agent.analyze(input).await.unwrap();
        match result.payload {
            AgentPayload::Scenario(timeline) => {
                assert_eq!(timeline.phases.len(), 3);
                assert_eq!(timeline.phases.last().unwrap().end_day, 12);
                assert!(timeline.classification.contains("regional"));
            }
            other => panic!("wrong payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn strategy_agent_adds_expedite_option_for_high_severity() {
        let agent = HeuristicStrategyAgent::new();
        let low = agent
            .analyze(AgentInput::stage_one(request(Severity::Low), None))
            .await
            .unwrap();
        let high = agent
            .analyze(AgentInput::stage_one(request(Severity::High), None))
            .await
            .unwrap();
        let count = |r: &AgentResult| match &r.payload {
            AgentPayload::Strategy(set) => set.proposals.len(),
            _ => 0,
        };
        assert_eq!(count(&low), 3);
        assert_eq!(count(&high), 4);
    }

    #[tokio::test]
    async fn impact_agent_widens_interval_when_degraded() {
        let agent = HeuristicImpactAgent::new();
        let reader = StaticSnapshotReader::new();
        let snapshot = reader
            .read_state(&["dc-1".to_string()])
            .await
            .unwrap();

        let mut healthy = AgentInput::stage_one(request(Severity::Medium), Some(snapshot));
        healthy.scenario_output = Some(ScenarioTimeline {
            classification: "x".into(),
            phases: vec![],
        });
        let mut degraded = healthy.clone();
        degraded.scenario_output = None;
        degraded.missing_inputs = vec![AgentKind::Scenario];

        let interval = |r: AgentResult| match r.payload {
            AgentPayload::Impact(a) => a.confidence_interval,
            _ => panic!("wrong payload"),
        };
        let h = interval(agent.analyze(healthy).await.unwrap());
        let d = interval(agent.analyze(degraded).await.unwrap());
        assert!(d.upper - d.lower > h.upper - h.lower);
    }
}
