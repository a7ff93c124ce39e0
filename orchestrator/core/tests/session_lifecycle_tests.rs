// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end session lifecycle tests.
//!
//! Exercises the orchestrator through its public surface: submission,
//! two-stage coordination, consensus, explainability annotation, audit
//! chaining, idempotent resubmission, degraded runs and cancellation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use chorus_negotiation_core::application::{AgentCoordinator, Orchestrator, ResultStatus};
use chorus_negotiation_core::domain::agent::{
    Agent, AgentError, AgentId, AgentInput, AgentKind, AgentPayload, AgentResult, StrategySet,
};
use chorus_negotiation_core::domain::audit::{verify_chain, AuditDecision, AuditStore};
use chorus_negotiation_core::domain::config::EngineConfig;
use chorus_negotiation_core::domain::events::SessionEvent;
use chorus_negotiation_core::domain::explain::NegotiationResult;
use chorus_negotiation_core::domain::negotiation::NegotiationOutcome;
use chorus_negotiation_core::domain::proposal::{ObjectiveVector, Proposal};
use chorus_negotiation_core::domain::scenario::{
    PreferenceWeights, ScenarioId, ScenarioRequest, Severity,
};
use chorus_negotiation_core::domain::session::{FailureReason, SessionState};
use chorus_negotiation_core::infrastructure::agents::{
    HeuristicImpactAgent, HeuristicInfoAgent, HeuristicScenarioAgent, HeuristicStrategyAgent,
};
use chorus_negotiation_core::infrastructure::audit_store::InMemoryAuditStore;
use chorus_negotiation_core::infrastructure::event_bus::EventBus;
use chorus_negotiation_core::infrastructure::repositories::InMemorySessionRepository;
use chorus_negotiation_core::infrastructure::snapshot::StaticSnapshotReader;

struct BrokenAgent(AgentKind);

#[async_trait]
impl Agent for BrokenAgent {
    fn kind(&self) -> AgentKind {
        self.0
    }

    async fn analyze(&self, _input: AgentInput) -> Result<AgentResult, AgentError> {
        Err(AgentError::Internal("model offline".into()))
    }
}

struct SlowAgent(AgentKind);

#[async_trait]
impl Agent for SlowAgent {
    fn kind(&self) -> AgentKind {
        self.0
    }

    async fn analyze(&self, _input: AgentInput) -> Result<AgentResult, AgentError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(AgentError::Internal("unreachable".into()))
    }
}

/// Strategy agent emitting a fixed proposal set.
struct FixedStrategyAgent(Vec<Proposal>);

#[async_trait]
impl Agent for FixedStrategyAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Strategy
    }

    async fn analyze(&self, _input: AgentInput) -> Result<AgentResult, AgentError> {
        Ok(AgentResult::new(
            AgentId::new(),
            AgentPayload::Strategy(StrategySet {
                proposals: self.0.clone(),
            }),
            0.8,
        ))
    }
}

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.agent_timeout = Duration::from_secs(2);
    config.snapshot_timeout = Duration::from_millis(200);
    config.retry.base_delay = Duration::from_millis(5);
    config
}

fn request() -> ScenarioRequest {
    ScenarioRequest {
        disruption_type: "port-closure".to_string(),
        location: "rotterdam".to_string(),
        severity: Severity::High,
        duration_days: 10,
        affected_nodes: vec!["dc-eu-1".to_string(), "port-rtm".to_string()],
        weights: Some(PreferenceWeights {
            cost: 0.4,
            time: 0.2,
            risk: 0.3,
            sustainability: 0.1,
        }),
        idempotency_key: None,
    }
}

struct Harness {
    orchestrator: Orchestrator,
    audit: Arc<InMemoryAuditStore>,
    event_bus: EventBus,
}

fn harness_with(agents: Vec<Arc<dyn Agent>>, config: EngineConfig) -> Harness {
    let event_bus = EventBus::new(256);
    let audit = Arc::new(InMemoryAuditStore::new());
    let coordinator = AgentCoordinator::new(
        agents,
        Arc::new(StaticSnapshotReader::new()),
        event_bus.clone(),
        config.clone(),
    )
    .unwrap();
    let orchestrator = Orchestrator::new(
        config,
        coordinator,
        audit.clone(),
        Arc::new(InMemorySessionRepository::new()),
        event_bus.clone(),
    );
    Harness {
        orchestrator,
        audit,
        event_bus,
    }
}

fn harness() -> Harness {
    harness_with(full_roster(), fast_config())
}

fn full_roster() -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(HeuristicInfoAgent::new()),
        Arc::new(HeuristicScenarioAgent::new()),
        Arc::new(HeuristicImpactAgent::new()),
        Arc::new(HeuristicStrategyAgent::new()),
    ]
}

async fn wait_terminal(orchestrator: &Orchestrator, id: ScenarioId) -> ResultStatus {
    for _ in 0..500 {
        match orchestrator.get_result(id).await {
            status @ (ResultStatus::Ready(_) | ResultStatus::Failed { .. }) => return status,
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("session did not reach a terminal state");
}

async fn wait_ready(orchestrator: &Orchestrator, id: ScenarioId) -> NegotiationResult {
    match wait_terminal(orchestrator, id).await {
        ResultStatus::Ready(result) => result,
        other => panic!("expected ready, got {:?}", other),
    }
}

#[tokio::test]
async fn full_lifecycle_converges_and_audits_once() {
    let h = harness();
    let accepted = h.orchestrator.submit(request()).await.unwrap();
    let result = wait_ready(&h.orchestrator, accepted.scenario_id).await;

    assert!(!result.partial);
    match &result.outcome {
        NegotiationOutcome::Converged { shortlist, rounds } => {
            assert!(!shortlist.is_empty() && shortlist.len() <= 3);
            assert!(*rounds >= 1);
            // Descending consensus order.
            for pair in shortlist.windows(2) {
                assert!(pair[0].consensus_score >= pair[1].consensus_score);
            }
        }
        other => panic!("expected convergence, got {:?}", other),
    }
    assert!(!result.field_attributions.is_empty());
    assert!(result.decision_tree.leaf_count() > 1);

    let entries = h.audit.entries_for(accepted.scenario_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(matches!(
        entries[0].record.decision,
        AuditDecision::Selected { .. }
    ));
    assert!(verify_chain(&h.audit.all().await));
}

#[tokio::test]
async fn duplicate_submission_runs_once() {
    let h = harness();
    let first = h.orchestrator.submit(request()).await.unwrap();
    let second = h.orchestrator.submit(request()).await.unwrap();
    assert_eq!(first.scenario_id, second.scenario_id);

    wait_ready(&h.orchestrator, first.scenario_id).await;
    // Resubmitting after completion still dedups inside the window.
    let third = h.orchestrator.submit(request()).await.unwrap();
    assert_eq!(first.scenario_id, third.scenario_id);

    let entries = h.audit.entries_for(first.scenario_id).await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_duplicate_submissions_run_once() {
    let h = harness();
    let tasks = 16;
    let barrier = Arc::new(tokio::sync::Barrier::new(tasks));

    let mut handles = Vec::new();
    for _ in 0..tasks {
        let orchestrator = h.orchestrator.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            orchestrator.submit(request()).await.unwrap().scenario_id
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    let unique: std::collections::HashSet<ScenarioId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 1, "duplicates must share one session");

    wait_ready(&h.orchestrator, ids[0]).await;
    let entries = h.audit.entries_for(ids[0]).await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn caller_idempotency_key_overrides_content() {
    let h = harness();
    let mut a = request();
    a.idempotency_key = Some("run-42".to_string());
    let mut b = request();
    b.duration_days = 20;
    b.idempotency_key = Some("run-42".to_string());

    let first = h.orchestrator.submit(a).await.unwrap();
    let second = h.orchestrator.submit(b).await.unwrap();
    assert_eq!(first.scenario_id, second.scenario_id);
}

#[tokio::test]
async fn stage_one_failure_yields_partial_result() {
    let roster: Vec<Arc<dyn Agent>> = vec![
        Arc::new(HeuristicInfoAgent::new()),
        Arc::new(BrokenAgent(AgentKind::Scenario)),
        Arc::new(HeuristicImpactAgent::new()),
        Arc::new(HeuristicStrategyAgent::new()),
    ];
    let h = harness_with(roster, fast_config());
    let accepted = h.orchestrator.submit(request()).await.unwrap();
    let result = wait_ready(&h.orchestrator, accepted.scenario_id).await;

    assert!(result.partial);
    // Nothing from the failed agent may be attributed.
    assert!(result
        .field_attributions
        .iter()
        .all(|f| f.attribution.agent != AgentKind::Scenario));

    let entries = h.audit.entries_for(accepted.scenario_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].record.partial);
}

#[tokio::test]
async fn irreconcilable_proposals_escalate() {
    let spread = vec![
        [0.95, 0.05, 0.50, 0.50],
        [0.05, 0.95, 0.50, 0.50],
        [0.50, 0.50, 0.95, 0.05],
        [0.50, 0.50, 0.05, 0.95],
        [0.70, 0.30, 0.70, 0.30],
    ];
    let proposals: Vec<Proposal> = spread
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            Proposal::new(
                format!("option-{i}"),
                ObjectiveVector::new(v[0], v[1], v[2], v[3]),
                "fixture",
            )
        })
        .collect();

    let roster: Vec<Arc<dyn Agent>> = vec![
        Arc::new(HeuristicInfoAgent::new()),
        Arc::new(HeuristicScenarioAgent::new()),
        Arc::new(HeuristicImpactAgent::new()),
        Arc::new(FixedStrategyAgent(proposals)),
    ];
    let h = harness_with(roster, fast_config());
    let accepted = h.orchestrator.submit(request()).await.unwrap();
    let result = wait_ready(&h.orchestrator, accepted.scenario_id).await;

    match &result.outcome {
        NegotiationOutcome::Escalated { conflict, .. } => {
            assert!(!conflict.dimensions.is_empty());
            assert!(!conflict.best_per_objective.is_empty());
        }
        other => panic!("expected escalation, got {:?}", other),
    }
    assert!(result.uncertainty.is_empty());

    let entries = h.audit.entries_for(accepted.scenario_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(matches!(
        entries[0].record.decision,
        AuditDecision::Escalated { .. }
    ));
}

#[tokio::test]
async fn cancellation_fails_the_session() {
    let roster: Vec<Arc<dyn Agent>> = vec![
        Arc::new(SlowAgent(AgentKind::Info)),
        Arc::new(HeuristicScenarioAgent::new()),
        Arc::new(HeuristicImpactAgent::new()),
        Arc::new(HeuristicStrategyAgent::new()),
    ];
    let mut config = fast_config();
    config.agent_timeout = Duration::from_secs(60);
    let h = harness_with(roster, config);

    let accepted = h.orchestrator.submit(request()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.orchestrator.cancel(accepted.scenario_id));

    match wait_terminal(&h.orchestrator, accepted.scenario_id).await {
        ResultStatus::Failed { reason } => assert_eq!(reason, FailureReason::Cancelled),
        other => panic!("expected failed, got {:?}", other),
    }

    // A cancelled session still leaves its audit trace.
    let entries = h.audit.entries_for(accepted.scenario_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(matches!(
        entries[0].record.decision,
        AuditDecision::Failed {
            reason: FailureReason::Cancelled
        }
    ));
}

#[tokio::test]
async fn cancelling_unknown_session_is_a_noop() {
    let h = harness();
    assert!(!h.orchestrator.cancel(ScenarioId::new()));
}

#[tokio::test]
async fn event_stream_reports_lifecycle_in_order() {
    let h = harness();
    // Subscribe to the whole bus before submitting so no event is missed,
    // then filter on the accepted identity.
    let mut receiver = h.event_bus.subscribe();
    let accepted = h.orchestrator.submit(request()).await.unwrap();

    wait_ready(&h.orchestrator, accepted.scenario_id).await;

    let mut states = Vec::new();
    let mut completed_agents = 0;
    let mut agents_before_aggregating = 0;
    while let Ok(event) = receiver.try_recv() {
        if event.scenario_id() != accepted.scenario_id {
            continue;
        }
        match event {
            SessionEvent::SessionStateChanged { new_state, .. } => states.push(new_state),
            SessionEvent::AgentCompleted { .. } => {
                completed_agents += 1;
                if !states.contains(&SessionState::Aggregating) {
                    agents_before_aggregating += 1;
                }
            }
            SessionEvent::AgentFailed { .. } => {}
        }
    }

    assert_eq!(completed_agents, 4);
    // Aggregating is only announced once every launched agent returned.
    assert_eq!(agents_before_aggregating, 4);
    assert_eq!(
        states,
        vec![
            SessionState::Running,
            SessionState::Aggregating,
            SessionState::Negotiating,
            SessionState::Converged,
            SessionState::Completed,
        ]
    );
}

#[tokio::test]
async fn concurrent_sessions_share_one_verifiable_chain() {
    let h = harness();
    let mut ids = Vec::new();
    for i in 0..4 {
        let mut req = request();
        req.location = format!("region-{i}");
        ids.push(h.orchestrator.submit(req).await.unwrap().scenario_id);
    }
    for id in &ids {
        wait_ready(&h.orchestrator, *id).await;
    }

    let all = h.audit.all().await;
    assert_eq!(all.len(), 4);
    assert!(verify_chain(&all));
    for (i, entry) in all.iter().enumerate() {
        assert_eq!(entry.sequence, i as u64);
    }
}
