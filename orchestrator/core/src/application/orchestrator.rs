// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Orchestration Service
//!
//! Front door of the engine: accepts scenarios idempotently, runs each
//! session on its own task (coordination → negotiation → recording →
//! audit), and serves result lookups. Sessions are cancellable up to the
//! moment their audit entry is written; the audit append is the point of
//! no return and `Completed` is only reported once the entry is durable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::application::coordinator::{AgentCoordinator, CoordinationError};
use crate::application::recorder::ExplainabilityRecorder;
use crate::domain::agent::{AgentKind, AgentPayload};
use crate::domain::audit::{AuditDecision, AuditRecord, AuditStore};
use crate::domain::config::EngineConfig;
use crate::domain::events::SessionEvent;
use crate::domain::explain::NegotiationResult;
use crate::domain::negotiation::{escalate_on_timeout, negotiate, NegotiationOutcome};
use crate::domain::proposal::Proposal;
use crate::domain::repository::{SessionRecord, SessionRepository};
use crate::domain::scenario::{
    AcceptedScenario, PreferenceWeights, ScenarioId, ScenarioRequest, ScenarioValidationError,
};
use crate::domain::session::{FailureReason, NegotiationSession, SessionState};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ScenarioValidationError),
}

/// Answer to a result lookup.
#[derive(Debug, Clone)]
pub enum ResultStatus {
    Ready(NegotiationResult),
    Pending { state: SessionState },
    Failed { reason: FailureReason },
    NotFound,
}

struct LiveSession {
    cancel: CancellationToken,
    state: Arc<std::sync::RwLock<SessionState>>,
}

struct DedupEntry {
    scenario_id: ScenarioId,
    accepted_at: DateTime<Utc>,
}

struct Inner {
    config: EngineConfig,
    coordinator: AgentCoordinator,
    audit: Arc<dyn AuditStore>,
    repository: Arc<dyn SessionRepository>,
    event_bus: EventBus,
    live: DashMap<ScenarioId, LiveSession>,
    dedup: DashMap<String, DedupEntry>,
}

/// Cheaply cloneable handle to the engine; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        coordinator: AgentCoordinator,
        audit: Arc<dyn AuditStore>,
        repository: Arc<dyn SessionRepository>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                coordinator,
                audit,
                repository,
                event_bus,
                live: DashMap::new(),
                dedup: DashMap::new(),
            }),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Accept a scenario and start its session.
    ///
    /// Idempotent: a duplicate submission inside the retention window
    /// (matched by the caller's idempotency key, or by canonical request
    /// content) returns the original scenario identity without starting a
    /// second run.
    pub async fn submit(&self, request: ScenarioRequest) -> Result<AcceptedScenario, SubmitError> {
        request.validate()?;
        self.prune_expired().await;

        let scenario_id = ScenarioId::new();
        let accepted_at = Utc::now();

        // Claim the idempotency slot under the shard lock, so two racing
        // duplicates cannot both miss the lookup and start two sessions.
        match self.inner.dedup.entry(request.dedup_key()) {
            Entry::Occupied(occupied) => {
                let existing = occupied.get();
                info!(
                    scenario_id = %existing.scenario_id,
                    "Duplicate submission deduplicated"
                );
                metrics::counter!("scenarios_deduplicated_total").increment(1);
                return Ok(AcceptedScenario {
                    scenario_id: existing.scenario_id,
                    request,
                    accepted_at: existing.accepted_at,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(DedupEntry {
                    scenario_id,
                    accepted_at,
                });
            }
        }

        let session = NegotiationSession::new(scenario_id, request.clone());
        let cancel = CancellationToken::new();
        let state = Arc::new(std::sync::RwLock::new(SessionState::Pending));

        self.inner.live.insert(
            scenario_id,
            LiveSession {
                cancel: cancel.clone(),
                state: state.clone(),
            },
        );
        self.save(&session, None).await;

        info!(scenario_id = %scenario_id, disruption = %request.disruption_type, "Scenario accepted");
        metrics::counter!("scenarios_submitted_total").increment(1);

        let this = self.clone();
        let span = tracing::info_span!("session", scenario_id = %scenario_id);
        tokio::spawn(
            async move {
                this.execute(session, cancel, state).await;
            }
            .instrument(span),
        );

        Ok(AcceptedScenario {
            scenario_id,
            request,
            accepted_at,
        })
    }

    /// Look up the result of a submitted scenario.
    pub async fn get_result(&self, scenario_id: ScenarioId) -> ResultStatus {
        if let Some(live) = self.inner.live.get(&scenario_id) {
            let state = *live.state.read().unwrap();
            if !state.is_terminal() {
                return ResultStatus::Pending { state };
            }
        }
        match self.inner.repository.find_by_id(scenario_id).await {
            Ok(Some(record)) => match record.result {
                Some(result) => ResultStatus::Ready(result),
                None if record.session.state == SessionState::Failed => ResultStatus::Failed {
                    reason: record.session.failure.unwrap_or(FailureReason::Internal {
                        detail: "failure reason not recorded".to_string(),
                    }),
                },
                None => ResultStatus::Pending {
                    state: record.session.state,
                },
            },
            Ok(None) => ResultStatus::NotFound,
            Err(err) => {
                error!(scenario_id = %scenario_id, error = %err, "Result lookup failed");
                ResultStatus::NotFound
            }
        }
    }

    /// Cancel a running session. Returns false when the session is not
    /// live (unknown, or already terminal).
    pub fn cancel(&self, scenario_id: ScenarioId) -> bool {
        match self.inner.live.get(&scenario_id) {
            Some(live) => {
                live.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every live session; used on shutdown.
    pub fn cancel_all(&self) {
        for live in self.inner.live.iter() {
            live.cancel.cancel();
        }
    }

    async fn execute(
        &self,
        mut session: NegotiationSession,
        cancel: CancellationToken,
        state_mirror: Arc<std::sync::RwLock<SessionState>>,
    ) {
        let outcome = self
            .run_to_completion(&mut session, &cancel, &state_mirror)
            .await;

        if let Err(reason) = outcome {
            warn!(reason = %reason, "Session failed");
            metrics::counter!("sessions_failed_total").increment(1);
            if let Ok(old) = session.fail(reason.clone()) {
                self.inner.event_bus.publish(SessionEvent::state_changed(
                    session.scenario_id,
                    old,
                    SessionState::Failed,
                ));
            }
            *state_mirror.write().unwrap() = SessionState::Failed;
            // Failed sessions are audited too; best effort since the
            // caller already sees the failure.
            let record = AuditRecord {
                scenario_id: session.scenario_id,
                decision: AuditDecision::Failed { reason },
                weights: session.request.effective_weights(),
                partial: session.partial,
                recorded_at: Utc::now(),
            };
            if let Err(err) = self.inner.audit.append(record).await {
                error!(error = %err, "Audit append for failed session did not persist");
            }
            self.save(&session, None).await;
        }

        self.inner.live.remove(&session.scenario_id);
    }

    /// Happy path of one session. Any error is the failure reason the
    /// session terminates with.
    async fn run_to_completion(
        &self,
        session: &mut NegotiationSession,
        cancel: &CancellationToken,
        state_mirror: &Arc<std::sync::RwLock<SessionState>>,
    ) -> Result<(), FailureReason> {
        let mirror = |state: SessionState| {
            *state_mirror.write().unwrap() = state;
        };

        match self.inner.coordinator.run(session, cancel).await {
            Ok(()) => {}
            Err(CoordinationError::Cancelled) => return Err(FailureReason::Cancelled),
            Err(err) => {
                return Err(FailureReason::Internal {
                    detail: err.to_string(),
                })
            }
        }
        mirror(session.state);
        self.save(session, None).await;

        self.transition(session, SessionState::Negotiating)
            .map_err(internal)?;
        mirror(SessionState::Negotiating);

        let proposals = strategy_proposals(session);
        let weights = session.request.effective_weights();
        let outcome = self.negotiate_within_budget(proposals, &weights).await;

        if cancel.is_cancelled() {
            return Err(FailureReason::Cancelled);
        }

        session.round = outcome.rounds();
        let next = match &outcome {
            NegotiationOutcome::Converged { .. } => SessionState::Converged,
            NegotiationOutcome::Escalated { .. } => SessionState::Escalated,
        };
        session.outcome = Some(outcome);
        self.transition(session, next).map_err(internal)?;
        mirror(next);
        info!(state = %next, rounds = session.round, "Negotiation settled");

        let (result, audit_record) =
            ExplainabilityRecorder::annotate(session).map_err(internal)?;

        // Point of no return: the decision must be durable before the
        // session may report Completed.
        self.append_audit_with_retry(audit_record)
            .await
            .map_err(|detail| FailureReason::AuditWrite { detail })?;

        self.transition(session, SessionState::Completed)
            .map_err(internal)?;
        mirror(SessionState::Completed);
        metrics::counter!("sessions_completed_total", "outcome" => next.to_string()).increment(1);
        metrics::histogram!("negotiation_rounds").record(session.round as f64);

        self.save(session, Some(result)).await;
        Ok(())
    }

    /// Consensus rounds under the negotiation budget. An exhausted budget
    /// escalates with a system-generated conflict record instead of
    /// blocking the session.
    async fn negotiate_within_budget(
        &self,
        proposals: Vec<Proposal>,
        weights: &PreferenceWeights,
    ) -> NegotiationOutcome {
        let negotiation_config = self.inner.config.negotiation.clone();
        let weights_owned = *weights;
        let rounds_input = proposals.clone();
        let handle = tokio::task::spawn_blocking(move || {
            negotiate(rounds_input, &weights_owned, &negotiation_config)
        });
        match tokio::time::timeout(self.inner.config.negotiation_budget, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                error!(error = %join_err, "Negotiation task panicked; escalating");
                escalate_on_timeout(&proposals, weights)
            }
            Err(_) => {
                warn!("Negotiation budget exhausted; escalating");
                metrics::counter!("negotiations_timed_out_total").increment(1);
                escalate_on_timeout(&proposals, weights)
            }
        }
    }

    async fn append_audit_with_retry(&self, record: AuditRecord) -> Result<(), String> {
        let retry = &self.inner.config.retry;
        let mut last_error = String::new();
        for attempt in 0..retry.max_attempts {
            match self.inner.audit.append(record.clone()).await {
                Ok(entry) => {
                    info!(sequence = entry.sequence, "Decision audited");
                    return Ok(());
                }
                Err(err) => {
                    last_error = err.to_string();
                    warn!(attempt, error = %last_error, "Audit append failed");
                    if attempt + 1 < retry.max_attempts {
                        let delay = retry.base_delay.mul_f64(2f64.powi(attempt as i32));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    fn transition(
        &self,
        session: &mut NegotiationSession,
        next: SessionState,
    ) -> Result<(), crate::domain::session::SessionError> {
        let old = session.transition_to(next)?;
        self.inner
            .event_bus
            .publish(SessionEvent::state_changed(session.scenario_id, old, next));
        Ok(())
    }

    async fn save(&self, session: &NegotiationSession, result: Option<NegotiationResult>) {
        let record = SessionRecord {
            session: session.clone(),
            result,
        };
        if let Err(err) = self.inner.repository.save(record).await {
            error!(scenario_id = %session.scenario_id, error = %err, "Session save failed");
        }
    }

    /// Drop idempotency entries and archived sessions older than the
    /// retention window.
    async fn prune_expired(&self) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.inner.config.retention)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        self.inner
            .dedup
            .retain(|_, entry| entry.accepted_at >= cutoff);
        match self.inner.repository.prune_before(cutoff).await {
            Ok(0) => {}
            Ok(evicted) => info!(evicted, "Expired sessions evicted from the archive"),
            Err(err) => error!(error = %err, "Session archive prune failed"),
        }
    }
}

fn internal(err: impl std::fmt::Display) -> FailureReason {
    FailureReason::Internal {
        detail: err.to_string(),
    }
}

fn strategy_proposals(session: &NegotiationSession) -> Vec<Proposal> {
    session
        .result(AgentKind::Strategy)
        .and_then(|r| match &r.payload {
            AgentPayload::Strategy(set) => Some(set.proposals.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Convenience constructor wiring the built-in heuristic agents, the
/// static snapshot reader and in-memory (or sled-backed) stores.
pub fn builtin_orchestrator(config: EngineConfig) -> anyhow::Result<Orchestrator> {
    use crate::domain::agent::Agent;
    use crate::infrastructure::agents::{
        HeuristicImpactAgent, HeuristicInfoAgent, HeuristicScenarioAgent, HeuristicStrategyAgent,
    };
    use crate::infrastructure::audit_store::{InMemoryAuditStore, SledAuditStore};
    use crate::infrastructure::repositories::InMemorySessionRepository;
    use crate::infrastructure::snapshot::StaticSnapshotReader;

    config.validate()?;

    let agents: Vec<Arc<dyn Agent>> = vec![
        Arc::new(HeuristicInfoAgent::new()),
        Arc::new(HeuristicScenarioAgent::new()),
        Arc::new(HeuristicImpactAgent::new()),
        Arc::new(HeuristicStrategyAgent::new()),
    ];
    let event_bus = EventBus::with_default_capacity();
    let coordinator = AgentCoordinator::new(
        agents,
        Arc::new(StaticSnapshotReader::new()),
        event_bus.clone(),
        config.clone(),
    )?;
    let audit: Arc<dyn AuditStore> = match &config.audit_path {
        Some(path) => Arc::new(SledAuditStore::open(path)?),
        None => Arc::new(InMemoryAuditStore::new()),
    };
    Ok(Orchestrator::new(
        config,
        coordinator,
        audit,
        Arc::new(InMemorySessionRepository::new()),
        event_bus,
    ))
}
