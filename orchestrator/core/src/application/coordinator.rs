// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Agent Coordinator
//!
//! Drives the two-stage analysis pipeline for one session:
//!
//! - **Stage 1** — Info and Scenario agents run concurrently against the
//!   state snapshot.
//! - **Stage 2** — Impact and Strategy agents run concurrently, consuming
//!   the stage-1 outputs.
//!
//! Each stage is bounded by the per-agent timeout, so the coordinator's
//! total agent wait never exceeds twice that value. A terminally failed
//! agent marks the run degraded and its output appears in downstream
//! `missing_inputs` rather than blocking the pipeline; only cancellation
//! aborts the run.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::supervisor::invoke_supervised;
use crate::domain::agent::{Agent, AgentError, AgentInput, AgentKind, AgentPayload, AgentResult};
use crate::domain::config::EngineConfig;
use crate::domain::events::SessionEvent;
use crate::domain::session::{NegotiationSession, SessionError, SessionState};
use crate::domain::snapshot::{SnapshotReader, StateSnapshot};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("session cancelled")]
    Cancelled,

    #[error("no agent registered for kind '{0}'")]
    MissingAgent(AgentKind),

    #[error(transparent)]
    Session(#[from] SessionError),
}

pub struct AgentCoordinator {
    agents: HashMap<AgentKind, Arc<dyn Agent>>,
    snapshot_reader: Arc<dyn SnapshotReader>,
    event_bus: EventBus,
    config: EngineConfig,
}

impl AgentCoordinator {
    /// Build a coordinator over a full agent roster. All four kinds must
    /// be present.
    pub fn new(
        agents: Vec<Arc<dyn Agent>>,
        snapshot_reader: Arc<dyn SnapshotReader>,
        event_bus: EventBus,
        config: EngineConfig,
    ) -> Result<Self, CoordinationError> {
        let agents: HashMap<AgentKind, Arc<dyn Agent>> =
            agents.into_iter().map(|a| (a.kind(), a)).collect();
        for kind in AgentKind::ALL {
            if !agents.contains_key(&kind) {
                return Err(CoordinationError::MissingAgent(kind));
            }
        }
        Ok(Self {
            agents,
            snapshot_reader,
            event_bus,
            config,
        })
    }

    /// Run both stages, mutating `session` in place. On return the session
    /// is in `Aggregating` with every launched agent either recorded as a
    /// result or as a terminal failure.
    pub async fn run(
        &self,
        session: &mut NegotiationSession,
        cancel: &CancellationToken,
    ) -> Result<(), CoordinationError> {
        self.transition(session, SessionState::Running)?;

        let snapshot = self.read_snapshot(session).await;

        let stage_one = AgentInput::stage_one(session.request.clone(), snapshot);
        self.run_stage(
            session,
            [AgentKind::Info, AgentKind::Scenario],
            stage_one.clone(),
            cancel,
        )
        .await?;

        let mut stage_two = stage_one;
        stage_two.info_output = session.result(AgentKind::Info).and_then(|r| match &r.payload {
            AgentPayload::Info(report) => Some(report.clone()),
            _ => None,
        });
        stage_two.scenario_output =
            session
                .result(AgentKind::Scenario)
                .and_then(|r| match &r.payload {
                    AgentPayload::Scenario(timeline) => Some(timeline.clone()),
                    _ => None,
                });
        stage_two.missing_inputs = session.failed_agents.clone();

        self.run_stage(
            session,
            [AgentKind::Impact, AgentKind::Strategy],
            stage_two,
            cancel,
        )
        .await?;

        // Aggregation begins only once every launched agent has returned
        // or timed out; subscribers never see it while agents still run.
        self.transition(session, SessionState::Aggregating)?;

        Ok(())
    }

    /// State snapshot for the affected nodes. Unavailable state degrades
    /// the run instead of failing it.
    async fn read_snapshot(&self, session: &mut NegotiationSession) -> Option<StateSnapshot> {
        let nodes = session.request.affected_nodes.clone();
        let outcome =
            tokio::time::timeout(self.config.snapshot_timeout, self.snapshot_reader.read_state(&nodes))
                .await;
        match outcome {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(err)) => {
                warn!(scenario_id = %session.scenario_id, error = %err, "Snapshot read failed; continuing degraded");
                session.partial = true;
                None
            }
            Err(_) => {
                warn!(scenario_id = %session.scenario_id, "Snapshot read timed out; continuing degraded");
                session.partial = true;
                None
            }
        }
    }

    async fn run_stage(
        &self,
        session: &mut NegotiationSession,
        kinds: [AgentKind; 2],
        input: AgentInput,
        cancel: &CancellationToken,
    ) -> Result<(), CoordinationError> {
        let [first, second] = kinds;
        let (a, b) = tokio::join!(
            self.invoke_one(first, input.clone(), cancel),
            self.invoke_one(second, input, cancel),
        );

        for (kind, outcome) in [(first, a), (second, b)] {
            match outcome {
                Ok(result) => {
                    info!(
                        scenario_id = %session.scenario_id,
                        agent = %kind,
                        confidence = result.confidence,
                        "Agent completed"
                    );
                    self.event_bus.publish(SessionEvent::AgentCompleted {
                        scenario_id: session.scenario_id,
                        agent: kind,
                        confidence: result.confidence,
                        at: chrono::Utc::now(),
                    });
                    session.record_result(result)?;
                }
                Err(AgentError::Cancelled) => return Err(CoordinationError::Cancelled),
                Err(err) => {
                    warn!(
                        scenario_id = %session.scenario_id,
                        agent = %kind,
                        error = %err,
                        "Agent failed terminally; continuing degraded"
                    );
                    metrics::counter!("agent_failures_total", "agent" => kind.as_str())
                        .increment(1);
                    self.event_bus.publish(SessionEvent::AgentFailed {
                        scenario_id: session.scenario_id,
                        agent: kind,
                        error: err.to_string(),
                        at: chrono::Utc::now(),
                    });
                    session.record_agent_failure(kind);
                }
            }
        }
        Ok(())
    }

    /// One supervised invocation bounded by the stage ceiling. Retries
    /// that would run past the ceiling are cut off as unavailable.
    async fn invoke_one(
        &self,
        kind: AgentKind,
        input: AgentInput,
        cancel: &CancellationToken,
    ) -> Result<AgentResult, AgentError> {
        let agent = self
            .agents
            .get(&kind)
            .expect("roster validated at construction");
        let supervised = invoke_supervised(
            agent.as_ref(),
            input,
            self.config.agent_timeout,
            &self.config.retry,
            cancel,
        );
        match tokio::time::timeout(self.config.agent_timeout, supervised).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AgentError::Unavailable {
                agent: kind,
                attempts: self.config.retry.max_attempts,
                last_error: "stage deadline elapsed during retries".to_string(),
            }),
        }
    }

    fn transition(
        &self,
        session: &mut NegotiationSession,
        next: SessionState,
    ) -> Result<(), SessionError> {
        let old = session.transition_to(next)?;
        self.event_bus
            .publish(SessionEvent::state_changed(session.scenario_id, old, next));
        Ok(())
    }
}
