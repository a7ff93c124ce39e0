// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! In-memory implementation of the session repository defined in the
//! domain layer. Sessions are archived here once terminal so result
//! lookups keep working for the retention window; no relational store is
//! mandated by the engine's contract.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::domain::repository::{RepositoryError, SessionRecord, SessionRepository};
use crate::domain::scenario::ScenarioId;

#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<ScenarioId, SessionRecord>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn save(&self, record: SessionRecord) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(record.session.scenario_id, record);
        Ok(())
    }

    async fn find_by_id(&self, id: ScenarioId) -> Result<Option<SessionRecord>, RepositoryError> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions.get(&id).cloned())
    }

    async fn prune_before(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<usize, RepositoryError> {
        let mut sessions = self.sessions.write().unwrap();
        let before = sessions.len();
        sessions
            .retain(|_, record| !(record.session.state.is_terminal() && record.session.updated_at < cutoff));
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scenario::{ScenarioRequest, Severity};
    use crate::domain::session::NegotiationSession;

    fn record() -> SessionRecord {
        let request = ScenarioRequest {
            disruption_type: "strike".to_string(),
            location: "hub-west".to_string(),
            severity: Severity::Low,
            duration_days: 3,
            affected_nodes: vec!["w-1".to_string()],
            weights: None,
            idempotency_key: None,
        };
        SessionRecord {
            session: NegotiationSession::new(ScenarioId::new(), request),
            result: None,
        }
    }

    #[tokio::test]
    async fn save_and_find_roundtrip() {
        let repo = InMemorySessionRepository::new();
        let record = record();
        let id = record.session.scenario_id;

        repo.save(record).await.unwrap();
        let found = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.session.scenario_id, id);

        assert!(repo.find_by_id(ScenarioId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prune_evicts_only_stale_terminal_sessions() {
        use crate::domain::session::{FailureReason, SessionState};

        let repo = InMemorySessionRepository::new();

        let mut stale = record();
        stale.session.fail(FailureReason::Cancelled).unwrap();
        stale.session.updated_at = chrono::Utc::now() - chrono::Duration::hours(2);
        let stale_id = stale.session.scenario_id;

        let mut live = record();
        live.session.transition_to(SessionState::Running).unwrap();
        live.session.updated_at = chrono::Utc::now() - chrono::Duration::hours(2);
        let live_id = live.session.scenario_id;

        repo.save(stale).await.unwrap();
        repo.save(live).await.unwrap();

        let cutoff = chrono::Utc::now() - chrono::Duration::hours(1);
        assert_eq!(repo.prune_before(cutoff).await.unwrap(), 1);
        assert!(repo.find_by_id(stale_id).await.unwrap().is_none());
        // An old but still-running session is never evicted.
        assert!(repo.find_by_id(live_id).await.unwrap().is_some());
    }
}
