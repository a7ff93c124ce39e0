// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::explain::NegotiationResult;
use crate::domain::scenario::ScenarioId;
use crate::domain::session::NegotiationSession;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage failure: {0}")]
    Storage(String),
}

/// A session together with its annotated result, once one exists.
///
/// Terminal sessions are archived here so `get_result` keeps serving them
/// for the retention window after the live run finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: NegotiationSession,
    pub result: Option<NegotiationResult>,
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn save(&self, record: SessionRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ScenarioId) -> Result<Option<SessionRecord>, RepositoryError>;

    /// Evict terminal sessions last touched before `cutoff`, returning the
    /// number removed. Live sessions are never evicted.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError>;
}
