// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Audit Log Domain Model
//!
//! Every terminal session writes exactly one immutable, append-only audit
//! entry recording the decision rationale. Entries are hash-linked to the
//! previous entry for tamper-evidence: mutating any historical entry
//! breaks the chain from that point forward.
//!
//! The store is a port; the engine mandates only the content and the
//! durability contract (the entry must be durable before `Completed` is
//! reported to the caller).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::negotiation::ConflictRecord;
use crate::domain::proposal::{ProposalId, ScoredProposal};
use crate::domain::scenario::{PreferenceWeights, ScenarioId};
use crate::domain::session::FailureReason;

/// The decision being audited
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AuditDecision {
    /// Consensus reached: the ranked shortlist as returned to the caller
    Selected { shortlist: Vec<ScoredProposal> },
    /// Escalation: disagreeing dimensions and competing champions
    Escalated { conflict: ConflictRecord },
    /// The session failed after negotiation had begun
    Failed { reason: FailureReason },
}

impl AuditDecision {
    /// Proposal identifiers referenced by this decision, for indexing
    pub fn proposal_ids(&self) -> Vec<ProposalId> {
        match self {
            AuditDecision::Selected { shortlist } => {
                shortlist.iter().map(|s| s.proposal.id).collect()
            }
            AuditDecision::Escalated { conflict } => conflict
                .best_per_objective
                .iter()
                .map(|b| b.proposal.proposal.id)
                .collect(),
            AuditDecision::Failed { .. } => Vec::new(),
        }
    }
}

/// Unsequenced audit content as produced by the recorder. The store
/// assigns the sequence number and links the hash chain atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub scenario_id: ScenarioId,
    pub decision: AuditDecision,
    /// Full objective-weight vector the decision was scored against
    pub weights: PreferenceWeights,
    pub partial: bool,
    pub recorded_at: DateTime<Utc>,
}

/// A sequenced, hash-linked entry as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub sequence: u64,
    #[serde(flatten)]
    pub record: AuditRecord,
    /// Hex SHA-256 of the previous entry ("genesis" for the first)
    pub prev_hash: String,
    /// Hex SHA-256 over this entry's content and `prev_hash`
    pub entry_hash: String,
}

pub const GENESIS_HASH: &str = "genesis";

impl AuditLogEntry {
    /// Build the next entry in the chain from `record`.
    pub fn chain(sequence: u64, record: AuditRecord, prev_hash: &str) -> Self {
        let entry_hash = Self::content_hash(sequence, &record, prev_hash);
        Self {
            sequence,
            record,
            prev_hash: prev_hash.to_string(),
            entry_hash,
        }
    }

    /// Recompute this entry's hash; mismatch means tampering.
    pub fn verify(&self) -> bool {
        Self::content_hash(self.sequence, &self.record, &self.prev_hash) == self.entry_hash
    }

    fn content_hash(sequence: u64, record: &AuditRecord, prev_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sequence.to_be_bytes());
        hasher.update(prev_hash.as_bytes());
        // Serialization of the record is deterministic for a fixed struct
        // layout; the hash covers every audited field.
        let body = serde_json::to_vec(record).unwrap_or_default();
        hasher.update(&body);
        hex::encode(hasher.finalize())
    }
}

/// Verify a contiguous slice of the chain.
pub fn verify_chain(entries: &[AuditLogEntry]) -> bool {
    let mut prev = GENESIS_HASH.to_string();
    for entry in entries {
        if entry.prev_hash != prev || !entry.verify() {
            return false;
        }
        prev = entry.entry_hash.clone();
    }
    true
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage failure: {0}")]
    Storage(String),

    #[error("audit serialization failure: {0}")]
    Serialization(String),
}

/// Append-only audit store port.
///
/// Concurrent sessions append independently; implementations guarantee
/// atomic append semantics per entry but require no cross-session
/// coordination from callers. `append` must not return before the entry
/// is durable.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<AuditLogEntry, AuditError>;

    async fn entries_for(&self, scenario_id: ScenarioId)
        -> Result<Vec<AuditLogEntry>, AuditError>;
}
