// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Audit Store Implementations
//!
//! Sled-backed append-only store for production use and an in-memory
//! mirror for tests. Both uphold the durability contract: `append`
//! returns only once the entry is persisted, and entries are hash-linked
//! in sequence order.
//!
//! Appends across concurrent sessions serialize on a single chain lock;
//! per-entry atomicity is all callers rely on.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::audit::{
    AuditError, AuditLogEntry, AuditRecord, AuditStore, GENESIS_HASH,
};
use crate::domain::scenario::ScenarioId;

const AUDIT_TREE: &str = "audit_log";

/// Chain head: next sequence number and the hash to link against
struct ChainHead {
    next_sequence: u64,
    prev_hash: String,
}

pub struct SledAuditStore {
    db: sled::Db,
    tree: sled::Tree,
    head: Mutex<ChainHead>,
}

impl SledAuditStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, AuditError> {
        let db = sled::open(path).map_err(|e| AuditError::Storage(e.to_string()))?;
        let tree = db
            .open_tree(AUDIT_TREE)
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        // Recover the chain head from the highest existing key.
        let head = match tree.last().map_err(|e| AuditError::Storage(e.to_string()))? {
            Some((_, value)) => {
                let last: AuditLogEntry = serde_json::from_slice(&value)
                    .map_err(|e| AuditError::Serialization(e.to_string()))?;
                ChainHead {
                    next_sequence: last.sequence + 1,
                    prev_hash: last.entry_hash,
                }
            }
            None => ChainHead {
                next_sequence: 0,
                prev_hash: GENESIS_HASH.to_string(),
            },
        };

        Ok(Self {
            db,
            tree,
            head: Mutex::new(head),
        })
    }

    /// Walk the full chain and verify every link. Used by operators and
    /// tests to detect tampering.
    pub fn verify(&self) -> Result<bool, AuditError> {
        let mut entries = Vec::new();
        for item in self.tree.iter() {
            let (_, value) = item.map_err(|e| AuditError::Storage(e.to_string()))?;
            let entry: AuditLogEntry = serde_json::from_slice(&value)
                .map_err(|e| AuditError::Serialization(e.to_string()))?;
            entries.push(entry);
        }
        Ok(crate::domain::audit::verify_chain(&entries))
    }
}

#[async_trait]
impl AuditStore for SledAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<AuditLogEntry, AuditError> {
        let mut head = self.head.lock().await;
        let entry = AuditLogEntry::chain(head.next_sequence, record, &head.prev_hash);

        let value =
            serde_json::to_vec(&entry).map_err(|e| AuditError::Serialization(e.to_string()))?;
        self.tree
            .insert(entry.sequence.to_be_bytes(), value)
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        // Durable before the session may report Completed.
        self.db
            .flush_async()
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        head.next_sequence = entry.sequence + 1;
        head.prev_hash = entry.entry_hash.clone();

        info!(
            scenario_id = %entry.record.scenario_id,
            sequence = entry.sequence,
            "Audit entry persisted"
        );
        Ok(entry)
    }

    async fn entries_for(
        &self,
        scenario_id: ScenarioId,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        let mut matches = Vec::new();
        for item in self.tree.iter() {
            let (_, value) = item.map_err(|e| AuditError::Storage(e.to_string()))?;
            let entry: AuditLogEntry = serde_json::from_slice(&value)
                .map_err(|e| AuditError::Serialization(e.to_string()))?;
            if entry.record.scenario_id == scenario_id {
                matches.push(entry);
            }
        }
        Ok(matches)
    }
}

/// In-memory audit store for tests and dry runs. Same chaining semantics,
/// no durability.
#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<AuditLogEntry, AuditError> {
        let mut entries = self.entries.lock().await;
        let (sequence, prev_hash) = match entries.last() {
            Some(last) => (last.sequence + 1, last.entry_hash.clone()),
            None => (0, GENESIS_HASH.to_string()),
        };
        let entry = AuditLogEntry::chain(sequence, record, &prev_hash);
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn entries_for(
        &self,
        scenario_id: ScenarioId,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.record.scenario_id == scenario_id)
            .cloned()
            .collect())
    }
}
