// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

// State Snapshot Port
//
// The snapshot reader is an outbound dependency: the engine consumes a
// read-only view of current supply-chain node state but never implements
// the provider. Failures reading state are terminal input errors for the
// stage-1 agents, not retriable transport errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Operational,
    Degraded,
    Offline,
}

/// Point-in-time state of one supply-chain node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub node_id: String,
    pub status: NodeStatus,

    /// Current inventory as a fraction of capacity, in [0,1]
    pub inventory_level: f64,

    /// Units moved per day
    pub throughput: f64,

    /// Capacity utilization, in [0,1]
    pub utilization: f64,
}

/// Read-only view of node state at a single instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub captured_at: DateTime<Utc>,
    pub nodes: Vec<NodeState>,
}

impl StateSnapshot {
    pub fn node(&self, node_id: &str) -> Option<&NodeState> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("state provider unavailable: {0}")]
    Unavailable(String),

    #[error("state read timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unknown nodes requested: {0:?}")]
    UnknownNodes(Vec<String>),
}

/// Outbound port to the state provider.
///
/// Assumed to return within ~1s; the coordinator enforces the deadline.
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    async fn read_state(&self, node_ids: &[String]) -> Result<StateSnapshot, SnapshotError>;
}
