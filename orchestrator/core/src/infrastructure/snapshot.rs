// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::snapshot::{NodeState, NodeStatus, SnapshotError, SnapshotReader, StateSnapshot};

/// Deterministic snapshot reader for demos and tests.
///
/// Synthesizes per-node state from a stable hash of the node identifier,
/// so repeated reads of the same node set return identical snapshots
/// without any external state provider.
#[derive(Default)]
pub struct StaticSnapshotReader;

impl StaticSnapshotReader {
    pub fn new() -> Self {
        Self
    }

    fn synth_node(node_id: &str) -> NodeState {
        // Cheap stable hash; only determinism matters here.
        let seed = node_id
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let frac = |salt: u64| ((seed.wrapping_mul(salt) % 1000) as f64) / 1000.0;

        let utilization = frac(7);
        let status = if utilization > 0.9 {
            NodeStatus::Degraded
        } else {
            NodeStatus::Operational
        };
        NodeState {
            node_id: node_id.to_string(),
            status,
            inventory_level: frac(13),
            throughput: 100.0 + frac(17) * 900.0,
            utilization,
        }
    }
}

#[async_trait]
impl SnapshotReader for StaticSnapshotReader {
    async fn read_state(&self, node_ids: &[String]) -> Result<StateSnapshot, SnapshotError> {
        if node_ids.is_empty() {
            return Err(SnapshotError::UnknownNodes(vec![]));
        }
        Ok(StateSnapshot {
            captured_at: Utc::now(),
            nodes: node_ids.iter().map(|id| Self::synth_node(id)).collect(),
        })
    }
}
