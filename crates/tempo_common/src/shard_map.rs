//! Per-dataset shard ownership map.
//!
//! Tracks, for every shard, the owning node and its health state. The map is
//! versioned by a monotonically increasing revision; snapshot updates with a
//! stale revision are discarded. Only the dataset's router mutates the map;
//! readers work against immutable `Arc` snapshots taken at dispatch time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DatasetRef, NodeAddress, PartitionKey, ShardId};

/// Health state of a shard. Queries consider only `Active` shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardStatus {
    Unassigned,
    Assigned,
    Active,
    Recovering,
    Error,
    Stopped,
}

impl fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShardStatus::Unassigned => "unassigned",
            ShardStatus::Assigned => "assigned",
            ShardStatus::Active => "active",
            ShardStatus::Recovering => "recovering",
            ShardStatus::Error => "error",
            ShardStatus::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Ownership state of a single shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardEntry {
    pub node: Option<NodeAddress>,
    pub status: ShardStatus,
}

impl ShardEntry {
    fn unassigned() -> Self {
        ShardEntry {
            node: None,
            status: ShardStatus::Unassigned,
        }
    }
}

/// A shard state transition delivered by the cluster membership subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShardEvent {
    Assigned { shard: ShardId, node: NodeAddress },
    Active { shard: ShardId, node: NodeAddress },
    Recovering { shard: ShardId },
    Errored { shard: ShardId },
    Stopped { shard: ShardId },
    Unassigned { shard: ShardId },
}

impl ShardEvent {
    pub fn shard(&self) -> ShardId {
        match self {
            ShardEvent::Assigned { shard, .. }
            | ShardEvent::Active { shard, .. }
            | ShardEvent::Recovering { shard }
            | ShardEvent::Errored { shard }
            | ShardEvent::Stopped { shard }
            | ShardEvent::Unassigned { shard } => *shard,
        }
    }
}

/// The authoritative dataset → (shard → owner, status) snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardMap {
    dataset: DatasetRef,
    entries: Vec<ShardEntry>,
    revision: u64,
}

impl ShardMap {
    /// A fresh map with every shard unassigned, at revision 0.
    pub fn new(dataset: DatasetRef, num_shards: u64) -> Self {
        ShardMap {
            dataset,
            entries: (0..num_shards).map(|_| ShardEntry::unassigned()).collect(),
            revision: 0,
        }
    }

    pub fn dataset(&self) -> &DatasetRef {
        &self.dataset
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn num_shards(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn entry(&self, shard: ShardId) -> Option<&ShardEntry> {
        self.entries.get(shard.0 as usize)
    }

    pub fn status(&self, shard: ShardId) -> ShardStatus {
        self.entry(shard)
            .map(|e| e.status)
            .unwrap_or(ShardStatus::Unassigned)
    }

    /// Owning node of a shard, regardless of status.
    pub fn owner(&self, shard: ShardId) -> Option<&NodeAddress> {
        self.entry(shard).and_then(|e| e.node.as_ref())
    }

    /// Owning node of a shard if and only if the shard is Active.
    pub fn active_owner(&self, shard: ShardId) -> Option<&NodeAddress> {
        self.entry(shard)
            .filter(|e| e.status == ShardStatus::Active)
            .and_then(|e| e.node.as_ref())
    }

    /// Shards in Active state, ascending.
    pub fn active_shards(&self) -> Vec<ShardId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == ShardStatus::Active)
            .map(|(i, _)| ShardId(i as u64))
            .collect()
    }

    /// Placement: which shard owns a partition key.
    pub fn shard_for_key(&self, key: &PartitionKey) -> ShardId {
        ShardId(key.placement_hash() % self.num_shards())
    }

    /// Apply a shard event, bumping the revision. Events for shards outside
    /// the map are logged and ignored.
    pub fn apply_event(&mut self, event: &ShardEvent) {
        let shard = event.shard();
        let Some(entry) = self.entries.get_mut(shard.0 as usize) else {
            tracing::warn!(dataset = %self.dataset, %shard, "shard event for unknown shard ignored");
            return;
        };
        let from = entry.status;
        match event {
            ShardEvent::Assigned { node, .. } => {
                entry.node = Some(node.clone());
                entry.status = ShardStatus::Assigned;
            }
            ShardEvent::Active { node, .. } => {
                entry.node = Some(node.clone());
                entry.status = ShardStatus::Active;
            }
            ShardEvent::Recovering { .. } => entry.status = ShardStatus::Recovering,
            ShardEvent::Errored { .. } => entry.status = ShardStatus::Error,
            ShardEvent::Stopped { .. } => entry.status = ShardStatus::Stopped,
            ShardEvent::Unassigned { .. } => {
                entry.node = None;
                entry.status = ShardStatus::Unassigned;
            }
        }
        self.revision += 1;
        tracing::info!(
            dataset = %self.dataset,
            %shard,
            from = %from,
            to = %self.entries[shard.0 as usize].status,
            revision = self.revision,
            "shard status changed"
        );
    }

    /// Replace this map with a snapshot if its revision is newer.
    /// Returns true if the snapshot was applied.
    pub fn apply_snapshot(&mut self, snapshot: ShardMap) -> bool {
        if snapshot.revision <= self.revision {
            tracing::debug!(
                dataset = %self.dataset,
                ours = self.revision,
                theirs = snapshot.revision,
                "stale shard-map snapshot discarded"
            );
            return false;
        }
        *self = snapshot;
        true
    }

    /// Test/bootstrap helper: mark a shard Active on a node in one step.
    pub fn set_active(&mut self, shard: ShardId, node: NodeAddress) {
        self.apply_event(&ShardEvent::Active { shard, node });
    }
}
