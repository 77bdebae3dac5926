//! Shared shard-map snapshots.
//!
//! The router is the only writer; every mutation publishes a new immutable
//! `Arc<ShardMap>` by swapping the inner pointer, so readers (the engine,
//! retry re-routing) take lock-free-in-spirit snapshots that stay stable for
//! the lifetime of one dispatch.

use std::sync::Arc;

use parking_lot::RwLock;

use tempo_common::shard_map::{ShardEvent, ShardMap};

pub struct SharedShardMap {
    inner: RwLock<Arc<ShardMap>>,
}

impl SharedShardMap {
    pub fn new(map: ShardMap) -> Self {
        SharedShardMap {
            inner: RwLock::new(Arc::new(map)),
        }
    }

    /// The current immutable snapshot.
    pub fn snapshot(&self) -> Arc<ShardMap> {
        self.inner.read().clone()
    }

    /// Apply a shard event and publish the new snapshot.
    pub fn apply_event(&self, event: &ShardEvent) {
        let mut guard = self.inner.write();
        let mut next = (**guard).clone();
        next.apply_event(event);
        *guard = Arc::new(next);
    }

    /// Replace the map with a snapshot if its revision is newer.
    /// Returns true if the snapshot was applied.
    pub fn apply_snapshot(&self, snapshot: ShardMap) -> bool {
        let mut guard = self.inner.write();
        let mut next = (**guard).clone();
        if next.apply_snapshot(snapshot) {
            *guard = Arc::new(next);
            true
        } else {
            false
        }
    }
}
