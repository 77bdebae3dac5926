//! Same-process multi-node coordinator for tests and the demo server.
//!
//! Wraps N router tasks sharing one in-memory column store and metastore,
//! wired through the in-process transport. Shards are assigned to nodes
//! round-robin and marked Active; the bootstrap snapshot is broadcast to
//! every router before `start` returns, so the cluster comes up Ready.

use std::sync::Arc;

use tempo_common::config::QueryConfig;
use tempo_common::shard_map::{ShardEvent, ShardMap};
use tempo_common::types::{Dataset, NodeAddress, PartitionKey, ShardId};
use tempo_common::TempoResult;
use tempo_storage::chunk::Row;
use tempo_storage::memstore::MemStore;
use tempo_storage::metastore::MetaStore;
use tempo_storage::store::ColumnStore;

use crate::router::{QueryRouter, RouterHandle};
use crate::transport::{InProcessTransport, ShardTransport};

pub struct InProcessCluster {
    pub metastore: Arc<MetaStore>,
    pub store: Arc<MemStore>,
    pub transport: Arc<InProcessTransport>,
    pub nodes: Vec<RouterHandle>,
    dataset: Arc<Dataset>,
    bootstrap_map: ShardMap,
}

impl InProcessCluster {
    pub async fn start(
        dataset: Dataset,
        num_nodes: usize,
        num_shards: u64,
        defaults: QueryConfig,
    ) -> TempoResult<Self> {
        let metastore = Arc::new(MetaStore::new());
        metastore.create(dataset.clone())?;
        let dataset = metastore.get(dataset.dataset_ref())?;

        let store = Arc::new(MemStore::new(num_shards));
        let transport = Arc::new(InProcessTransport::new());

        let mut nodes = Vec::with_capacity(num_nodes);
        for i in 0..num_nodes {
            let addr = NodeAddress::new(format!("node-{i}:8060"));
            let store: Arc<dyn ColumnStore> = store.clone();
            let transport_dyn: Arc<dyn ShardTransport> = transport.clone();
            let handle = QueryRouter::spawn(
                addr.clone(),
                dataset.dataset_ref().clone(),
                metastore.clone(),
                store,
                transport_dyn,
                defaults.clone(),
                256,
            );
            transport.register(addr, handle.clone());
            nodes.push(handle);
        }

        let mut map = ShardMap::new(dataset.dataset_ref().clone(), num_shards);
        for shard in 0..num_shards {
            let owner = nodes[(shard as usize) % num_nodes].node().clone();
            map.set_active(ShardId(shard), owner);
        }
        for node in &nodes {
            node.shard_snapshot(map.clone()).await;
        }

        Ok(InProcessCluster {
            metastore,
            store,
            transport,
            nodes,
            dataset,
            bootstrap_map: map,
        })
    }

    /// The node client requests land on.
    pub fn coordinator(&self) -> &RouterHandle {
        &self.nodes[0]
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn shard_map(&self) -> &ShardMap {
        &self.bootstrap_map
    }

    pub fn ingest(&self, key: impl Into<String>, rows: Vec<Row>) -> TempoResult<()> {
        self.store
            .ingest(&self.dataset, PartitionKey::new(key), rows)
    }

    /// Deliver a shard event to every router, as the membership stream
    /// would.
    pub async fn broadcast_event(&self, event: ShardEvent) {
        for node in &self.nodes {
            node.shard_event(event.clone()).await;
        }
    }

    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.shutdown().await;
        }
    }
}
