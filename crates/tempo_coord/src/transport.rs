//! Inter-node shard request transport.
//!
//! The engine talks to owning nodes through this seam. Production would put
//! an RPC client here; the in-process implementation resolves node addresses
//! against a registry of local router handles, which is also the test seam
//! for fail-over scenarios (deregistering a node makes it unavailable).

use async_trait::async_trait;

use dashmap::DashMap;

use tempo_common::types::NodeAddress;
use tempo_common::{CancelToken, ClusterError, TempoResult};

use crate::protocol::{ShardReply, SingleShardQuery};
use crate::router::RouterHandle;

#[async_trait]
pub trait ShardTransport: Send + Sync + 'static {
    /// Deliver a scatter request to the shard's owning node and await its
    /// partial reply. Cancellation propagates to the remote executor.
    async fn send_shard_query(
        &self,
        node: &NodeAddress,
        query: SingleShardQuery,
        cancel: CancelToken,
    ) -> TempoResult<ShardReply>;
}

/// Same-process transport: every node is a router task in this process.
#[derive(Default)]
pub struct InProcessTransport {
    nodes: DashMap<NodeAddress, RouterHandle>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node: NodeAddress, handle: RouterHandle) {
        tracing::debug!(%node, "node registered with in-process transport");
        self.nodes.insert(node, handle);
    }

    /// Remove a node. Requests to it fail with `NodeUnavailable` afterwards.
    pub fn deregister(&self, node: &NodeAddress) {
        tracing::debug!(%node, "node deregistered from in-process transport");
        self.nodes.remove(node);
    }
}

#[async_trait]
impl ShardTransport for InProcessTransport {
    async fn send_shard_query(
        &self,
        node: &NodeAddress,
        query: SingleShardQuery,
        cancel: CancelToken,
    ) -> TempoResult<ShardReply> {
        let handle = self
            .nodes
            .get(node)
            .map(|h| h.value().clone())
            .ok_or_else(|| ClusterError::NodeUnavailable(node.clone()))?;
        handle.single_shard_query(query, cancel).await
    }
}
