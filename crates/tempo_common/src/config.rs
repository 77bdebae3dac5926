use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level coordinator configuration (`tempo.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordConfig {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Default limits applied to every query unless overridden per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Global deadline per query in seconds.
    pub query_timeout_secs: u64,
    /// Max concurrent shard requests per query.
    pub parallelism: usize,
    /// Max result items across all shards.
    pub item_limit: usize,
    /// Fail the query if any owning shard is not Active.
    pub require_all_shards: bool,
    /// After producing a result, encode/decode it and log failures.
    pub test_query_serialization: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: 30,
            parallelism: 16,
            item_limit: 1000,
            require_all_shards: false,
            test_query_serialization: false,
        }
    }
}

/// Cluster membership configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Seeds endpoint returning `{"members": ["host:port", ...]}`.
    pub seeds_url: String,
    /// How long bootstrap waits for a non-empty member list before failing.
    pub cluster_membership_timeout_secs: u64,
    /// Number of shards per dataset.
    pub num_shards: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            seeds_url: "http://127.0.0.1:8070/__members__".into(),
            cluster_membership_timeout_secs: 30,
            num_shards: 4,
        }
    }
}

/// Per-node server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address this node advertises to the cluster.
    pub node_addr: String,
    /// Capacity of each router mailbox.
    pub mailbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_addr: "127.0.0.1:8060".into(),
            mailbox_capacity: 256,
        }
    }
}

/// Per-query options, snapshotted from `QueryConfig` at dispatch time and
/// overridable per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub query_timeout_secs: u64,
    pub parallelism: usize,
    pub item_limit: usize,
    pub require_all_shards: bool,
    pub test_query_serialization: bool,
}

impl QueryOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.query_timeout_secs = secs;
        self
    }

    pub fn with_item_limit(mut self, limit: usize) -> Self {
        self.item_limit = limit;
        self
    }

    pub fn with_require_all_shards(mut self, require: bool) -> Self {
        self.require_all_shards = require;
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions::from(&QueryConfig::default())
    }
}

impl From<&QueryConfig> for QueryOptions {
    fn from(cfg: &QueryConfig) -> Self {
        Self {
            query_timeout_secs: cfg.query_timeout_secs,
            parallelism: cfg.parallelism,
            item_limit: cfg.item_limit,
            require_all_shards: cfg.require_all_shards,
            test_query_serialization: cfg.test_query_serialization,
        }
    }
}
