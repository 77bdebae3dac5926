//! Shared types for the TempoDB query coordinator: dataset model, shard map,
//! error taxonomy, configuration, cancellation, and query tracing.

pub mod cancel;
pub mod config;
pub mod error;
pub mod shard_map;
pub mod trace;
pub mod types;

pub use cancel::CancelToken;
pub use config::{ClusterConfig, CoordConfig, QueryConfig, QueryOptions, ServerConfig};
pub use error::{
    ClusterError, CodecError, ErrorKind, PlanError, StoreError, TempoError, TempoResult,
};
pub use shard_map::{ShardEntry, ShardEvent, ShardMap, ShardStatus};
pub use trace::QueryTrace;
pub use types::{
    ChunkScanMethod, Column, ColumnId, ColumnType, Dataset, DatasetRef, NodeAddress,
    PartitionKey, PartitionPredicate, PartitionScanMethod, QueryId, ShardId,
};
