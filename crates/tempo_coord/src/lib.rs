//! The TempoDB distributed query coordinator: shard-map snapshots,
//! scatter/gather engine, shard-local executor, per-dataset query router,
//! result codec, membership client, and the in-process transport used by
//! tests and the demo server.

pub mod cluster;
pub mod engine;
pub mod executor;
pub mod membership;
pub mod protocol;
pub mod result;
pub mod router;
pub mod routing;
pub mod transport;

pub use cluster::InProcessCluster;
pub use engine::{Engine, ScatterMetrics};
pub use executor::ShardExecutor;
pub use membership::SeedsClient;
pub use protocol::{QueryOutput, QueryResponse, ShardItem, ShardReply, SingleShardQuery};
pub use result::{
    decode_tuple, encode_output, encode_tuple, ColumnVector, QueryResultValue, ResultColumn,
    TupleResult, VectorResult,
};
pub use router::{QueryRouter, RouterCommand, RouterHandle};
pub use routing::SharedShardMap;
pub use transport::{InProcessTransport, ShardTransport};
