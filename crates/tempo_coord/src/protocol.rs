//! Coordinator message shapes: the per-shard scatter request, shard replies,
//! and the client-facing reply envelope.

use serde::{Deserialize, Serialize};

use tempo_common::types::{DatasetRef, PartitionKey, PartitionScanMethod, QueryId, ShardId};
use tempo_common::TempoError;
use tempo_planner::aggregate::Aggregate;
use tempo_planner::physical::LocalPlanTemplate;
use tempo_storage::chunk::CellValue;

use crate::result::{ColumnVector, QueryResultValue};

/// Scatter request for one shard. Every method in `methods` is pinned to
/// `shard`; the receiving node re-validates against its own dataset version
/// before executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleShardQuery {
    pub query_id: QueryId,
    pub dataset: DatasetRef,
    pub shard: ShardId,
    pub template: LocalPlanTemplate,
    pub methods: Vec<PartitionScanMethod>,
    pub item_limit: usize,
}

/// One element of a shard's lazy result sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShardItem {
    /// A single sample row (last-tuple reads).
    Row {
        partition: PartitionKey,
        values: Vec<CellValue>,
    },
    /// One partition's column vectors (range reads).
    Series {
        partition: PartitionKey,
        columns: Vec<ColumnVector>,
    },
    /// A partial aggregate (shard aggregation).
    Aggregate(Aggregate),
}

/// A shard's reply to a `SingleShardQuery`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardReply {
    pub shard: ShardId,
    pub items: Vec<ShardItem>,
}

/// What the engine hands to the result codec.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Shard items concatenated in (shard id asc, submission order).
    Items(Vec<ShardItem>),
    /// The combiner's fold over all shard partials.
    Combined(Aggregate),
}

/// Client-facing reply. The query id always echoes the id generated at
/// dispatch; shard-side failures raised before an id exists use
/// `QueryId::NONE`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResponse {
    Result {
        query_id: QueryId,
        result: QueryResultValue,
    },
    Error {
        query_id: QueryId,
        error: TempoError,
    },
}

impl QueryResponse {
    pub fn query_id(&self) -> QueryId {
        match self {
            QueryResponse::Result { query_id, .. } | QueryResponse::Error { query_id, .. } => {
                *query_id
            }
        }
    }

    pub fn into_result(self) -> Result<QueryResultValue, TempoError> {
        match self {
            QueryResponse::Result { result, .. } => Ok(result),
            QueryResponse::Error { error, .. } => Err(error),
        }
    }
}
