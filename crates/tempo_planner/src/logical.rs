//! Logical query plans as they arrive from clients: a small recursive sum
//! type, traversed by pattern matching. The plan names columns and functions
//! by string; the validator resolves them to ids and factories.

use serde::{Deserialize, Serialize};

use tempo_common::types::{PartitionKey, PartitionPredicate};

/// Which partitions a query addresses, before shard resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionQuery {
    /// Every partition of the dataset.
    All,
    /// Exactly one partition.
    Single(PartitionKey),
    /// An explicit list of partitions.
    Multi(Vec<PartitionKey>),
    /// Partitions matching a predicate.
    Filtered(PartitionPredicate),
}

/// Which rows a range query addresses, before validation against the
/// dataset's timestamp column. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DataQuery {
    AllChunks,
    MostRecent,
    TimeRange { start_ms: i64, end_ms: i64 },
    RowKeyRange { start: i64, end: i64 },
}

/// A client query. Request-scoped and immutable after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    /// Most-recent sample per partition.
    PartitionsInstant {
        partitions: PartitionQuery,
        columns: Vec<String>,
    },
    /// Time/row range per partition.
    PartitionsRange {
        partitions: PartitionQuery,
        range: DataQuery,
        columns: Vec<String>,
    },
    /// Per-shard aggregate of the child's rows.
    ReduceEach {
        function: String,
        args: Vec<String>,
        child: Box<LogicalPlan>,
    },
    /// Cross-shard combine of per-shard aggregates.
    ReducePartitions {
        function: String,
        args: Vec<String>,
        child: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    /// Column names addressed at the leaf of the plan tree.
    pub fn leaf_columns(&self) -> &[String] {
        match self {
            LogicalPlan::PartitionsInstant { columns, .. }
            | LogicalPlan::PartitionsRange { columns, .. } => columns,
            LogicalPlan::ReduceEach { child, .. }
            | LogicalPlan::ReducePartitions { child, .. } => child.leaf_columns(),
        }
    }

    /// One-word label for traces.
    pub fn kind(&self) -> &'static str {
        match self {
            LogicalPlan::PartitionsInstant { .. } => "instant",
            LogicalPlan::PartitionsRange { .. } => "range",
            LogicalPlan::ReduceEach { .. } => "reduce_each",
            LogicalPlan::ReducePartitions { .. } => "reduce_partitions",
        }
    }
}
