use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Unique identifier for a shard of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(pub u64);

/// Stable identifier for a column within a dataset. Dense and unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(pub u32);

/// Process-local query correlation tag, echoed in every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub u64);

/// Network address of a cluster node ("host:port").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress(pub String);

/// The user-visible series key of a group of time-series rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(pub String);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard:{}", self.0)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{}", self.0)
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "qry:{}", self.0)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl NodeAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        NodeAddress(addr.into())
    }
}

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        PartitionKey(key.into())
    }

    /// Shard placement hash of this key.
    pub fn placement_hash(&self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(self.0.as_bytes())
    }
}

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

impl QueryId {
    /// Sentinel used by shard-side errors raised before a query id exists.
    pub const NONE: QueryId = QueryId(0);

    /// Allocate the next process-wide query id.
    pub fn next() -> QueryId {
        QueryId(NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable reference to a dataset: opaque name plus optional database tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    pub dataset: String,
    pub database: Option<String>,
}

impl DatasetRef {
    pub fn new(dataset: impl Into<String>) -> Self {
        DatasetRef {
            dataset: dataset.into(),
            database: None,
        }
    }

    pub fn in_database(dataset: impl Into<String>, database: impl Into<String>) -> Self {
        DatasetRef {
            dataset: dataset.into(),
            database: Some(database.into()),
        }
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{}.{}", db, self.dataset),
            None => write!(f, "{}", self.dataset),
        }
    }
}

/// Value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Long,
    Double,
    Timestamp,
    String,
    Histogram,
}

impl ColumnType {
    /// True for types an aggregator can fold numerically.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Int | ColumnType::Long | ColumnType::Double | ColumnType::Timestamp
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Int => "int",
            ColumnType::Long => "long",
            ColumnType::Double => "double",
            ColumnType::Timestamp => "timestamp",
            ColumnType::String => "string",
            ColumnType::Histogram => "histogram",
        };
        write!(f, "{}", s)
    }
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(id: u32, name: impl Into<String>, column_type: ColumnType) -> Self {
        Column {
            id: ColumnId(id),
            name: name.into(),
            column_type,
        }
    }
}

/// An immutable dataset definition. Mutations require a new `DatasetRef`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    dataset_ref: DatasetRef,
    columns: Vec<Column>,
    partition_columns: Vec<ColumnId>,
    row_key_columns: Vec<ColumnId>,
    timestamp_column: Option<ColumnId>,
}

impl Dataset {
    /// Build a dataset definition, checking the column invariants:
    /// ids are dense `0..n`, names are unique, and the partition / row-key
    /// specs name existing columns. The timestamp column is the first
    /// row-key column of type `Timestamp`, if any.
    pub fn new(
        dataset_ref: DatasetRef,
        columns: Vec<Column>,
        partition_columns: &[&str],
        row_key_columns: &[&str],
    ) -> Result<Self, StoreError> {
        if columns.is_empty() {
            return Err(StoreError::InvalidSchema("dataset has no columns".into()));
        }
        for (i, col) in columns.iter().enumerate() {
            if col.id.0 as usize != i {
                return Err(StoreError::InvalidSchema(format!(
                    "column ids must be dense: expected {} for column {}, got {}",
                    i, col.name, col.id
                )));
            }
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(StoreError::InvalidSchema(format!(
                    "duplicate column name: {}",
                    col.name
                )));
            }
        }

        let resolve = |names: &[&str]| -> Result<Vec<ColumnId>, StoreError> {
            names
                .iter()
                .map(|n| {
                    columns
                        .iter()
                        .find(|c| c.name == *n)
                        .map(|c| c.id)
                        .ok_or_else(|| {
                            StoreError::InvalidSchema(format!("unknown key column: {}", n))
                        })
                })
                .collect()
        };

        let partition_columns = resolve(partition_columns)?;
        let row_key_columns = resolve(row_key_columns)?;
        if row_key_columns.is_empty() {
            return Err(StoreError::InvalidSchema(
                "dataset needs at least one row-key column".into(),
            ));
        }
        let timestamp_column = row_key_columns
            .iter()
            .copied()
            .find(|id| columns[id.0 as usize].column_type == ColumnType::Timestamp);

        Ok(Dataset {
            dataset_ref,
            columns,
            partition_columns,
            row_key_columns,
            timestamp_column,
        })
    }

    pub fn dataset_ref(&self) -> &DatasetRef {
        &self.dataset_ref
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id.0 as usize)
    }

    /// Resolve a column name to its definition. Names resolve to at most one id.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn partition_columns(&self) -> &[ColumnId] {
        &self.partition_columns
    }

    pub fn row_key_columns(&self) -> &[ColumnId] {
        &self.row_key_columns
    }

    pub fn timestamp_column(&self) -> Option<ColumnId> {
        self.timestamp_column
    }
}

/// Predicate over partition keys, used by filtered partition scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionPredicate {
    /// Match every partition on the shard.
    All,
    /// Match partitions whose key starts with the given prefix.
    KeyPrefix(String),
}

impl PartitionPredicate {
    pub fn matches(&self, key: &PartitionKey) -> bool {
        match self {
            PartitionPredicate::All => true,
            PartitionPredicate::KeyPrefix(prefix) => key.0.starts_with(prefix.as_str()),
        }
    }
}

/// How to select partitions on one shard. The scatter step has already
/// pinned every method to a single shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionScanMethod {
    SinglePartition {
        shard: ShardId,
        key: PartitionKey,
    },
    MultiPartition {
        shard: ShardId,
        keys: Vec<PartitionKey>,
    },
    FilteredPartition {
        shard: ShardId,
        predicate: PartitionPredicate,
    },
}

impl PartitionScanMethod {
    pub fn shard(&self) -> ShardId {
        match self {
            PartitionScanMethod::SinglePartition { shard, .. }
            | PartitionScanMethod::MultiPartition { shard, .. }
            | PartitionScanMethod::FilteredPartition { shard, .. } => *shard,
        }
    }
}

/// How to select chunks within the chosen partitions. Range bounds are
/// inclusive; an empty range yields zero rows, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChunkScanMethod {
    AllChunks,
    MostRecent,
    TimeRange { start_ms: i64, end_ms: i64 },
    RowKeyRange { start: i64, end: i64 },
}
