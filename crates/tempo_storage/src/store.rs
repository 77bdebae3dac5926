//! The column-store seam consumed by the coordinator core. The shard
//! executor only ever sees chunk iterators and shard/index listings; the
//! on-disk or in-memory representation behind them is not its concern.

use async_trait::async_trait;

use tempo_common::types::{
    ChunkScanMethod, ColumnId, Dataset, DatasetRef, PartitionScanMethod, ShardId,
};
use tempo_common::TempoResult;

use crate::chunk::ChunkStream;

#[async_trait]
pub trait ColumnStore: Send + Sync + 'static {
    /// Open a chunk scan over the partitions selected by `partitions`,
    /// restricted by `chunks`, projecting `columns`. Chunks arrive in
    /// partition-key order, then row order within a partition.
    async fn scan_chunks(
        &self,
        dataset: &Dataset,
        partitions: &PartitionScanMethod,
        chunks: &ChunkScanMethod,
        columns: &[ColumnId],
    ) -> TempoResult<ChunkStream>;

    /// Shards of this dataset holding any data on this node.
    fn active_shards(&self, dataset: &DatasetRef) -> Vec<ShardId>;

    /// Queryable index names with their cardinality.
    fn index_names(&self, dataset: &DatasetRef) -> Vec<(String, usize)>;

    /// Values of one index on one shard, truncated to `limit`.
    fn index_values(
        &self,
        dataset: &DatasetRef,
        shard: ShardId,
        index: &str,
        limit: usize,
    ) -> Vec<String>;
}
