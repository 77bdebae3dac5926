//! In-memory column store: one partition map per shard, rows sorted by
//! timestamp, chunks cut at a fixed row budget. Backs the in-process
//! coordinator used by tests and the demo server; the real store lives
//! behind the same `ColumnStore` seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use tempo_common::types::{
    ChunkScanMethod, ColumnId, ColumnType, Dataset, DatasetRef, PartitionKey,
    PartitionScanMethod, ShardId,
};
use tempo_common::{StoreError, TempoError, TempoResult};

use crate::chunk::{ChunkSet, ChunkStream, ColumnChunk, Row, CHUNK_ROWS};
use crate::store::ColumnStore;

pub struct MemStore {
    num_shards: u64,
    datasets: DashMap<DatasetRef, ShardSet>,
}

struct ShardSet {
    shards: Vec<ShardData>,
}

#[derive(Default)]
struct ShardData {
    partitions: RwLock<BTreeMap<PartitionKey, Vec<Row>>>,
}

impl MemStore {
    pub fn new(num_shards: u64) -> Self {
        MemStore {
            num_shards,
            datasets: DashMap::new(),
        }
    }

    pub fn num_shards(&self) -> u64 {
        self.num_shards
    }

    /// Append rows to a partition. The owning shard is derived from the
    /// partition key's placement hash. Rows are kept sorted by timestamp.
    pub fn ingest(
        &self,
        dataset: &Dataset,
        key: PartitionKey,
        rows: Vec<Row>,
    ) -> TempoResult<()> {
        let width = dataset.columns().len();
        for row in &rows {
            if row.values.len() != width {
                return Err(StoreError::InvalidSchema(format!(
                    "row has {} values, dataset {} has {} columns",
                    row.values.len(),
                    dataset.dataset_ref(),
                    width
                ))
                .into());
            }
        }

        let shard = ShardId(key.placement_hash() % self.num_shards);
        let entry = self
            .datasets
            .entry(dataset.dataset_ref().clone())
            .or_insert_with(|| ShardSet {
                shards: (0..self.num_shards).map(|_| ShardData::default()).collect(),
            });
        let mut partitions = entry.shards[shard.0 as usize].partitions.write();
        let part = partitions.entry(key).or_default();
        part.extend(rows);
        part.sort_by_key(|r| r.timestamp);
        Ok(())
    }

    /// Which shard the store placed a key on. Mirrors `ShardMap::shard_for_key`.
    pub fn shard_of(&self, key: &PartitionKey) -> ShardId {
        ShardId(key.placement_hash() % self.num_shards)
    }

    fn selected_partitions(
        &self,
        dataset: &DatasetRef,
        partitions: &PartitionScanMethod,
    ) -> Vec<(PartitionKey, Vec<Row>)> {
        let Some(set) = self.datasets.get(dataset) else {
            return Vec::new();
        };
        let Some(shard) = set.shards.get(partitions.shard().0 as usize) else {
            return Vec::new();
        };
        let map = shard.partitions.read();
        match partitions {
            PartitionScanMethod::SinglePartition { key, .. } => map
                .get_key_value(key)
                .map(|(k, v)| vec![(k.clone(), v.clone())])
                .unwrap_or_default(),
            PartitionScanMethod::MultiPartition { keys, .. } => {
                let mut sorted = keys.clone();
                sorted.sort();
                sorted
                    .into_iter()
                    .filter_map(|k| map.get(&k).map(|v| (k, v.clone())))
                    .collect()
            }
            PartitionScanMethod::FilteredPartition { predicate, .. } => map
                .iter()
                .filter(|(k, _)| predicate.matches(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn filter_rows(rows: Vec<Row>, chunks: &ChunkScanMethod) -> Vec<Row> {
        match chunks {
            ChunkScanMethod::AllChunks => rows,
            ChunkScanMethod::MostRecent => rows.into_iter().last().into_iter().collect(),
            ChunkScanMethod::TimeRange { start_ms, end_ms } => rows
                .into_iter()
                .filter(|r| r.timestamp >= *start_ms && r.timestamp <= *end_ms)
                .collect(),
            // The row key of a time-series partition is its timestamp.
            ChunkScanMethod::RowKeyRange { start, end } => rows
                .into_iter()
                .filter(|r| r.timestamp >= *start && r.timestamp <= *end)
                .collect(),
        }
    }

    fn cut_chunks(
        key: PartitionKey,
        rows: &[Row],
        columns: &[ColumnId],
        col_types: &[ColumnType],
        out: &mut Vec<ChunkSet>,
    ) {
        for window in rows.chunks(CHUNK_ROWS) {
            let cols = columns
                .iter()
                .zip(col_types)
                .map(|(id, ty)| {
                    ColumnChunk::from_cells(*ty, window.iter().map(|r| &r.values[id.0 as usize]))
                })
                .collect();
            out.push(ChunkSet {
                partition: key.clone(),
                columns: cols,
            });
        }
    }
}

#[async_trait]
impl ColumnStore for MemStore {
    async fn scan_chunks(
        &self,
        dataset: &Dataset,
        partitions: &PartitionScanMethod,
        chunks: &ChunkScanMethod,
        columns: &[ColumnId],
    ) -> TempoResult<ChunkStream> {
        let col_types: Vec<ColumnType> = columns
            .iter()
            .map(|id| {
                dataset
                    .column(*id)
                    .map(|c| c.column_type)
                    .ok_or_else(|| TempoError::internal(format!("column {} out of range", id)))
            })
            .collect::<TempoResult<_>>()?;

        let mut sets = Vec::new();
        for (key, rows) in self.selected_partitions(dataset.dataset_ref(), partitions) {
            let rows = Self::filter_rows(rows, chunks);
            Self::cut_chunks(key, &rows, columns, &col_types, &mut sets);
        }
        Ok(ChunkStream::new(sets.into_iter().map(Ok)))
    }

    fn active_shards(&self, dataset: &DatasetRef) -> Vec<ShardId> {
        let Some(set) = self.datasets.get(dataset) else {
            return Vec::new();
        };
        set.shards
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.partitions.read().is_empty())
            .map(|(i, _)| ShardId(i as u64))
            .collect()
    }

    fn index_names(&self, dataset: &DatasetRef) -> Vec<(String, usize)> {
        let Some(set) = self.datasets.get(dataset) else {
            return Vec::new();
        };
        let cardinality: usize = set
            .shards
            .iter()
            .map(|s| s.partitions.read().len())
            .sum();
        // The in-memory store indexes the composed partition key only.
        vec![("_partition_key_".to_string(), cardinality)]
    }

    fn index_values(
        &self,
        dataset: &DatasetRef,
        shard: ShardId,
        index: &str,
        limit: usize,
    ) -> Vec<String> {
        if index != "_partition_key_" {
            return Vec::new();
        }
        let Some(set) = self.datasets.get(dataset) else {
            return Vec::new();
        };
        let Some(shard) = set.shards.get(shard.0 as usize) else {
            return Vec::new();
        };
        let result = shard
            .partitions
            .read()
            .keys()
            .take(limit)
            .map(|k| k.0.clone())
            .collect();
        result
    }
}
