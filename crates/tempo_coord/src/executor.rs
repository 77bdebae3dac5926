//! Shard-local execution of scatter requests.
//!
//! The executor re-validates every request against its own dataset version
//! (the remote side never trusts the caller's validation), opens a chunk
//! scan against the column store, and folds or materializes chunks one at a
//! time. The cancel token is polled at every chunk boundary; a cancelled
//! request discards its partial state and emits nothing.

use std::sync::Arc;

use tempo_common::types::{ColumnId, ColumnType, Dataset, PartitionKey};
use tempo_common::{CancelToken, PlanError, TempoError, TempoResult};
use tempo_planner::aggregate::{build_aggregator, FoldStatus};
use tempo_planner::physical::LocalPlanTemplate;
use tempo_storage::chunk::ChunkSet;
use tempo_storage::metastore::MetaStore;
use tempo_storage::store::ColumnStore;

use crate::protocol::{ShardItem, ShardReply, SingleShardQuery};
use crate::result::ColumnVector;

pub struct ShardExecutor {
    metastore: Arc<MetaStore>,
    store: Arc<dyn ColumnStore>,
}

impl ShardExecutor {
    pub fn new(metastore: Arc<MetaStore>, store: Arc<dyn ColumnStore>) -> Self {
        ShardExecutor { metastore, store }
    }

    pub async fn execute(
        &self,
        query: &SingleShardQuery,
        cancel: &CancelToken,
    ) -> TempoResult<ShardReply> {
        let dataset = self.metastore.get(&query.dataset)?;
        self.revalidate(&dataset, query)?;

        let items = match &query.template {
            LocalPlanTemplate::ShardAggregate { spec, chunks } => {
                let mut agg = build_aggregator(&dataset, spec)?;
                'methods: for method in &query.methods {
                    let mut stream = self
                        .store
                        .scan_chunks(&dataset, method, chunks, &[spec.column])
                        .await?;
                    while let Some(cs) = stream.next().await {
                        if cancel.is_cancelled() {
                            return Err(TempoError::Cancelled);
                        }
                        let cs = cs?;
                        if cs.rows() == 0 {
                            continue;
                        }
                        let chunk = cs
                            .columns
                            .first()
                            .ok_or_else(|| TempoError::internal("chunk set without columns"))?;
                        if agg.fold_chunk(chunk)? == FoldStatus::Done {
                            break 'methods;
                        }
                    }
                }
                vec![ShardItem::Aggregate(agg.finalize())]
            }

            LocalPlanTemplate::ReadVectors { columns, chunks } => {
                let mut items = Vec::new();
                'methods: for method in &query.methods {
                    let mut stream = self
                        .store
                        .scan_chunks(&dataset, method, chunks, columns)
                        .await?;
                    let mut current: Option<(PartitionKey, Vec<ColumnVector>)> = None;
                    while let Some(cs) = stream.next().await {
                        if cancel.is_cancelled() {
                            return Err(TempoError::Cancelled);
                        }
                        let cs = cs?;
                        if Self::accumulate(&mut current, &mut items, cs)?
                            && items.len() >= query.item_limit
                        {
                            current = None;
                            break 'methods;
                        }
                    }
                    if let Some((partition, columns)) = current.take() {
                        items.push(ShardItem::Series { partition, columns });
                        if items.len() >= query.item_limit {
                            break 'methods;
                        }
                    }
                }
                items
            }

            LocalPlanTemplate::StreamLastTuple { columns } => {
                let mut items = Vec::new();
                'methods: for method in &query.methods {
                    let mut stream = self
                        .store
                        .scan_chunks(
                            &dataset,
                            method,
                            &tempo_common::types::ChunkScanMethod::MostRecent,
                            columns,
                        )
                        .await?;
                    while let Some(cs) = stream.next().await {
                        if cancel.is_cancelled() {
                            return Err(TempoError::Cancelled);
                        }
                        let cs = cs?;
                        if cs.rows() == 0 {
                            continue;
                        }
                        let row = cs.rows() - 1;
                        let values = cs
                            .columns
                            .iter()
                            .map(|c| {
                                c.cell(row)
                                    .ok_or_else(|| TempoError::internal("ragged chunk set"))
                            })
                            .collect::<TempoResult<_>>()?;
                        items.push(ShardItem::Row {
                            partition: cs.partition,
                            values,
                        });
                        if items.len() >= query.item_limit {
                            break 'methods;
                        }
                    }
                }
                items
            }
        };

        Ok(ShardReply {
            shard: query.shard,
            items,
        })
    }

    /// Local validation of a scatter request. The aggregate path re-checks
    /// its function and column when the aggregator is rebuilt.
    fn revalidate(&self, dataset: &Dataset, query: &SingleShardQuery) -> TempoResult<()> {
        for method in &query.methods {
            if method.shard() != query.shard {
                return Err(TempoError::internal(format!(
                    "scan method pinned to {} in a request for {}",
                    method.shard(),
                    query.shard
                )));
            }
        }
        match &query.template {
            LocalPlanTemplate::ReadVectors { columns, .. }
            | LocalPlanTemplate::StreamLastTuple { columns } => {
                self.check_read_columns(dataset, columns)
            }
            LocalPlanTemplate::ShardAggregate { .. } => Ok(()),
        }
    }

    fn check_read_columns(&self, dataset: &Dataset, columns: &[ColumnId]) -> TempoResult<()> {
        for id in columns {
            let col = dataset
                .column(*id)
                .ok_or_else(|| PlanError::UnknownColumn(id.to_string()))?;
            if col.column_type == ColumnType::Histogram {
                return Err(PlanError::BadArgument(format!(
                    "histogram column {} cannot be read as a vector",
                    col.name
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Fold a chunk set into the current per-partition accumulator, pushing
    /// a finished `Series` item on partition change. Returns true if an item
    /// was pushed.
    fn accumulate(
        current: &mut Option<(PartitionKey, Vec<ColumnVector>)>,
        items: &mut Vec<ShardItem>,
        cs: ChunkSet,
    ) -> TempoResult<bool> {
        match current {
            Some((key, vectors)) if *key == cs.partition => {
                for (vector, chunk) in vectors.iter_mut().zip(&cs.columns) {
                    vector.append(ColumnVector::from_chunk(chunk)?)?;
                }
                Ok(false)
            }
            _ => {
                let pushed = if let Some((partition, columns)) = current.take() {
                    items.push(ShardItem::Series { partition, columns });
                    true
                } else {
                    false
                };
                let vectors = cs
                    .columns
                    .iter()
                    .map(ColumnVector::from_chunk)
                    .collect::<TempoResult<_>>()?;
                *current = Some((cs.partition, vectors));
                Ok(pushed)
            }
        }
    }
}
