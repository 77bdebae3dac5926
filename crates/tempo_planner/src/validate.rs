//! Query validation: resolves names to ids and factories, checks arity and
//! type compatibility, and pins partition queries to shards via the shard
//! map. Pure and synchronous; runs on the router task.
//!
//! Validation is total: every input either produces a resolved value or a
//! categorized error. Unknown names never panic.

use tempo_common::config::QueryOptions;
use tempo_common::shard_map::{ShardMap, ShardStatus};
use tempo_common::types::{
    ChunkScanMethod, ColumnId, ColumnType, Dataset, PartitionPredicate, PartitionScanMethod,
    ShardId,
};
use tempo_common::{ClusterError, PlanError, TempoResult};

use crate::aggregate::{aggregator_factory, combiner, AggregateSpec, ResultClass};
use crate::logical::{DataQuery, PartitionQuery};
use crate::physical::CombineSpec;

/// Resolve column names to ids. A name resolves to at most one id.
pub fn resolve_columns(dataset: &Dataset, names: &[String]) -> Result<Vec<ColumnId>, PlanError> {
    names
        .iter()
        .map(|name| {
            dataset
                .column_by_name(name)
                .map(|c| c.id)
                .ok_or_else(|| PlanError::UnknownColumn(name.clone()))
        })
        .collect()
}

/// Resolve column names for a vector read. Histogram columns cannot be
/// packed into result vectors, so reads of them are rejected up front.
pub fn resolve_read_columns(
    dataset: &Dataset,
    names: &[String],
) -> Result<Vec<ColumnId>, PlanError> {
    names
        .iter()
        .map(|name| {
            let col = dataset
                .column_by_name(name)
                .ok_or_else(|| PlanError::UnknownColumn(name.clone()))?;
            if col.column_type == ColumnType::Histogram {
                return Err(PlanError::BadArgument(format!(
                    "histogram column {} cannot be read as a vector",
                    col.name
                )));
            }
            Ok(col.id)
        })
        .collect()
}

/// Resolve an aggregation function against its input column: existence,
/// arity, argument values, and column-type compatibility. Returns the
/// serializable spec embedded into the physical plan.
pub fn resolve_aggregator(
    dataset: &Dataset,
    function: &str,
    args: &[String],
    column: ColumnId,
) -> Result<AggregateSpec, PlanError> {
    let factory = aggregator_factory(function)
        .ok_or_else(|| PlanError::NoSuchFunction(function.to_string()))?;
    factory.check_arity(args.len())?;
    let col = dataset
        .column(column)
        .ok_or_else(|| PlanError::UnknownColumn(column.to_string()))?;
    let (result_class, cardinality, wide) = factory.resolve(col)?;
    // Build once to validate the argument values, then drop the state.
    factory.build(col, args)?;
    Ok(AggregateSpec {
        function: factory.name().to_string(),
        args: args.to_vec(),
        column,
        result_class,
        cardinality,
        wide,
    })
}

/// Resolve a combine function against the aggregate it merges.
pub fn resolve_combiner(
    function: &str,
    aggregate: &AggregateSpec,
    args: &[String],
) -> Result<CombineSpec, PlanError> {
    let comb =
        combiner(function).ok_or_else(|| PlanError::NoSuchFunction(function.to_string()))?;
    if !args.is_empty() {
        return Err(PlanError::WrongArity {
            given: args.len(),
            expected: 0,
        });
    }
    let compatible = match (comb.name(), aggregate.result_class) {
        ("concat", ResultClass::Histogram) => false,
        ("min" | "max", ResultClass::Histogram) => false,
        _ => true,
    };
    if !compatible {
        return Err(PlanError::BadArgument(format!(
            "combiner {} cannot merge {:?} partials",
            comb.name(),
            aggregate.result_class
        )));
    }
    Ok(CombineSpec {
        function: comb.name().to_string(),
        args: args.to_vec(),
    })
}

/// Validate a data query against the dataset. Time-based scans require a
/// timestamp column.
pub fn validate_data_query(
    dataset: &Dataset,
    data_query: &DataQuery,
) -> Result<ChunkScanMethod, PlanError> {
    match *data_query {
        DataQuery::AllChunks => Ok(ChunkScanMethod::AllChunks),
        DataQuery::MostRecent => Ok(ChunkScanMethod::MostRecent),
        DataQuery::TimeRange { start_ms, end_ms } => {
            if dataset.timestamp_column().is_none() {
                return Err(PlanError::NoTimestampColumn(dataset.dataset_ref().clone()));
            }
            if start_ms > end_ms {
                return Err(PlanError::BadArgument(format!(
                    "time range start {} is after end {}",
                    start_ms, end_ms
                )));
            }
            Ok(ChunkScanMethod::TimeRange { start_ms, end_ms })
        }
        DataQuery::RowKeyRange { start, end } => {
            if start > end {
                return Err(PlanError::BadArgument(format!(
                    "row-key range start {} is after end {}",
                    start, end
                )));
            }
            Ok(ChunkScanMethod::RowKeyRange { start, end })
        }
    }
}

/// Pin a partition query to shards via the shard map. A partition whose
/// owning shard is not Active is silently omitted unless
/// `options.require_all_shards`, in which case the query fails.
pub fn validate_part_query(
    _dataset: &Dataset,
    shard_map: &ShardMap,
    part_query: &PartitionQuery,
    options: &QueryOptions,
) -> TempoResult<Vec<PartitionScanMethod>> {
    let gate = |shard: ShardId| -> TempoResult<bool> {
        match shard_map.status(shard) {
            ShardStatus::Active => Ok(true),
            status if options.require_all_shards => {
                tracing::debug!(%shard, %status, "required shard not active");
                Err(ClusterError::ShardNotActive(shard).into())
            }
            _ => Ok(false),
        }
    };

    match part_query {
        PartitionQuery::Single(key) => {
            let shard = shard_map.shard_for_key(key);
            Ok(if gate(shard)? {
                vec![PartitionScanMethod::SinglePartition {
                    shard,
                    key: key.clone(),
                }]
            } else {
                Vec::new()
            })
        }
        PartitionQuery::Multi(keys) => {
            if keys.is_empty() {
                return Err(PlanError::BadArgument("no partition keys given".into()).into());
            }
            let mut by_shard: std::collections::BTreeMap<ShardId, Vec<_>> =
                std::collections::BTreeMap::new();
            for key in keys {
                by_shard
                    .entry(shard_map.shard_for_key(key))
                    .or_default()
                    .push(key.clone());
            }
            let mut methods = Vec::new();
            for (shard, keys) in by_shard {
                if gate(shard)? {
                    methods.push(PartitionScanMethod::MultiPartition { shard, keys });
                }
            }
            Ok(methods)
        }
        PartitionQuery::All => filtered_methods(shard_map, PartitionPredicate::All, gate),
        PartitionQuery::Filtered(predicate) => {
            filtered_methods(shard_map, predicate.clone(), gate)
        }
    }
}

fn filtered_methods(
    shard_map: &ShardMap,
    predicate: PartitionPredicate,
    gate: impl Fn(ShardId) -> TempoResult<bool>,
) -> TempoResult<Vec<PartitionScanMethod>> {
    let mut methods = Vec::new();
    for shard in (0..shard_map.num_shards()).map(ShardId) {
        if gate(shard)? {
            methods.push(PartitionScanMethod::FilteredPartition {
                shard,
                predicate: predicate.clone(),
            });
        }
    }
    Ok(methods)
}
