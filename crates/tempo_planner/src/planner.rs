//! Logical → physical plan compilation. Rule-based and deterministic; no
//! cost model. Exactly four plan shapes are supported:
//!
//! 1. `PartitionsInstant`                 → scatter + last-tuple readers
//! 2. `PartitionsRange`                   → scatter + vector readers
//! 3. `ReduceEach(range)`                 → scatter + shard aggregates, concat
//! 4. `ReducePartitions(ReduceEach(..))`  → scatter + shard aggregates, combine
//!
//! Everything else is `UnsupportedPlan`.

use tempo_common::config::QueryOptions;
use tempo_common::shard_map::ShardMap;
use tempo_common::types::Dataset;
use tempo_common::{PlanError, TempoResult};

use crate::logical::LogicalPlan;
use crate::physical::{GatherMode, LocalPlanTemplate, PhysicalPlan};
use crate::validate::{
    resolve_aggregator, resolve_columns, resolve_combiner, resolve_read_columns,
    validate_data_query, validate_part_query,
};

/// Compile a validated logical plan into a physical plan against the given
/// shard-map snapshot.
pub fn plan_query(
    dataset: &Dataset,
    shard_map: &ShardMap,
    plan: &LogicalPlan,
    options: &QueryOptions,
) -> TempoResult<PhysicalPlan> {
    match plan {
        LogicalPlan::PartitionsInstant {
            partitions,
            columns,
        } => {
            let column_ids = resolve_read_columns(dataset, columns)?;
            let methods = validate_part_query(dataset, shard_map, partitions, options)?;
            Ok(PhysicalPlan::DistributeConcat {
                methods,
                parallelism: options.parallelism,
                item_limit: options.item_limit,
                template: LocalPlanTemplate::StreamLastTuple {
                    columns: column_ids,
                },
                gather: GatherMode::Concat,
            })
        }

        LogicalPlan::PartitionsRange {
            partitions,
            range,
            columns,
        } => {
            let column_ids = resolve_read_columns(dataset, columns)?;
            let chunks = validate_data_query(dataset, range)?;
            let methods = validate_part_query(dataset, shard_map, partitions, options)?;
            Ok(PhysicalPlan::DistributeConcat {
                methods,
                parallelism: options.parallelism,
                item_limit: options.item_limit,
                template: LocalPlanTemplate::ReadVectors {
                    columns: column_ids,
                    chunks,
                },
                gather: GatherMode::Concat,
            })
        }

        LogicalPlan::ReduceEach {
            function,
            args,
            child,
        } => {
            let (partitions, range, columns) = range_leaf(child)?;
            let spec = aggregate_spec(dataset, function, args, columns)?;
            let chunks = validate_data_query(dataset, range)?;
            let methods = validate_part_query(dataset, shard_map, partitions, options)?;
            Ok(PhysicalPlan::DistributeConcat {
                methods,
                parallelism: options.parallelism,
                item_limit: options.item_limit,
                template: LocalPlanTemplate::ShardAggregate { spec, chunks },
                gather: GatherMode::Concat,
            })
        }

        LogicalPlan::ReducePartitions {
            function,
            args,
            child,
        } => {
            let LogicalPlan::ReduceEach {
                function: agg_function,
                args: agg_args,
                child: leaf,
            } = child.as_ref()
            else {
                return Err(PlanError::UnsupportedPlan(format!(
                    "ReducePartitions over {}",
                    child.kind()
                ))
                .into());
            };
            let (partitions, range, columns) = range_leaf(leaf)?;
            let spec = aggregate_spec(dataset, agg_function, agg_args, columns)?;
            let combine = resolve_combiner(function, &spec, args)?;
            let chunks = validate_data_query(dataset, range)?;
            let methods = validate_part_query(dataset, shard_map, partitions, options)?;
            Ok(PhysicalPlan::DistributeConcat {
                methods,
                parallelism: options.parallelism,
                item_limit: options.item_limit,
                template: LocalPlanTemplate::ShardAggregate { spec, chunks },
                gather: GatherMode::Combine(combine),
            })
        }
    }
}

fn range_leaf(
    plan: &LogicalPlan,
) -> Result<
    (
        &crate::logical::PartitionQuery,
        &crate::logical::DataQuery,
        &[String],
    ),
    PlanError,
> {
    match plan {
        LogicalPlan::PartitionsRange {
            partitions,
            range,
            columns,
        } => Ok((partitions, range, columns)),
        other => Err(PlanError::UnsupportedPlan(format!(
            "aggregation over {}",
            other.kind()
        ))),
    }
}

fn aggregate_spec(
    dataset: &Dataset,
    function: &str,
    args: &[String],
    columns: &[String],
) -> TempoResult<crate::aggregate::AggregateSpec> {
    if columns.len() != 1 {
        return Err(PlanError::BadArgument(format!(
            "Only one column should be specified, but got {:?}",
            columns
        ))
        .into());
    }
    let ids = resolve_columns(dataset, columns)?;
    Ok(resolve_aggregator(dataset, function, args, ids[0])?)
}
