//! Physical plans: what the engine actually executes. Unlike the logical
//! tree, everything here is fully resolved (column ids, shard-pinned scan
//! methods, aggregate specs) and serializable, so `ExecPlanQuery` can carry
//! a plan in a message and the shard side can re-derive its work from it.

use serde::{Deserialize, Serialize};

use tempo_common::types::{ChunkScanMethod, ColumnId, PartitionScanMethod, ShardId};

use crate::aggregate::AggregateSpec;

/// Cross-partition combine step applied by the engine during gather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombineSpec {
    pub function: String,
    pub args: Vec<String>,
}

/// How the engine merges shard replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatherMode {
    /// Concatenate shard items in (shard id asc, submission order).
    Concat,
    /// Fold shard partials through a combiner.
    Combine(CombineSpec),
}

/// The per-shard work shape, instantiated once per scatter target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalPlanTemplate {
    /// Stream the selected columns of every matching row.
    ReadVectors {
        columns: Vec<ColumnId>,
        chunks: ChunkScanMethod,
    },
    /// Most-recent sample per partition.
    StreamLastTuple { columns: Vec<ColumnId> },
    /// Fold matching rows through an aggregator, emitting one partial.
    ShardAggregate {
        spec: AggregateSpec,
        chunks: ChunkScanMethod,
    },
}

impl LocalPlanTemplate {
    /// Columns the scan must project.
    pub fn columns(&self) -> Vec<ColumnId> {
        match self {
            LocalPlanTemplate::ReadVectors { columns, .. }
            | LocalPlanTemplate::StreamLastTuple { columns } => columns.clone(),
            LocalPlanTemplate::ShardAggregate { spec, .. } => vec![spec.column],
        }
    }

    pub fn chunk_scan(&self) -> ChunkScanMethod {
        match self {
            LocalPlanTemplate::ReadVectors { chunks, .. }
            | LocalPlanTemplate::ShardAggregate { chunks, .. } => *chunks,
            LocalPlanTemplate::StreamLastTuple { .. } => ChunkScanMethod::MostRecent,
        }
    }
}

/// A local reader pinned to one shard, executable without further planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPlan {
    pub template: LocalPlanTemplate,
    pub method: PartitionScanMethod,
}

/// Physical plan. Lives only for the duration of `Engine::execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhysicalPlan {
    /// Scatter the template across the shards pinned by `methods`, gather
    /// with bounded parallelism, stop after `item_limit` items.
    DistributeConcat {
        methods: Vec<PartitionScanMethod>,
        parallelism: usize,
        item_limit: usize,
        template: LocalPlanTemplate,
        gather: GatherMode,
    },
    /// A single-shard local read, as shipped by `ExecPlanQuery`.
    Local(LocalPlan),
}

impl PhysicalPlan {
    /// Distinct shards this plan touches, ascending.
    pub fn shards(&self) -> Vec<ShardId> {
        let mut shards: Vec<ShardId> = match self {
            PhysicalPlan::DistributeConcat { methods, .. } => {
                methods.iter().map(|m| m.shard()).collect()
            }
            PhysicalPlan::Local(local) => vec![local.method.shard()],
        };
        shards.sort();
        shards.dedup();
        shards
    }

    pub fn template(&self) -> &LocalPlanTemplate {
        match self {
            PhysicalPlan::DistributeConcat { template, .. } => template,
            PhysicalPlan::Local(local) => &local.template,
        }
    }

    pub fn gather(&self) -> &GatherMode {
        static CONCAT: GatherMode = GatherMode::Concat;
        match self {
            PhysicalPlan::DistributeConcat { gather, .. } => gather,
            PhysicalPlan::Local(_) => &CONCAT,
        }
    }
}
