//! Plan compilation for the TempoDB query coordinator: logical and physical
//! plan trees, the validator, the rule-based planner, and the
//! aggregator/combiner registry.

pub mod aggregate;
pub mod logical;
pub mod physical;
pub mod planner;
pub mod validate;

pub use aggregate::{
    aggregator_factory, build_aggregator, combiner, Aggregate, AggregateSpec, Aggregator,
    AggregatorFactory, Cardinality, Combiner, FoldStatus, ResultClass,
};
pub use logical::{DataQuery, LogicalPlan, PartitionQuery};
pub use physical::{CombineSpec, GatherMode, LocalPlan, LocalPlanTemplate, PhysicalPlan};
pub use planner::plan_query;
