//! Scatter/gather execution of physical plans.
//!
//! Methods are grouped into one scatter request per shard. At most
//! `options.parallelism` requests are in flight; as one completes the next
//! is submitted. Concat gather preserves (shard id asc, submission order)
//! and stops accepting elements once the item limit is covered, cancelling
//! the rest. Retriable shard failures are re-routed via a fresh shard-map
//! snapshot up to three retries; the first non-retriable error wins and
//! cancels everything else. The global deadline cancels all in-flight
//! requests and surfaces `Timeout`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use tempo_common::config::QueryOptions;
use tempo_common::shard_map::ShardStatus;
use tempo_common::types::{DatasetRef, PartitionScanMethod, QueryId, ShardId};
use tempo_common::{CancelToken, ClusterError, TempoError, TempoResult};
use tempo_planner::aggregate::{combiner, Aggregate, Combiner};
use tempo_planner::physical::{GatherMode, LocalPlanTemplate, PhysicalPlan};

use crate::protocol::{QueryOutput, ShardItem, ShardReply, SingleShardQuery};
use crate::routing::SharedShardMap;
use crate::transport::ShardTransport;

/// Initial attempt plus up to three re-routed retries per shard.
const MAX_SHARD_ATTEMPTS: u32 = 4;
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Per-query scatter/gather observability counters.
#[derive(Debug, Clone, Default)]
pub struct ScatterMetrics {
    pub shards_participated: usize,
    pub items_gathered: usize,
    pub retries: u32,
    pub total_latency_us: u64,
}

pub struct Engine {
    transport: Arc<dyn ShardTransport>,
    shard_map: Arc<SharedShardMap>,
}

struct Slot {
    shard: ShardId,
    methods: Vec<PartitionScanMethod>,
    attempts: u32,
    items: Option<Vec<ShardItem>>,
}

#[derive(Clone)]
struct ScatterCtx {
    transport: Arc<dyn ShardTransport>,
    shard_map: Arc<SharedShardMap>,
    template: LocalPlanTemplate,
    dataset: DatasetRef,
    query_id: QueryId,
    item_limit: usize,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(transport: Arc<dyn ShardTransport>, shard_map: Arc<SharedShardMap>) -> Self {
        Engine {
            transport,
            shard_map,
        }
    }

    /// Execute a physical plan under the query's deadline.
    pub async fn execute(
        &self,
        query_id: QueryId,
        dataset: &DatasetRef,
        plan: &PhysicalPlan,
        options: &QueryOptions,
        cancel: CancelToken,
    ) -> TempoResult<QueryOutput> {
        match tokio::time::timeout(
            options.timeout(),
            self.scatter_gather(query_id, dataset, plan, options, cancel.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                tracing::warn!(query_id = query_id.0, "query deadline expired");
                Err(TempoError::Timeout)
            }
        }
    }

    async fn scatter_gather(
        &self,
        query_id: QueryId,
        dataset: &DatasetRef,
        plan: &PhysicalPlan,
        options: &QueryOptions,
        cancel: CancelToken,
    ) -> TempoResult<QueryOutput> {
        let started = Instant::now();
        let (methods, parallelism, item_limit, template, gather) = match plan {
            PhysicalPlan::DistributeConcat {
                methods,
                parallelism,
                item_limit,
                template,
                gather,
            } => (
                methods.clone(),
                (*parallelism).max(1),
                *item_limit,
                template.clone(),
                gather.clone(),
            ),
            PhysicalPlan::Local(local) => (
                vec![local.method.clone()],
                1,
                options.item_limit,
                local.template.clone(),
                GatherMode::Concat,
            ),
        };

        // One scatter request per shard, ascending shard id; method order
        // within a shard is submission order.
        let mut by_shard: BTreeMap<ShardId, Vec<PartitionScanMethod>> = BTreeMap::new();
        for method in methods {
            by_shard.entry(method.shard()).or_default().push(method);
        }
        let mut slots: Vec<Slot> = by_shard
            .into_iter()
            .map(|(shard, methods)| Slot {
                shard,
                methods,
                attempts: 0,
                items: None,
            })
            .collect();

        let comb: Option<&'static dyn Combiner> = match &gather {
            GatherMode::Concat => None,
            GatherMode::Combine(spec) => Some(combiner(&spec.function).ok_or_else(|| {
                TempoError::internal(format!("combiner {} missing from registry", spec.function))
            })?),
        };

        if slots.is_empty() {
            return Ok(match comb {
                None => QueryOutput::Items(Vec::new()),
                Some(c) => QueryOutput::Combined(c.zero()),
            });
        }

        let ctx = ScatterCtx {
            transport: self.transport.clone(),
            shard_map: self.shard_map.clone(),
            template,
            dataset: dataset.clone(),
            query_id,
            item_limit,
            cancel: cancel.clone(),
        };

        let mut join: JoinSet<(usize, TempoResult<ShardReply>)> = JoinSet::new();
        let mut next_slot = 0;
        while next_slot < slots.len().min(parallelism) {
            spawn_shard_task(&mut join, next_slot, &mut slots[next_slot], &ctx);
            next_slot += 1;
        }

        let mut retries = 0u32;
        let mut completed = 0usize;
        let mut running_fold: Aggregate = comb.map(|c| c.zero()).unwrap_or(Aggregate::Empty);
        let mut ordered_partials: Vec<(ShardId, Aggregate)> = Vec::new();

        while let Some(joined) = join.join_next().await {
            let (idx, result) = joined
                .map_err(|e| TempoError::internal(format!("scatter task failed: {e}")))?;
            match result {
                Err(e) if e.is_retryable() && slots[idx].attempts < MAX_SHARD_ATTEMPTS => {
                    retries += 1;
                    tracing::debug!(
                        query_id = query_id.0,
                        shard = %slots[idx].shard,
                        attempt = slots[idx].attempts,
                        "re-routing shard request after retryable failure: {}",
                        e
                    );
                    spawn_shard_task(&mut join, idx, &mut slots[idx], &ctx);
                }
                Err(e) => {
                    // First non-retriable error wins; cancel the rest.
                    cancel.cancel();
                    join.abort_all();
                    tracing::debug!(
                        query_id = query_id.0,
                        shard = %slots[idx].shard,
                        "shard request failed: {}",
                        e
                    );
                    return Err(e);
                }
                Ok(reply) => {
                    completed += 1;
                    match comb {
                        None => {
                            slots[idx].items = Some(reply.items);
                            if covered_prefix(&slots) >= item_limit {
                                cancel.cancel();
                                join.abort_all();
                                break;
                            }
                        }
                        Some(c) if c.commutative() && c.associative() => {
                            for agg in take_aggregates(reply)? {
                                running_fold = c.combine(running_fold, agg)?;
                            }
                        }
                        Some(_) => {
                            let shard = slots[idx].shard;
                            for agg in take_aggregates(reply)? {
                                ordered_partials.push((shard, agg));
                            }
                        }
                    }
                    if next_slot < slots.len() {
                        spawn_shard_task(&mut join, next_slot, &mut slots[next_slot], &ctx);
                        next_slot += 1;
                    }
                }
            }
        }

        let output = match comb {
            None => {
                let mut items: Vec<ShardItem> = slots
                    .iter_mut()
                    .filter_map(|s| s.items.take())
                    .flatten()
                    .collect();
                items.truncate(item_limit);
                QueryOutput::Items(items)
            }
            Some(c) if c.commutative() && c.associative() => QueryOutput::Combined(running_fold),
            Some(c) => {
                // Non-commutative combiners fold in ascending shard order.
                ordered_partials.sort_by_key(|(shard, _)| *shard);
                let mut acc = c.zero();
                for (_, agg) in ordered_partials {
                    acc = c.combine(acc, agg)?;
                }
                QueryOutput::Combined(acc)
            }
        };

        let metrics = ScatterMetrics {
            shards_participated: completed,
            items_gathered: match &output {
                QueryOutput::Items(items) => items.len(),
                QueryOutput::Combined(_) => 1,
            },
            retries,
            total_latency_us: started.elapsed().as_micros() as u64,
        };
        tracing::debug!(
            query_id = query_id.0,
            shards = metrics.shards_participated,
            items = metrics.items_gathered,
            retries = metrics.retries,
            elapsed_us = metrics.total_latency_us,
            "scatter/gather complete"
        );
        Ok(output)
    }
}

/// Items already emittable: the sum over the longest prefix of completed
/// slots in shard order. Later completions cannot contribute earlier items,
/// so once this covers the limit the rest can be cancelled.
fn covered_prefix(slots: &[Slot]) -> usize {
    let mut covered = 0;
    for slot in slots {
        match &slot.items {
            Some(items) => covered += items.len(),
            None => break,
        }
    }
    covered
}

fn take_aggregates(reply: ShardReply) -> TempoResult<Vec<Aggregate>> {
    reply
        .items
        .into_iter()
        .map(|item| match item {
            ShardItem::Aggregate(agg) => Ok(agg),
            other => Err(TempoError::internal(format!(
                "combine gather received non-aggregate item {:?}",
                other
            ))),
        })
        .collect()
}

fn spawn_shard_task(
    join: &mut JoinSet<(usize, TempoResult<ShardReply>)>,
    idx: usize,
    slot: &mut Slot,
    ctx: &ScatterCtx,
) {
    slot.attempts += 1;
    let attempt = slot.attempts;
    let shard = slot.shard;
    let methods = slot.methods.clone();
    let ctx = ctx.clone();
    join.spawn(async move {
        if attempt > 1 {
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
        // Resolve the owner from the freshest snapshot at (re-)submission.
        let snapshot = ctx.shard_map.snapshot();
        let node = match snapshot.active_owner(shard) {
            Some(node) => node.clone(),
            None => {
                let err = match snapshot.status(shard) {
                    ShardStatus::Recovering => ClusterError::ShardRecovering(shard),
                    _ => ClusterError::ShardNotActive(shard),
                };
                return (idx, Err(err.into()));
            }
        };
        let query = SingleShardQuery {
            query_id: ctx.query_id,
            dataset: ctx.dataset.clone(),
            shard,
            template: ctx.template.clone(),
            methods,
            item_limit: ctx.item_limit,
        };
        let result = ctx
            .transport
            .send_shard_query(&node, query, ctx.cancel.clone())
            .await;
        (idx, result)
    });
}
