//! The per-dataset query router: a single serial message handler owning the
//! shard map.
//!
//! The router is an owning task consuming a bounded mailbox; requests carry
//! a oneshot reply handle. Messages are processed in arrival order, so a
//! query dispatched after a `ShardEvent` observes that event. The router
//! never suspends on query execution: validation and planning run inline
//! (cheap, synchronous), then the engine or the shard executor is spawned
//! onto the runtime and replies through the request's channel.
//!
//! Lifecycle: `Initializing` (no shard map yet; queries fail with
//! `NotReady`) → `Ready` on the first snapshot → `Draining` on shutdown
//! (new queries rejected, in-flight complete) → `Stopped`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Notify};

use tempo_common::config::{QueryConfig, QueryOptions};
use tempo_common::shard_map::{ShardEvent, ShardMap};
use tempo_common::types::{Dataset, DatasetRef, NodeAddress, QueryId};
use tempo_common::{CancelToken, ClusterError, QueryTrace, TempoError, TempoResult};
use tempo_planner::logical::LogicalPlan;
use tempo_planner::physical::PhysicalPlan;
use tempo_planner::planner::plan_query;
use tempo_storage::metastore::MetaStore;
use tempo_storage::store::ColumnStore;

use crate::engine::Engine;
use crate::executor::ShardExecutor;
use crate::protocol::{QueryOutput, QueryResponse, ShardReply, SingleShardQuery};
use crate::result::{encode_output, self_check};
use crate::routing::SharedShardMap;
use crate::transport::ShardTransport;

/// Mailbox messages.
pub enum RouterCommand {
    LogicalPlanQuery {
        plan: LogicalPlan,
        options: Option<QueryOptions>,
        reply: oneshot::Sender<QueryResponse>,
    },
    ExecPlanQuery {
        plan: PhysicalPlan,
        item_limit: Option<usize>,
        reply: oneshot::Sender<QueryResponse>,
    },
    SingleShardQuery {
        query: SingleShardQuery,
        cancel: CancelToken,
        reply: oneshot::Sender<TempoResult<ShardReply>>,
    },
    GetIndexNames {
        limit: usize,
        reply: oneshot::Sender<TempoResult<Vec<String>>>,
    },
    GetIndexValues {
        index: String,
        limit: usize,
        reply: oneshot::Sender<TempoResult<Vec<String>>>,
    },
    CurrentShardSnapshot {
        map: ShardMap,
    },
    ShardEvent {
        event: ShardEvent,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    /// Internal: all in-flight work has completed after a Shutdown.
    Drained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterState {
    Initializing,
    Ready,
    Draining,
    Stopped,
}

/// Tracks queries handed to the execution pool so Draining can wait for
/// them.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    notify: Notify,
}

impl InFlight {
    fn guard(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self.clone())
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.count.fetch_sub(1, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }
}

/// Clonable handle to a router task.
#[derive(Clone)]
pub struct RouterHandle {
    node: NodeAddress,
    tx: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    pub fn node(&self) -> &NodeAddress {
        &self.node
    }

    fn gone(&self) -> TempoError {
        ClusterError::NodeUnavailable(self.node.clone()).into()
    }

    pub async fn logical_plan_query(
        &self,
        plan: LogicalPlan,
        options: Option<QueryOptions>,
    ) -> QueryResponse {
        let (reply, rx) = oneshot::channel();
        let cmd = RouterCommand::LogicalPlanQuery {
            plan,
            options,
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            return QueryResponse::Error {
                query_id: QueryId::NONE,
                error: self.gone(),
            };
        }
        rx.await.unwrap_or_else(|_| QueryResponse::Error {
            query_id: QueryId::NONE,
            error: self.gone(),
        })
    }

    pub async fn exec_plan_query(
        &self,
        plan: PhysicalPlan,
        item_limit: Option<usize>,
    ) -> QueryResponse {
        let (reply, rx) = oneshot::channel();
        let cmd = RouterCommand::ExecPlanQuery {
            plan,
            item_limit,
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            return QueryResponse::Error {
                query_id: QueryId::NONE,
                error: self.gone(),
            };
        }
        rx.await.unwrap_or_else(|_| QueryResponse::Error {
            query_id: QueryId::NONE,
            error: self.gone(),
        })
    }

    pub async fn single_shard_query(
        &self,
        query: SingleShardQuery,
        cancel: CancelToken,
    ) -> TempoResult<ShardReply> {
        let (reply, rx) = oneshot::channel();
        let cmd = RouterCommand::SingleShardQuery {
            query,
            cancel,
            reply,
        };
        self.tx.send(cmd).await.map_err(|_| self.gone())?;
        rx.await.map_err(|_| self.gone())?
    }

    pub async fn get_index_names(&self, limit: usize) -> TempoResult<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RouterCommand::GetIndexNames { limit, reply })
            .await
            .map_err(|_| self.gone())?;
        rx.await.map_err(|_| self.gone())?
    }

    pub async fn get_index_values(&self, index: &str, limit: usize) -> TempoResult<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RouterCommand::GetIndexValues {
                index: index.to_string(),
                limit,
                reply,
            })
            .await
            .map_err(|_| self.gone())?;
        rx.await.map_err(|_| self.gone())?
    }

    pub async fn shard_snapshot(&self, map: ShardMap) {
        let _ = self.tx.send(RouterCommand::CurrentShardSnapshot { map }).await;
    }

    pub async fn shard_event(&self, event: ShardEvent) {
        let _ = self.tx.send(RouterCommand::ShardEvent { event }).await;
    }

    /// Drain in-flight queries and stop the router.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(RouterCommand::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

pub struct QueryRouter {
    dataset_ref: DatasetRef,
    metastore: Arc<MetaStore>,
    store: Arc<dyn ColumnStore>,
    engine: Arc<Engine>,
    executor: Arc<ShardExecutor>,
    shard_map: Arc<SharedShardMap>,
    defaults: QueryConfig,
    state: RouterState,
    in_flight: Arc<InFlight>,
    self_tx: mpsc::Sender<RouterCommand>,
    drain_reply: Option<oneshot::Sender<()>>,
}

impl QueryRouter {
    /// Start a router task for one dataset on this node and return its
    /// handle.
    pub fn spawn(
        node: NodeAddress,
        dataset_ref: DatasetRef,
        metastore: Arc<MetaStore>,
        store: Arc<dyn ColumnStore>,
        transport: Arc<dyn ShardTransport>,
        defaults: QueryConfig,
        mailbox_capacity: usize,
    ) -> RouterHandle {
        let (tx, rx) = mpsc::channel(mailbox_capacity);
        let shard_map = Arc::new(SharedShardMap::new(ShardMap::new(dataset_ref.clone(), 0)));
        let router = QueryRouter {
            dataset_ref,
            metastore: metastore.clone(),
            store: store.clone(),
            engine: Arc::new(Engine::new(transport, shard_map.clone())),
            executor: Arc::new(ShardExecutor::new(metastore, store)),
            shard_map,
            defaults,
            state: RouterState::Initializing,
            in_flight: Arc::new(InFlight::default()),
            self_tx: tx.clone(),
            drain_reply: None,
        };
        let handle = RouterHandle {
            node: node.clone(),
            tx,
        };
        tokio::spawn(router.run(rx));
        tracing::info!(%node, "query router started");
        handle
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RouterCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                RouterCommand::LogicalPlanQuery {
                    plan,
                    options,
                    reply,
                } => self.handle_logical(plan, options, reply),
                RouterCommand::ExecPlanQuery {
                    plan,
                    item_limit,
                    reply,
                } => self.handle_exec(plan, item_limit, reply),
                RouterCommand::SingleShardQuery {
                    query,
                    cancel,
                    reply,
                } => self.handle_shard(query, cancel, reply),
                RouterCommand::GetIndexNames { limit, reply } => {
                    let _ = reply.send(self.index_names(limit));
                }
                RouterCommand::GetIndexValues {
                    index,
                    limit,
                    reply,
                } => {
                    let _ = reply.send(self.index_values(&index, limit));
                }
                RouterCommand::CurrentShardSnapshot { map } => {
                    if self.shard_map.apply_snapshot(map) && self.state == RouterState::Initializing
                    {
                        tracing::info!(dataset = %self.dataset_ref, "shard map received, router ready");
                        self.state = RouterState::Ready;
                    }
                }
                RouterCommand::ShardEvent { event } => {
                    self.shard_map.apply_event(&event);
                }
                RouterCommand::Shutdown { reply } => {
                    tracing::info!(dataset = %self.dataset_ref, "router draining");
                    self.state = RouterState::Draining;
                    self.drain_reply = Some(reply);
                    let in_flight = self.in_flight.clone();
                    let tx = self.self_tx.clone();
                    tokio::spawn(async move {
                        in_flight.wait_idle().await;
                        let _ = tx.send(RouterCommand::Drained).await;
                    });
                }
                RouterCommand::Drained => {
                    self.state = RouterState::Stopped;
                    if let Some(reply) = self.drain_reply.take() {
                        let _ = reply.send(());
                    }
                    break;
                }
            }
        }
        tracing::info!(dataset = %self.dataset_ref, "query router stopped");
    }

    fn reject(&self, query_id: QueryId) -> Option<TempoError> {
        match self.state {
            RouterState::Initializing => Some(ClusterError::NotReady.into()),
            RouterState::Draining | RouterState::Stopped => Some(ClusterError::Draining.into()),
            RouterState::Ready => None,
        }
        .map(|e: TempoError| {
            tracing::debug!(query_id = query_id.0, state = ?self.state, "query rejected");
            e
        })
    }

    fn handle_logical(
        &mut self,
        plan: LogicalPlan,
        options: Option<QueryOptions>,
        reply: oneshot::Sender<QueryResponse>,
    ) {
        let query_id = QueryId::next();
        if let Some(error) = self.reject(query_id) {
            let _ = reply.send(QueryResponse::Error { query_id, error });
            return;
        }
        let options = options.unwrap_or_else(|| QueryOptions::from(&self.defaults));
        let trace = QueryTrace::begin(query_id, self.dataset_ref.clone(), plan.kind());

        let dataset = match self.metastore.get(&self.dataset_ref) {
            Ok(d) => d,
            Err(e) => {
                let error: TempoError = e.into();
                trace.finish_err(&error);
                let _ = reply.send(QueryResponse::Error { query_id, error });
                return;
            }
        };

        // Validation and planning are synchronous and cheap; they run on the
        // router task against the snapshot taken for this dispatch.
        let snapshot = self.shard_map.snapshot();
        match plan_query(&dataset, &snapshot, &plan, &options) {
            Ok(physical) => self.dispatch(query_id, dataset, physical, options, trace, reply),
            Err(error) => {
                trace.finish_err(&error);
                let _ = reply.send(QueryResponse::Error { query_id, error });
            }
        }
    }

    fn handle_exec(
        &mut self,
        plan: PhysicalPlan,
        item_limit: Option<usize>,
        reply: oneshot::Sender<QueryResponse>,
    ) {
        let query_id = QueryId::next();
        if let Some(error) = self.reject(query_id) {
            let _ = reply.send(QueryResponse::Error { query_id, error });
            return;
        }
        let mut options = QueryOptions::from(&self.defaults);
        if let Some(limit) = item_limit {
            options.item_limit = limit;
        }
        let trace = QueryTrace::begin(query_id, self.dataset_ref.clone(), "exec_plan");
        let dataset = match self.metastore.get(&self.dataset_ref) {
            Ok(d) => d,
            Err(e) => {
                let error: TempoError = e.into();
                trace.finish_err(&error);
                let _ = reply.send(QueryResponse::Error { query_id, error });
                return;
            }
        };
        self.dispatch(query_id, dataset, plan, options, trace, reply);
    }

    /// Hand a compiled plan to the execution pool. The router itself never
    /// awaits the query.
    fn dispatch(
        &self,
        query_id: QueryId,
        dataset: Arc<Dataset>,
        plan: PhysicalPlan,
        options: QueryOptions,
        trace: QueryTrace,
        reply: oneshot::Sender<QueryResponse>,
    ) {
        let engine = self.engine.clone();
        let dataset_ref = self.dataset_ref.clone();
        let cancel = CancelToken::new();
        let guard = self.in_flight.guard();
        tokio::spawn(async move {
            let _guard = guard;
            let mut reply = reply;
            let exec = async {
                let output: QueryOutput = engine
                    .execute(query_id, &dataset_ref, &plan, &options, cancel.clone())
                    .await?;
                encode_output(&dataset, &plan, output)
            };
            // A dropped reply channel is a disconnected client: cancel the
            // query and make sure nothing is delivered afterwards.
            let outcome = tokio::select! {
                _ = reply.closed() => None,
                result = exec => Some(result),
            };
            match outcome {
                None => {
                    cancel.cancel();
                    trace.finish_err(&TempoError::Cancelled);
                }
                Some(Ok(result)) => {
                    if options.test_query_serialization {
                        self_check(&result);
                    }
                    trace.finish_ok(result.rows());
                    let _ = reply.send(QueryResponse::Result { query_id, result });
                }
                Some(Err(error)) => {
                    trace.finish_err(&error);
                    let _ = reply.send(QueryResponse::Error { query_id, error });
                }
            }
        });
    }

    /// Shard-side requests belong to queries already in flight on some
    /// coordinator, so Draining still serves them; only a stopped router
    /// refuses.
    fn handle_shard(
        &self,
        query: SingleShardQuery,
        cancel: CancelToken,
        reply: oneshot::Sender<TempoResult<ShardReply>>,
    ) {
        if self.state == RouterState::Stopped {
            let _ = reply.send(Err(ClusterError::Draining.into()));
            return;
        }
        let executor = self.executor.clone();
        let guard = self.in_flight.guard();
        tokio::spawn(async move {
            let _guard = guard;
            let result = executor.execute(&query, &cancel).await;
            let _ = reply.send(result);
        });
    }

    fn index_names(&self, limit: usize) -> TempoResult<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .index_names(&self.dataset_ref)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.truncate(limit);
        Ok(names)
    }

    /// Values are probed from the first active shard only.
    fn index_values(&self, index: &str, limit: usize) -> TempoResult<Vec<String>> {
        let snapshot = self.shard_map.snapshot();
        let Some(shard) = snapshot.active_shards().first().copied() else {
            return Ok(Vec::new());
        };
        Ok(self.store.index_values(&self.dataset_ref, shard, index, limit))
    }
}
