//! End-to-end coordinator scenarios against the in-memory store and the
//! in-process transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use tempo_common::config::{QueryConfig, QueryOptions};
use tempo_common::shard_map::{ShardEvent, ShardMap};
use tempo_common::types::{
    Column, ColumnType, Dataset, DatasetRef, NodeAddress, PartitionKey, ShardId,
};
use tempo_common::{CancelToken, ClusterError, PlanError, TempoError, TempoResult};
use tempo_coord::cluster::InProcessCluster;
use tempo_coord::protocol::{ShardReply, SingleShardQuery};
use tempo_coord::result::{decode_tuple, ColumnVector, QueryResultValue};
use tempo_coord::router::{QueryRouter, RouterHandle};
use tempo_coord::transport::{InProcessTransport, ShardTransport};
use tempo_planner::logical::{DataQuery, LogicalPlan, PartitionQuery};
use tempo_planner::physical::{GatherMode, LocalPlanTemplate, PhysicalPlan};
use tempo_storage::chunk::{CellValue, Row};
use tempo_storage::memstore::MemStore;
use tempo_storage::metastore::MetaStore;
use tempo_storage::store::ColumnStore;

fn dataset() -> Dataset {
    Dataset::new(
        DatasetRef::new("metrics"),
        vec![
            Column::new(0, "series", ColumnType::String),
            Column::new(1, "t", ColumnType::Timestamp),
            Column::new(2, "value", ColumnType::Double),
        ],
        &["series"],
        &["t"],
    )
    .unwrap()
}

fn sample(series: &str, t: i64, value: f64) -> Row {
    Row::new(
        t,
        vec![
            CellValue::Str(series.into()),
            CellValue::Timestamp(t),
            CellValue::Double(value),
        ],
    )
}

fn range_plan(start_ms: i64, end_ms: i64) -> LogicalPlan {
    LogicalPlan::PartitionsRange {
        partitions: PartitionQuery::All,
        range: DataQuery::TimeRange { start_ms, end_ms },
        columns: vec!["value".into()],
    }
}

fn reduce_each(function: &str, child: LogicalPlan) -> LogicalPlan {
    LogicalPlan::ReduceEach {
        function: function.into(),
        args: vec![],
        child: Box::new(child),
    }
}

fn reduce_partitions(function: &str, child: LogicalPlan) -> LogicalPlan {
    LogicalPlan::ReducePartitions {
        function: function.into(),
        args: vec![],
        child: Box::new(child),
    }
}

fn tuple_double(result: &QueryResultValue) -> f64 {
    let QueryResultValue::Tuple(t) = result else {
        panic!("expected tuple result, got {result:?}");
    };
    let cells = decode_tuple(&t.schema, &t.record).unwrap();
    let CellValue::Double(x) = cells[0] else {
        panic!("expected double cell, got {cells:?}");
    };
    x
}

/// One distinct partition key per shard, found by placement probing.
fn keys_per_shard(store: &MemStore, num_shards: u64) -> Vec<PartitionKey> {
    let mut found: Vec<Option<PartitionKey>> = vec![None; num_shards as usize];
    for i in 0.. {
        let key = PartitionKey::new(format!("host-{i}"));
        let shard = store.shard_of(&key).0 as usize;
        if found[shard].is_none() {
            found[shard] = Some(key);
            if found.iter().all(|k| k.is_some()) {
                break;
            }
        }
    }
    found.into_iter().map(|k| k.unwrap()).collect()
}

// ── Custom transports for fault and ordering scenarios ──────────────────────

/// Records which shards were asked for work before delegating.
struct RecordingTransport {
    inner: Arc<InProcessTransport>,
    seen: Arc<Mutex<Vec<ShardId>>>,
}

#[async_trait]
impl ShardTransport for RecordingTransport {
    async fn send_shard_query(
        &self,
        node: &NodeAddress,
        query: SingleShardQuery,
        cancel: CancelToken,
    ) -> TempoResult<ShardReply> {
        self.seen.lock().push(query.shard);
        self.inner.send_shard_query(node, query, cancel).await
    }
}

/// Delays each shard request so that higher shard ids complete first.
struct ReversingTransport {
    inner: Arc<InProcessTransport>,
    num_shards: u64,
}

#[async_trait]
impl ShardTransport for ReversingTransport {
    async fn send_shard_query(
        &self,
        node: &NodeAddress,
        query: SingleShardQuery,
        cancel: CancelToken,
    ) -> TempoResult<ShardReply> {
        let rank = self.num_shards - query.shard.0;
        tokio::time::sleep(Duration::from_millis(rank * 25)).await;
        self.inner.send_shard_query(node, query, cancel).await
    }
}

/// One node answers only after a long sleep.
struct SlowNodeTransport {
    inner: Arc<InProcessTransport>,
    slow_node: NodeAddress,
    delay: Duration,
}

#[async_trait]
impl ShardTransport for SlowNodeTransport {
    async fn send_shard_query(
        &self,
        node: &NodeAddress,
        query: SingleShardQuery,
        cancel: CancelToken,
    ) -> TempoResult<ShardReply> {
        if *node == self.slow_node {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.send_shard_query(node, query, cancel).await
    }
}

/// Fails the first N requests with NodeUnavailable, then delegates.
struct FlakyTransport {
    inner: Arc<InProcessTransport>,
    failures_left: Mutex<u32>,
}

#[async_trait]
impl ShardTransport for FlakyTransport {
    async fn send_shard_query(
        &self,
        node: &NodeAddress,
        query: SingleShardQuery,
        cancel: CancelToken,
    ) -> TempoResult<ShardReply> {
        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(ClusterError::NodeUnavailable(node.clone()).into());
            }
        }
        self.inner.send_shard_query(node, query, cancel).await
    }
}

/// A hand-wired cluster whose routers see a wrapped transport.
struct TestNet {
    store: Arc<MemStore>,
    nodes: Vec<RouterHandle>,
    dataset: Arc<Dataset>,
}

impl TestNet {
    async fn start(
        num_nodes: usize,
        num_shards: u64,
        wrap: impl FnOnce(Arc<InProcessTransport>) -> Arc<dyn ShardTransport>,
    ) -> TestNet {
        let metastore = Arc::new(MetaStore::new());
        metastore.create(dataset()).unwrap();
        let ds = metastore.get(&DatasetRef::new("metrics")).unwrap();
        let store = Arc::new(MemStore::new(num_shards));
        let inner = Arc::new(InProcessTransport::new());
        let transport = wrap(inner.clone());

        let mut nodes = Vec::new();
        for i in 0..num_nodes {
            let addr = NodeAddress::new(format!("node-{i}:8060"));
            let node_store: Arc<dyn ColumnStore> = store.clone();
            let handle = QueryRouter::spawn(
                addr.clone(),
                ds.dataset_ref().clone(),
                metastore.clone(),
                node_store,
                transport.clone(),
                QueryConfig::default(),
                256,
            );
            inner.register(addr, handle.clone());
            nodes.push(handle);
        }

        let mut map = ShardMap::new(ds.dataset_ref().clone(), num_shards);
        for shard in 0..num_shards {
            let owner = nodes[(shard as usize) % num_nodes].node().clone();
            map.set_active(ShardId(shard), owner);
        }
        for node in &nodes {
            node.shard_snapshot(map.clone()).await;
        }

        TestNet {
            store,
            nodes,
            dataset: ds,
        }
    }

    fn coordinator(&self) -> &RouterHandle {
        &self.nodes[0]
    }

    fn ingest(&self, key: &PartitionKey, rows: Vec<Row>) {
        self.store.ingest(&self.dataset, key.clone(), rows).unwrap();
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_instant_query_returns_last_sample_per_partition() {
    let cluster = InProcessCluster::start(dataset(), 1, 1, QueryConfig::default())
        .await
        .unwrap();
    for (series, last) in [("p1", 1.5), ("p2", 2.5), ("p3", 3.5)] {
        cluster
            .ingest(series, vec![sample(series, 1000, 0.0), sample(series, 2000, last)])
            .unwrap();
    }

    let response = cluster
        .coordinator()
        .logical_plan_query(
            LogicalPlan::PartitionsInstant {
                partitions: PartitionQuery::All,
                columns: vec!["value".into()],
            },
            None,
        )
        .await;
    let result = response.into_result().unwrap();
    let QueryResultValue::Vector(v) = result else {
        panic!("expected vector result");
    };
    assert_eq!(v.schema.len(), 1);
    assert_eq!(v.schema[0].name, "value");
    // Last sample of each partition, in partition-key order.
    assert_eq!(v.columns[0], ColumnVector::Double(vec![1.5, 2.5, 3.5]));

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_range_aggregation_combines_shard_partials() {
    let cluster = InProcessCluster::start(dataset(), 2, 4, QueryConfig::default())
        .await
        .unwrap();
    let keys = keys_per_shard(&cluster.store, 4);
    for (shard, key) in keys.iter().enumerate() {
        // In-range partial 2^shard, plus out-of-range noise.
        cluster
            .ingest(
                key.0.clone(),
                vec![
                    sample(&key.0, 1500, (1u32 << shard) as f64),
                    sample(&key.0, 5000, 100.0),
                ],
            )
            .unwrap();
    }

    let response = cluster
        .coordinator()
        .logical_plan_query(
            reduce_partitions("sum", reduce_each("sum", range_plan(1000, 2000))),
            None,
        )
        .await;
    let result = response.into_result().unwrap();
    assert_eq!(tuple_double(&result), 15.0);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_timeout_surfaces_within_deadline() {
    let net = TestNet::start(2, 2, |inner| {
        Arc::new(SlowNodeTransport {
            inner,
            slow_node: NodeAddress::new("node-1:8060"),
            delay: Duration::from_secs(10),
        })
    })
    .await;
    let keys = keys_per_shard(&net.store, 2);
    for key in &keys {
        net.ingest(key, vec![sample(&key.0, 1500, 1.0)]);
    }

    let started = Instant::now();
    let response = net
        .coordinator()
        .logical_plan_query(
            reduce_partitions("sum", reduce_each("sum", range_plan(1000, 2000))),
            Some(QueryOptions::default().with_timeout_secs(1)),
        )
        .await;
    let err = response.into_result().unwrap_err();
    assert_eq!(err, TempoError::Timeout);
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "timeout took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_unknown_column_fails_without_shard_requests() {
    let recorder: Arc<Mutex<Vec<ShardId>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = recorder.clone();
    let net = TestNet::start(1, 2, move |inner| {
        Arc::new(RecordingTransport { inner, seen })
    })
    .await;

    let response = net
        .coordinator()
        .logical_plan_query(
            LogicalPlan::PartitionsRange {
                partitions: PartitionQuery::All,
                range: DataQuery::AllChunks,
                columns: vec!["nope".into()],
            },
            None,
        )
        .await;
    let err = response.into_result().unwrap_err();
    assert_eq!(err, TempoError::Plan(PlanError::UnknownColumn("nope".into())));
    assert!(recorder.lock().is_empty());
}

#[tokio::test]
async fn test_wrong_arity_fails_without_shard_requests() {
    let cluster = InProcessCluster::start(dataset(), 1, 1, QueryConfig::default())
        .await
        .unwrap();
    let response = cluster
        .coordinator()
        .logical_plan_query(
            LogicalPlan::ReduceEach {
                function: "sum".into(),
                args: vec!["a".into(), "b".into()],
                child: Box::new(range_plan(0, 10)),
            },
            None,
        )
        .await;
    let err = response.into_result().unwrap_err();
    assert_eq!(
        err,
        TempoError::Plan(PlanError::WrongArity { given: 2, expected: 0 })
    );
    cluster.shutdown().await;
}

// ── Laws ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_shard_reduce_partitions_equals_reduce_each() {
    let cluster = InProcessCluster::start(dataset(), 1, 1, QueryConfig::default())
        .await
        .unwrap();
    cluster
        .ingest("only", vec![sample("only", 1200, 3.0), sample("only", 1300, 4.0)])
        .unwrap();

    let each = cluster
        .coordinator()
        .logical_plan_query(reduce_each("sum", range_plan(1000, 2000)), None)
        .await
        .into_result()
        .unwrap();
    let combined = cluster
        .coordinator()
        .logical_plan_query(
            reduce_partitions("sum", reduce_each("sum", range_plan(1000, 2000))),
            None,
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(each, combined);
    assert_eq!(tuple_double(&combined), 7.0);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_commutative_combine_is_order_independent() {
    let net = TestNet::start(1, 4, |inner| {
        Arc::new(ReversingTransport {
            inner,
            num_shards: 4,
        })
    })
    .await;
    let keys = keys_per_shard(&net.store, 4);
    for (shard, key) in keys.iter().enumerate() {
        net.ingest(key, vec![sample(&key.0, 1500, (shard + 1) as f64)]);
    }

    // Completion order is reversed by the transport; the sum is unaffected.
    let result = net
        .coordinator()
        .logical_plan_query(
            reduce_partitions("sum", reduce_each("sum", range_plan(1000, 2000))),
            None,
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(tuple_double(&result), 10.0);
}

#[tokio::test]
async fn test_non_commutative_combine_preserves_shard_order() {
    let net = TestNet::start(1, 4, |inner| {
        Arc::new(ReversingTransport {
            inner,
            num_shards: 4,
        })
    })
    .await;
    let keys = keys_per_shard(&net.store, 4);
    for (shard, key) in keys.iter().enumerate() {
        net.ingest(key, vec![sample(&key.0, 1500, (shard + 1) as f64)]);
    }

    // Even with reversed completion order, concat folds by ascending shard.
    let result = net
        .coordinator()
        .logical_plan_query(
            reduce_partitions("concat", reduce_each("sum", range_plan(1000, 2000))),
            None,
        )
        .await
        .into_result()
        .unwrap();
    let QueryResultValue::Vector(v) = result else {
        panic!("expected vector result");
    };
    assert_eq!(v.columns[0], ColumnVector::Double(vec![1.0, 2.0, 3.0, 4.0]));
}

// ── Invariants ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stopped_shard_receives_no_new_requests() {
    let cluster = InProcessCluster::start(dataset(), 2, 4, QueryConfig::default())
        .await
        .unwrap();
    let keys = keys_per_shard(&cluster.store, 4);
    for (shard, key) in keys.iter().enumerate() {
        cluster
            .ingest(key.0.clone(), vec![sample(&key.0, 1500, (1u32 << shard) as f64)])
            .unwrap();
    }

    cluster
        .broadcast_event(ShardEvent::Stopped { shard: ShardId(2) })
        .await;

    // Shard 2's partial (4.0) is omitted from the sum.
    let result = cluster
        .coordinator()
        .logical_plan_query(
            reduce_partitions("sum", reduce_each("sum", range_plan(1000, 2000))),
            None,
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(tuple_double(&result), 11.0);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_require_all_shards_rejects_stopped_shard() {
    let cluster = InProcessCluster::start(dataset(), 2, 4, QueryConfig::default())
        .await
        .unwrap();
    cluster
        .broadcast_event(ShardEvent::Stopped { shard: ShardId(1) })
        .await;

    let response = cluster
        .coordinator()
        .logical_plan_query(
            range_plan(1000, 2000),
            Some(QueryOptions::default().with_require_all_shards(true)),
        )
        .await;
    let err = response.into_result().unwrap_err();
    assert_eq!(err, TempoError::Cluster(ClusterError::ShardNotActive(ShardId(1))));

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_query_id_echoed_and_monotonic() {
    let cluster = InProcessCluster::start(dataset(), 1, 1, QueryConfig::default())
        .await
        .unwrap();
    cluster.ingest("a", vec![sample("a", 1000, 1.0)]).unwrap();

    let first = cluster
        .coordinator()
        .logical_plan_query(range_plan(0, 5000), None)
        .await;
    let second = cluster
        .coordinator()
        .logical_plan_query(
            LogicalPlan::PartitionsRange {
                partitions: PartitionQuery::All,
                range: DataQuery::AllChunks,
                columns: vec!["missing".into()],
            },
            None,
        )
        .await;
    assert!(first.query_id().0 > 0);
    // Errors echo a fresh id too.
    assert!(second.query_id().0 > first.query_id().0);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_retryable_node_failure_is_reattempted() {
    let net = TestNet::start(1, 2, |inner| {
        Arc::new(FlakyTransport {
            inner,
            failures_left: Mutex::new(2),
        })
    })
    .await;
    let keys = keys_per_shard(&net.store, 2);
    for key in &keys {
        net.ingest(key, vec![sample(&key.0, 1500, 5.0)]);
    }

    let result = net
        .coordinator()
        .logical_plan_query(
            reduce_partitions("sum", reduce_each("sum", range_plan(1000, 2000))),
            None,
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(tuple_double(&result), 10.0);
}

#[tokio::test]
async fn test_unreachable_node_fails_after_retries() {
    let cluster = InProcessCluster::start(dataset(), 2, 2, QueryConfig::default())
        .await
        .unwrap();
    let keys = keys_per_shard(&cluster.store, 2);
    for key in &keys {
        cluster
            .ingest(key.0.clone(), vec![sample(&key.0, 1500, 1.0)])
            .unwrap();
    }
    cluster
        .transport
        .deregister(&NodeAddress::new("node-1:8060"));

    let err = cluster
        .coordinator()
        .logical_plan_query(
            reduce_partitions("sum", reduce_each("sum", range_plan(1000, 2000))),
            None,
        )
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(
        err,
        TempoError::Cluster(ClusterError::NodeUnavailable(NodeAddress::new(
            "node-1:8060"
        )))
    );

    cluster.shutdown().await;
}

// ── Router lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_router_rejects_queries_before_shard_map() {
    let metastore = Arc::new(MetaStore::new());
    metastore.create(dataset()).unwrap();
    let store: Arc<dyn ColumnStore> = Arc::new(MemStore::new(1));
    let transport: Arc<dyn ShardTransport> = Arc::new(InProcessTransport::new());
    let handle = QueryRouter::spawn(
        NodeAddress::new("lonely:8060"),
        DatasetRef::new("metrics"),
        metastore,
        store,
        transport,
        QueryConfig::default(),
        16,
    );

    let err = handle
        .logical_plan_query(range_plan(0, 10), None)
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(err, TempoError::Cluster(ClusterError::NotReady));
}

#[tokio::test]
async fn test_shutdown_drains_and_stops() {
    let cluster = InProcessCluster::start(dataset(), 1, 1, QueryConfig::default())
        .await
        .unwrap();
    cluster.ingest("a", vec![sample("a", 1000, 1.0)]).unwrap();
    cluster.shutdown().await;

    let err = cluster
        .coordinator()
        .logical_plan_query(range_plan(0, 5000), None)
        .await
        .into_result()
        .unwrap_err();
    assert!(matches!(err, TempoError::Cluster(_)));
}

#[tokio::test]
async fn test_disconnected_client_cancels_query() {
    let net = TestNet::start(1, 1, |inner| {
        Arc::new(SlowNodeTransport {
            inner,
            slow_node: NodeAddress::new("node-0:8060"),
            delay: Duration::from_secs(30),
        })
    })
    .await;
    net.ingest(&PartitionKey::new("a"), vec![sample("a", 1000, 1.0)]);

    // Drop the reply future mid-flight, as a disconnecting client would.
    let pending = net
        .coordinator()
        .logical_plan_query(reduce_each("sum", range_plan(0, 5000)), None);
    tokio::select! {
        _ = pending => panic!("slow query should not complete"),
        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
    }

    // The in-flight guard is released on cancellation, so drain completes
    // promptly instead of waiting out the 30s sleep.
    tokio::time::timeout(Duration::from_secs(5), net.coordinator().shutdown())
        .await
        .expect("drain should complete after cancellation");
}

// ── ExecPlanQuery and metadata introspection ────────────────────────────────

#[tokio::test]
async fn test_exec_plan_query_skips_validation() {
    let cluster = InProcessCluster::start(dataset(), 1, 2, QueryConfig::default())
        .await
        .unwrap();
    let keys = keys_per_shard(&cluster.store, 2);
    for key in &keys {
        cluster
            .ingest(key.0.clone(), vec![sample(&key.0, 1000, 2.0)])
            .unwrap();
    }

    let plan = PhysicalPlan::DistributeConcat {
        methods: (0..2)
            .map(|s| tempo_common::types::PartitionScanMethod::FilteredPartition {
                shard: ShardId(s),
                predicate: tempo_common::types::PartitionPredicate::All,
            })
            .collect(),
        parallelism: 2,
        item_limit: 100,
        template: LocalPlanTemplate::StreamLastTuple {
            columns: vec![tempo_common::types::ColumnId(2)],
        },
        gather: GatherMode::Concat,
    };
    let result = cluster
        .coordinator()
        .exec_plan_query(plan, Some(10))
        .await
        .into_result()
        .unwrap();
    let QueryResultValue::Vector(v) = result else {
        panic!("expected vector result");
    };
    assert_eq!(v.columns[0].len(), 2);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_index_introspection() {
    let cluster = InProcessCluster::start(dataset(), 1, 1, QueryConfig::default())
        .await
        .unwrap();
    cluster.ingest("a", vec![sample("a", 1000, 1.0)]).unwrap();
    cluster.ingest("b", vec![sample("b", 1000, 1.0)]).unwrap();

    let names = cluster.coordinator().get_index_names(10).await.unwrap();
    assert_eq!(names, vec!["_partition_key_".to_string()]);

    let values = cluster
        .coordinator()
        .get_index_values("_partition_key_", 10)
        .await
        .unwrap();
    assert_eq!(values, vec!["a".to_string(), "b".to_string()]);

    // Truncation applies.
    let one = cluster
        .coordinator()
        .get_index_values("_partition_key_", 1)
        .await
        .unwrap();
    assert_eq!(one.len(), 1);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_item_limit_truncates_across_shards() {
    let cluster = InProcessCluster::start(dataset(), 1, 2, QueryConfig::default())
        .await
        .unwrap();
    for i in 0..10 {
        let key = format!("host-{i}");
        cluster
            .ingest(key.clone(), vec![sample(&key, 1000, i as f64)])
            .unwrap();
    }

    let result = cluster
        .coordinator()
        .logical_plan_query(
            LogicalPlan::PartitionsInstant {
                partitions: PartitionQuery::All,
                columns: vec!["value".into()],
            },
            Some(QueryOptions::default().with_item_limit(3)),
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(result.rows(), 3);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_histogram_aggregation_result_shape() {
    let cluster = InProcessCluster::start(dataset(), 1, 1, QueryConfig::default())
        .await
        .unwrap();
    cluster
        .ingest(
            "lat",
            vec![
                sample("lat", 1000, 0.5),
                sample("lat", 1001, 3.0),
                sample("lat", 1002, 50.0),
            ],
        )
        .unwrap();

    let result = cluster
        .coordinator()
        .logical_plan_query(
            LogicalPlan::ReduceEach {
                function: "histogram".into(),
                args: vec!["1.0".into(), "10.0".into()],
                child: Box::new(range_plan(0, 5000)),
            },
            None,
        )
        .await
        .into_result()
        .unwrap();
    let QueryResultValue::Vector(v) = result else {
        panic!("expected vector result");
    };
    assert_eq!(v.schema[0].name, "counts");
    assert_eq!(v.schema[1].name, "bucketMax");
    // 0.5 → first bucket, 3.0 → second, 50.0 → clamped into the top bucket.
    assert_eq!(v.columns[0], ColumnVector::Int(vec![1, 2]));
    assert_eq!(v.columns[1], ColumnVector::Double(vec![1.0, 10.0]));

    cluster.shutdown().await;
}
