//! Aggregators and combiners.
//!
//! An aggregator is a stateful fold over column chunks on one shard; a
//! combiner merges two shard partials. Both are looked up by case-folded
//! name in a static registry and expose a small capability set instead of a
//! dispatch hierarchy: fold/finalize plus advertised result class,
//! cardinality, and width.

use serde::{Deserialize, Serialize};

use tempo_common::types::{Column, ColumnId, ColumnType, Dataset};
use tempo_common::{PlanError, TempoError, TempoResult};
use tempo_storage::chunk::{ColumnChunk, HistogramSample};

/// Value class of an aggregation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultClass {
    Int,
    Long,
    Double,
    Histogram,
}

/// How many values the aggregator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// Whether the fold wants more chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldStatus {
    Continue,
    Done,
}

/// A per-shard partial aggregate. `Empty` is the fold identity: combining
/// it with any partial yields that partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    Empty,
    Int(i32),
    Long(i64),
    Double(f64),
    Doubles(Vec<f64>),
    Histogram {
        bucket_max: Vec<f64>,
        counts: Vec<i32>,
    },
}

/// Fully resolved aggregation step, embedded in physical plans. The shard
/// side rebuilds the aggregator from this against its own dataset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub function: String,
    pub args: Vec<String>,
    pub column: ColumnId,
    pub result_class: ResultClass,
    pub cardinality: Cardinality,
    pub wide: bool,
}

/// Stateful fold over one column's chunks. State is owned by exactly one
/// shard executor invocation and destroyed when the partial is emitted.
pub trait Aggregator: Send + std::fmt::Debug {
    fn fold_chunk(&mut self, chunk: &ColumnChunk) -> TempoResult<FoldStatus>;
    fn finalize(self: Box<Self>) -> Aggregate;
}

/// Factory for one aggregation function.
pub trait AggregatorFactory: Sync {
    fn name(&self) -> &'static str;

    /// Number of arguments beyond the aggregated column.
    fn arity(&self) -> usize;

    /// Validate the argument count. `histogram` overrides this to accept a
    /// variable bucket list.
    fn check_arity(&self, given: usize) -> Result<(), PlanError> {
        if given != self.arity() {
            return Err(PlanError::WrongArity {
                given,
                expected: self.arity(),
            });
        }
        Ok(())
    }

    /// Advertised (result class, cardinality, wide) for the given column, or
    /// a `BadArgument` if the column type is incompatible.
    fn resolve(&self, column: &Column) -> Result<(ResultClass, Cardinality, bool), PlanError>;

    fn build(&self, column: &Column, args: &[String]) -> Result<Box<dyn Aggregator>, PlanError>;
}

/// Binary merge of two shard partials. Combiners advertise associativity
/// and commutativity; non-commutative combiners are folded in shard order.
pub trait Combiner: Sync {
    fn name(&self) -> &'static str;
    fn commutative(&self) -> bool;
    fn associative(&self) -> bool {
        true
    }
    fn zero(&self) -> Aggregate {
        Aggregate::Empty
    }
    fn combine(&self, a: Aggregate, b: Aggregate) -> TempoResult<Aggregate>;
}

// ── Registry ────────────────────────────────────────────────────────────────

static COUNT: CountFactory = CountFactory;
static SUM: SumFactory = SumFactory;
static MIN: MinMaxFactory = MinMaxFactory { min: true };
static MAX: MinMaxFactory = MinMaxFactory { min: false };
static TOPK: TopKFactory = TopKFactory;
static HISTOGRAM: HistogramFactory = HistogramFactory;
static HISTMERGE: HistMergeFactory = HistMergeFactory;

/// Look up an aggregator factory. Matching is case-insensitive.
pub fn aggregator_factory(name: &str) -> Option<&'static dyn AggregatorFactory> {
    match name.to_ascii_lowercase().as_str() {
        "count" => Some(&COUNT),
        "sum" => Some(&SUM),
        "min" => Some(&MIN),
        "max" => Some(&MAX),
        "topk" => Some(&TOPK),
        "histogram" => Some(&HISTOGRAM),
        "histmerge" => Some(&HISTMERGE),
        _ => None,
    }
}

static SUM_COMBINER: SumCombiner = SumCombiner;
static MIN_COMBINER: MinMaxCombiner = MinMaxCombiner { min: true };
static MAX_COMBINER: MinMaxCombiner = MinMaxCombiner { min: false };
static CONCAT_COMBINER: ConcatCombiner = ConcatCombiner;

/// Look up a combiner. Matching is case-insensitive.
pub fn combiner(name: &str) -> Option<&'static dyn Combiner> {
    match name.to_ascii_lowercase().as_str() {
        "sum" => Some(&SUM_COMBINER),
        "min" => Some(&MIN_COMBINER),
        "max" => Some(&MAX_COMBINER),
        "concat" => Some(&CONCAT_COMBINER),
        _ => None,
    }
}

/// Rebuild the aggregator for a spec against a (possibly different) dataset
/// version. Used by the shard side, which never trusts the caller's
/// validation.
pub fn build_aggregator(
    dataset: &Dataset,
    spec: &AggregateSpec,
) -> Result<Box<dyn Aggregator>, TempoError> {
    let column = dataset
        .column(spec.column)
        .ok_or_else(|| PlanError::UnknownColumn(spec.column.to_string()))?;
    let factory = aggregator_factory(&spec.function)
        .ok_or_else(|| PlanError::NoSuchFunction(spec.function.clone()))?;
    factory.check_arity(spec.args.len())?;
    factory.resolve(column)?;
    Ok(factory.build(column, &spec.args)?)
}

// ── count ───────────────────────────────────────────────────────────────────

struct CountFactory;

impl AggregatorFactory for CountFactory {
    fn name(&self) -> &'static str {
        "count"
    }

    fn arity(&self) -> usize {
        0
    }

    fn resolve(&self, _column: &Column) -> Result<(ResultClass, Cardinality, bool), PlanError> {
        Ok((ResultClass::Long, Cardinality::One, true))
    }

    fn build(&self, _column: &Column, _args: &[String]) -> Result<Box<dyn Aggregator>, PlanError> {
        Ok(Box::new(CountAggregator { rows: 0 }))
    }
}

#[derive(Debug)]
struct CountAggregator {
    rows: u64,
}

impl Aggregator for CountAggregator {
    fn fold_chunk(&mut self, chunk: &ColumnChunk) -> TempoResult<FoldStatus> {
        self.rows += chunk.len() as u64;
        Ok(FoldStatus::Continue)
    }

    fn finalize(self: Box<Self>) -> Aggregate {
        Aggregate::Long(self.rows as i64)
    }
}

// ── sum ─────────────────────────────────────────────────────────────────────

fn numeric_class(column: &Column, function: &str) -> Result<ResultClass, PlanError> {
    match column.column_type {
        ColumnType::Int => Ok(ResultClass::Int),
        ColumnType::Long | ColumnType::Timestamp => Ok(ResultClass::Long),
        ColumnType::Double => Ok(ResultClass::Double),
        other => Err(PlanError::BadArgument(format!(
            "{} is not defined over {} column {}",
            function, other, column.name
        ))),
    }
}

struct SumFactory;

impl AggregatorFactory for SumFactory {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn arity(&self) -> usize {
        0
    }

    fn resolve(&self, column: &Column) -> Result<(ResultClass, Cardinality, bool), PlanError> {
        Ok((numeric_class(column, "sum")?, Cardinality::One, false))
    }

    fn build(&self, column: &Column, _args: &[String]) -> Result<Box<dyn Aggregator>, PlanError> {
        Ok(Box::new(SumAggregator {
            class: numeric_class(column, "sum")?,
            int_acc: 0,
            double_acc: 0.0,
        }))
    }
}

#[derive(Debug)]
struct SumAggregator {
    class: ResultClass,
    int_acc: i64,
    double_acc: f64,
}

impl Aggregator for SumAggregator {
    fn fold_chunk(&mut self, chunk: &ColumnChunk) -> TempoResult<FoldStatus> {
        match chunk {
            ColumnChunk::Int(v) => self.int_acc += v.iter().map(|x| *x as i64).sum::<i64>(),
            ColumnChunk::Long(v) | ColumnChunk::Timestamp(v) => {
                self.int_acc += v.iter().sum::<i64>()
            }
            ColumnChunk::Double(v) => self.double_acc += v.iter().sum::<f64>(),
            other => {
                return Err(TempoError::internal(format!(
                    "sum fold over {} chunk",
                    other.column_type()
                )))
            }
        }
        Ok(FoldStatus::Continue)
    }

    fn finalize(self: Box<Self>) -> Aggregate {
        match self.class {
            ResultClass::Int => {
                Aggregate::Int(self.int_acc.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            }
            ResultClass::Long => Aggregate::Long(self.int_acc),
            _ => Aggregate::Double(self.double_acc),
        }
    }
}

// ── min / max ───────────────────────────────────────────────────────────────

struct MinMaxFactory {
    min: bool,
}

impl MinMaxFactory {
    fn label(&self) -> &'static str {
        if self.min {
            "min"
        } else {
            "max"
        }
    }
}

impl AggregatorFactory for MinMaxFactory {
    fn name(&self) -> &'static str {
        self.label()
    }

    fn arity(&self) -> usize {
        0
    }

    fn resolve(&self, column: &Column) -> Result<(ResultClass, Cardinality, bool), PlanError> {
        Ok((numeric_class(column, self.label())?, Cardinality::One, false))
    }

    fn build(&self, column: &Column, _args: &[String]) -> Result<Box<dyn Aggregator>, PlanError> {
        Ok(Box::new(MinMaxAggregator {
            min: self.min,
            class: numeric_class(column, self.label())?,
            int_acc: None,
            double_acc: None,
        }))
    }
}

#[derive(Debug)]
struct MinMaxAggregator {
    min: bool,
    class: ResultClass,
    int_acc: Option<i64>,
    double_acc: Option<f64>,
}

impl MinMaxAggregator {
    fn note_int(&mut self, x: i64) {
        self.int_acc = Some(match self.int_acc {
            None => x,
            Some(acc) if self.min => acc.min(x),
            Some(acc) => acc.max(x),
        });
    }

    fn note_double(&mut self, x: f64) {
        self.double_acc = Some(match self.double_acc {
            None => x,
            Some(acc) if self.min => acc.min(x),
            Some(acc) => acc.max(x),
        });
    }
}

impl Aggregator for MinMaxAggregator {
    fn fold_chunk(&mut self, chunk: &ColumnChunk) -> TempoResult<FoldStatus> {
        match chunk {
            ColumnChunk::Int(v) => v.iter().for_each(|x| self.note_int(*x as i64)),
            ColumnChunk::Long(v) | ColumnChunk::Timestamp(v) => {
                v.iter().for_each(|x| self.note_int(*x))
            }
            ColumnChunk::Double(v) => v.iter().for_each(|x| self.note_double(*x)),
            other => {
                return Err(TempoError::internal(format!(
                    "{} fold over {} chunk",
                    if self.min { "min" } else { "max" },
                    other.column_type()
                )))
            }
        }
        Ok(FoldStatus::Continue)
    }

    fn finalize(self: Box<Self>) -> Aggregate {
        // No samples yields the fold identity, not a synthetic extreme.
        match self.class {
            ResultClass::Int => self
                .int_acc
                .map(|x| Aggregate::Int(x as i32))
                .unwrap_or(Aggregate::Empty),
            ResultClass::Long => self.int_acc.map(Aggregate::Long).unwrap_or(Aggregate::Empty),
            _ => self
                .double_acc
                .map(Aggregate::Double)
                .unwrap_or(Aggregate::Empty),
        }
    }
}

// ── topk ────────────────────────────────────────────────────────────────────

struct TopKFactory;

impl AggregatorFactory for TopKFactory {
    fn name(&self) -> &'static str {
        "topk"
    }

    fn arity(&self) -> usize {
        1
    }

    fn resolve(&self, column: &Column) -> Result<(ResultClass, Cardinality, bool), PlanError> {
        numeric_class(column, "topk")?;
        Ok((ResultClass::Double, Cardinality::Many, false))
    }

    fn build(&self, column: &Column, args: &[String]) -> Result<Box<dyn Aggregator>, PlanError> {
        numeric_class(column, "topk")?;
        let k: usize = args
            .first()
            .and_then(|a| a.parse().ok())
            .filter(|k| *k > 0)
            .ok_or_else(|| {
                PlanError::BadArgument(format!("topk needs a positive k, got {:?}", args))
            })?;
        Ok(Box::new(TopKAggregator { k, top: Vec::new() }))
    }
}

#[derive(Debug)]
struct TopKAggregator {
    k: usize,
    /// Kept sorted descending, truncated to k.
    top: Vec<f64>,
}

impl Aggregator for TopKAggregator {
    fn fold_chunk(&mut self, chunk: &ColumnChunk) -> TempoResult<FoldStatus> {
        let values: Vec<f64> = match chunk {
            ColumnChunk::Int(v) => v.iter().map(|x| *x as f64).collect(),
            ColumnChunk::Long(v) | ColumnChunk::Timestamp(v) => {
                v.iter().map(|x| *x as f64).collect()
            }
            ColumnChunk::Double(v) => v.clone(),
            other => {
                return Err(TempoError::internal(format!(
                    "topk fold over {} chunk",
                    other.column_type()
                )))
            }
        };
        self.top.extend(values);
        self.top.sort_by(|a, b| b.total_cmp(a));
        self.top.truncate(self.k);
        Ok(FoldStatus::Continue)
    }

    fn finalize(self: Box<Self>) -> Aggregate {
        Aggregate::Doubles(self.top)
    }
}

// ── histogram (bucket double samples) ───────────────────────────────────────

struct HistogramFactory;

impl AggregatorFactory for HistogramFactory {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn arity(&self) -> usize {
        2
    }

    /// Takes a variable list of at least two bucket upper bounds.
    fn check_arity(&self, given: usize) -> Result<(), PlanError> {
        if given < 2 {
            return Err(PlanError::WrongArity { given, expected: 2 });
        }
        Ok(())
    }

    fn resolve(&self, column: &Column) -> Result<(ResultClass, Cardinality, bool), PlanError> {
        if column.column_type != ColumnType::Double {
            return Err(PlanError::BadArgument(format!(
                "histogram buckets a double column, {} is {}",
                column.name, column.column_type
            )));
        }
        Ok((ResultClass::Histogram, Cardinality::Many, false))
    }

    fn build(&self, _column: &Column, args: &[String]) -> Result<Box<dyn Aggregator>, PlanError> {
        let bucket_max: Vec<f64> = args
            .iter()
            .map(|a| {
                a.parse::<f64>().map_err(|_| {
                    PlanError::BadArgument(format!("bucket bound {:?} is not a number", a))
                })
            })
            .collect::<Result<_, _>>()?;
        if bucket_max.len() < 2 {
            return Err(PlanError::WrongArity {
                given: bucket_max.len(),
                expected: 2,
            });
        }
        if bucket_max.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PlanError::BadArgument(
                "bucket bounds must be strictly ascending".into(),
            ));
        }
        let counts = vec![0; bucket_max.len()];
        Ok(Box::new(HistogramAggregator { bucket_max, counts }))
    }
}

#[derive(Debug)]
struct HistogramAggregator {
    bucket_max: Vec<f64>,
    counts: Vec<i32>,
}

impl Aggregator for HistogramAggregator {
    fn fold_chunk(&mut self, chunk: &ColumnChunk) -> TempoResult<FoldStatus> {
        let ColumnChunk::Double(values) = chunk else {
            return Err(TempoError::internal(format!(
                "histogram fold over {} chunk",
                chunk.column_type()
            )));
        };
        for v in values {
            // Values above the top bound land in the top bucket.
            let idx = self
                .bucket_max
                .iter()
                .position(|max| v <= max)
                .unwrap_or(self.bucket_max.len() - 1);
            self.counts[idx] = self.counts[idx].saturating_add(1);
        }
        Ok(FoldStatus::Continue)
    }

    fn finalize(self: Box<Self>) -> Aggregate {
        Aggregate::Histogram {
            bucket_max: self.bucket_max,
            counts: self.counts,
        }
    }
}

// ── histmerge (merge pre-bucketed histogram columns) ────────────────────────

struct HistMergeFactory;

impl AggregatorFactory for HistMergeFactory {
    fn name(&self) -> &'static str {
        "histmerge"
    }

    fn arity(&self) -> usize {
        0
    }

    fn resolve(&self, column: &Column) -> Result<(ResultClass, Cardinality, bool), PlanError> {
        if column.column_type != ColumnType::Histogram {
            return Err(PlanError::BadArgument(format!(
                "histmerge merges a histogram column, {} is {}",
                column.name, column.column_type
            )));
        }
        Ok((ResultClass::Histogram, Cardinality::Many, false))
    }

    fn build(&self, _column: &Column, _args: &[String]) -> Result<Box<dyn Aggregator>, PlanError> {
        Ok(Box::new(HistMergeAggregator { acc: None }))
    }
}

#[derive(Debug)]
struct HistMergeAggregator {
    acc: Option<HistogramSample>,
}

impl Aggregator for HistMergeAggregator {
    fn fold_chunk(&mut self, chunk: &ColumnChunk) -> TempoResult<FoldStatus> {
        let ColumnChunk::Histogram(samples) = chunk else {
            return Err(TempoError::internal(format!(
                "histmerge fold over {} chunk",
                chunk.column_type()
            )));
        };
        for sample in samples {
            match &mut self.acc {
                None => self.acc = Some(sample.clone()),
                Some(acc) => {
                    if acc.bucket_max != sample.bucket_max {
                        return Err(PlanError::BadArgument(
                            "histogram bucket layouts differ across samples".into(),
                        )
                        .into());
                    }
                    for (c, add) in acc.counts.iter_mut().zip(&sample.counts) {
                        *c = c.saturating_add(*add);
                    }
                }
            }
        }
        Ok(FoldStatus::Continue)
    }

    fn finalize(self: Box<Self>) -> Aggregate {
        match self.acc {
            Some(s) => Aggregate::Histogram {
                bucket_max: s.bucket_max,
                counts: s.counts,
            },
            None => Aggregate::Empty,
        }
    }
}

// ── combiners ───────────────────────────────────────────────────────────────

struct SumCombiner;

impl Combiner for SumCombiner {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn commutative(&self) -> bool {
        true
    }

    fn combine(&self, a: Aggregate, b: Aggregate) -> TempoResult<Aggregate> {
        match (a, b) {
            (Aggregate::Empty, x) | (x, Aggregate::Empty) => Ok(x),
            (Aggregate::Int(a), Aggregate::Int(b)) => Ok(Aggregate::Int(a.saturating_add(b))),
            (Aggregate::Long(a), Aggregate::Long(b)) => Ok(Aggregate::Long(a.saturating_add(b))),
            (Aggregate::Double(a), Aggregate::Double(b)) => Ok(Aggregate::Double(a + b)),
            (
                Aggregate::Histogram {
                    bucket_max: bm_a,
                    counts: mut c_a,
                },
                Aggregate::Histogram {
                    bucket_max: bm_b,
                    counts: c_b,
                },
            ) => {
                if bm_a != bm_b {
                    return Err(TempoError::internal(
                        "histogram partials have different bucket layouts",
                    ));
                }
                for (a, b) in c_a.iter_mut().zip(&c_b) {
                    *a = a.saturating_add(*b);
                }
                Ok(Aggregate::Histogram {
                    bucket_max: bm_a,
                    counts: c_a,
                })
            }
            (a, b) => Err(TempoError::internal(format!(
                "sum combine over mixed partials {:?} / {:?}",
                a, b
            ))),
        }
    }
}

struct MinMaxCombiner {
    min: bool,
}

impl Combiner for MinMaxCombiner {
    fn name(&self) -> &'static str {
        if self.min {
            "min"
        } else {
            "max"
        }
    }

    fn commutative(&self) -> bool {
        true
    }

    fn combine(&self, a: Aggregate, b: Aggregate) -> TempoResult<Aggregate> {
        let pick_i = |a: i64, b: i64| if self.min { a.min(b) } else { a.max(b) };
        let pick_f = |a: f64, b: f64| if self.min { a.min(b) } else { a.max(b) };
        match (a, b) {
            (Aggregate::Empty, x) | (x, Aggregate::Empty) => Ok(x),
            (Aggregate::Int(a), Aggregate::Int(b)) => {
                Ok(Aggregate::Int(pick_i(a as i64, b as i64) as i32))
            }
            (Aggregate::Long(a), Aggregate::Long(b)) => Ok(Aggregate::Long(pick_i(a, b))),
            (Aggregate::Double(a), Aggregate::Double(b)) => Ok(Aggregate::Double(pick_f(a, b))),
            (a, b) => Err(TempoError::internal(format!(
                "{} combine over mixed partials {:?} / {:?}",
                self.name(),
                a,
                b
            ))),
        }
    }
}

/// Concatenates partial values in fold order. Associative but NOT
/// commutative, so the engine folds shard partials in shard-id order.
struct ConcatCombiner;

fn to_values(a: Aggregate) -> TempoResult<Vec<f64>> {
    match a {
        Aggregate::Empty => Ok(Vec::new()),
        Aggregate::Int(x) => Ok(vec![x as f64]),
        Aggregate::Long(x) => Ok(vec![x as f64]),
        Aggregate::Double(x) => Ok(vec![x]),
        Aggregate::Doubles(v) => Ok(v),
        Aggregate::Histogram { .. } => Err(TempoError::internal(
            "concat combine over histogram partials",
        )),
    }
}

impl Combiner for ConcatCombiner {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn commutative(&self) -> bool {
        false
    }

    fn combine(&self, a: Aggregate, b: Aggregate) -> TempoResult<Aggregate> {
        let mut values = to_values(a)?;
        values.extend(to_values(b)?);
        Ok(Aggregate::Doubles(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_common::types::Column;

    fn double_col() -> Column {
        Column::new(2, "value", ColumnType::Double)
    }

    #[test]
    fn test_registry_is_case_insensitive() {
        assert!(aggregator_factory("SuM").is_some());
        assert!(aggregator_factory("median").is_none());
        assert!(combiner("CONCAT").is_some());
        assert!(combiner("xor").is_none());
    }

    #[test]
    fn test_sum_over_double_chunks() {
        let f = aggregator_factory("sum").unwrap();
        let mut agg = f.build(&double_col(), &[]).unwrap();
        agg.fold_chunk(&ColumnChunk::Double(vec![1.0, 2.0])).unwrap();
        agg.fold_chunk(&ColumnChunk::Double(vec![4.0])).unwrap();
        assert_eq!(agg.finalize(), Aggregate::Double(7.0));
    }

    #[test]
    fn test_sum_over_int_column_is_int_class() {
        let col = Column::new(0, "n", ColumnType::Int);
        let f = aggregator_factory("sum").unwrap();
        assert_eq!(
            f.resolve(&col).unwrap(),
            (ResultClass::Int, Cardinality::One, false)
        );
        let mut agg = f.build(&col, &[]).unwrap();
        agg.fold_chunk(&ColumnChunk::Int(vec![3, 4])).unwrap();
        assert_eq!(agg.finalize(), Aggregate::Int(7));
    }

    #[test]
    fn test_sum_rejects_string_column() {
        let col = Column::new(0, "s", ColumnType::String);
        let err = aggregator_factory("sum").unwrap().resolve(&col).unwrap_err();
        assert!(matches!(err, PlanError::BadArgument(_)));
    }

    #[test]
    fn test_count_is_wide() {
        let f = aggregator_factory("count").unwrap();
        let (class, card, wide) = f.resolve(&double_col()).unwrap();
        assert_eq!(class, ResultClass::Long);
        assert_eq!(card, Cardinality::One);
        assert!(wide);
        let mut agg = f.build(&double_col(), &[]).unwrap();
        agg.fold_chunk(&ColumnChunk::Double(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(agg.finalize(), Aggregate::Long(3));
    }

    #[test]
    fn test_min_of_no_samples_is_empty() {
        let f = aggregator_factory("min").unwrap();
        let agg = f.build(&double_col(), &[]).unwrap();
        assert_eq!(agg.finalize(), Aggregate::Empty);
    }

    #[test]
    fn test_topk_keeps_largest() {
        let f = aggregator_factory("topk").unwrap();
        let mut agg = f.build(&double_col(), &["2".into()]).unwrap();
        agg.fold_chunk(&ColumnChunk::Double(vec![5.0, 1.0, 9.0, 3.0]))
            .unwrap();
        assert_eq!(agg.finalize(), Aggregate::Doubles(vec![9.0, 5.0]));
    }

    #[test]
    fn test_topk_rejects_bad_k() {
        let f = aggregator_factory("topk").unwrap();
        let err = f.build(&double_col(), &["zero".into()]).unwrap_err();
        assert!(matches!(err, PlanError::BadArgument(_)));
    }

    #[test]
    fn test_histogram_buckets_values() {
        let f = aggregator_factory("histogram").unwrap();
        let mut agg = f
            .build(&double_col(), &["1.0".into(), "10.0".into()])
            .unwrap();
        agg.fold_chunk(&ColumnChunk::Double(vec![0.5, 2.0, 99.0]))
            .unwrap();
        assert_eq!(
            agg.finalize(),
            Aggregate::Histogram {
                bucket_max: vec![1.0, 10.0],
                counts: vec![1, 2],
            }
        );
    }

    #[test]
    fn test_histogram_variable_arity() {
        let f = aggregator_factory("histogram").unwrap();
        assert!(f.check_arity(3).is_ok());
        assert_eq!(
            f.check_arity(1).unwrap_err(),
            PlanError::WrongArity { given: 1, expected: 2 }
        );
    }

    #[test]
    fn test_histogram_rejects_unordered_buckets() {
        let f = aggregator_factory("histogram").unwrap();
        let err = f
            .build(&double_col(), &["5.0".into(), "2.0".into()])
            .unwrap_err();
        assert!(matches!(err, PlanError::BadArgument(_)));
    }

    #[test]
    fn test_histmerge_merges_samples() {
        let col = Column::new(0, "lat", ColumnType::Histogram);
        let f = aggregator_factory("histmerge").unwrap();
        let mut agg = f.build(&col, &[]).unwrap();
        let sample = |counts: Vec<i32>| HistogramSample {
            bucket_max: vec![1.0, 2.0],
            counts,
        };
        agg.fold_chunk(&ColumnChunk::Histogram(vec![sample(vec![1, 2]), sample(vec![3, 4])]))
            .unwrap();
        assert_eq!(
            agg.finalize(),
            Aggregate::Histogram {
                bucket_max: vec![1.0, 2.0],
                counts: vec![4, 6],
            }
        );
    }

    #[test]
    fn test_sum_combiner_identity_and_add() {
        let c = combiner("sum").unwrap();
        assert!(c.commutative());
        assert_eq!(
            c.combine(Aggregate::Empty, Aggregate::Double(2.0)).unwrap(),
            Aggregate::Double(2.0)
        );
        assert_eq!(
            c.combine(Aggregate::Double(2.0), Aggregate::Double(3.0)).unwrap(),
            Aggregate::Double(5.0)
        );
    }

    #[test]
    fn test_concat_combiner_preserves_order() {
        let c = combiner("concat").unwrap();
        assert!(!c.commutative());
        let ab = c
            .combine(Aggregate::Double(1.0), Aggregate::Double(2.0))
            .unwrap();
        assert_eq!(ab, Aggregate::Doubles(vec![1.0, 2.0]));
        let abc = c.combine(ab, Aggregate::Double(3.0)).unwrap();
        assert_eq!(abc, Aggregate::Doubles(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_build_aggregator_revalidates() {
        let ds = Dataset::new(
            tempo_common::types::DatasetRef::new("m"),
            vec![
                Column::new(0, "t", ColumnType::Timestamp),
                Column::new(1, "value", ColumnType::Double),
            ],
            &[],
            &["t"],
        )
        .unwrap();
        let spec = AggregateSpec {
            function: "sum".into(),
            args: vec![],
            column: ColumnId(9),
            result_class: ResultClass::Double,
            cardinality: Cardinality::One,
            wide: false,
        };
        let err = build_aggregator(&ds, &spec).unwrap_err();
        assert!(matches!(err, TempoError::Plan(PlanError::UnknownColumn(_))));
    }
}
