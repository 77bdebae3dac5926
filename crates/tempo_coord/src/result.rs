//! Result shapes and the aggregate → result codec.
//!
//! Scalar aggregates become a `TupleResult` with a single named column
//! `result`; multi-valued aggregates and row reads become a `VectorResult`
//! of parallel typed column vectors. The tuple record is a little-endian
//! binary layout matching the schema: Int i32, Long/Timestamp i64, Double
//! f64 (NaN and ±∞ preserved verbatim), String u16-length-prefixed UTF-8.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use tempo_common::types::{ColumnType, Dataset};
use tempo_common::{CodecError, TempoError, TempoResult};
use tempo_planner::aggregate::{Aggregate, AggregateSpec, Cardinality, ResultClass};
use tempo_planner::physical::{LocalPlanTemplate, PhysicalPlan};
use tempo_storage::chunk::{CellValue, ColumnChunk};

use crate::protocol::{QueryOutput, ShardItem};

/// One column of a result schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    pub column_type: ColumnType,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ResultColumn {
            name: name.into(),
            column_type,
        }
    }
}

/// A typed column vector of a `VectorResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnVector {
    Int(Vec<i32>),
    Long(Vec<i64>),
    Double(Vec<f64>),
    Timestamp(Vec<i64>),
    Str(Vec<String>),
}

impl ColumnVector {
    pub fn len(&self) -> usize {
        match self {
            ColumnVector::Int(v) => v.len(),
            ColumnVector::Long(v) => v.len(),
            ColumnVector::Double(v) => v.len(),
            ColumnVector::Timestamp(v) => v.len(),
            ColumnVector::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn empty(column_type: ColumnType) -> TempoResult<ColumnVector> {
        match column_type {
            ColumnType::Int => Ok(ColumnVector::Int(Vec::new())),
            ColumnType::Long => Ok(ColumnVector::Long(Vec::new())),
            ColumnType::Double => Ok(ColumnVector::Double(Vec::new())),
            ColumnType::Timestamp => Ok(ColumnVector::Timestamp(Vec::new())),
            ColumnType::String => Ok(ColumnVector::Str(Vec::new())),
            ColumnType::Histogram => Err(CodecError::SchemaMismatch(
                "histogram columns cannot be vectorized".into(),
            )
            .into()),
        }
    }

    /// Copy a column chunk into a vector. Histogram chunks do not vectorize.
    pub fn from_chunk(chunk: &ColumnChunk) -> TempoResult<ColumnVector> {
        match chunk {
            ColumnChunk::Int(v) => Ok(ColumnVector::Int(v.clone())),
            ColumnChunk::Long(v) => Ok(ColumnVector::Long(v.clone())),
            ColumnChunk::Double(v) => Ok(ColumnVector::Double(v.clone())),
            ColumnChunk::Timestamp(v) => Ok(ColumnVector::Timestamp(v.clone())),
            ColumnChunk::Str(v) => Ok(ColumnVector::Str(v.clone())),
            ColumnChunk::Histogram(_) => Err(CodecError::SchemaMismatch(
                "histogram columns cannot be vectorized".into(),
            )
            .into()),
        }
    }

    /// Append another vector of the same type.
    pub fn append(&mut self, other: ColumnVector) -> TempoResult<()> {
        match (self, other) {
            (ColumnVector::Int(a), ColumnVector::Int(b)) => a.extend(b),
            (ColumnVector::Long(a), ColumnVector::Long(b)) => a.extend(b),
            (ColumnVector::Double(a), ColumnVector::Double(b)) => a.extend(b),
            (ColumnVector::Timestamp(a), ColumnVector::Timestamp(b)) => a.extend(b),
            (ColumnVector::Str(a), ColumnVector::Str(b)) => a.extend(b),
            _ => {
                return Err(CodecError::SchemaMismatch(
                    "appending vectors of different types".into(),
                )
                .into())
            }
        }
        Ok(())
    }

    pub fn push_cell(&mut self, cell: &CellValue) -> TempoResult<()> {
        match (self, cell) {
            (ColumnVector::Int(v), CellValue::Int(x)) => v.push(*x),
            (ColumnVector::Long(v), CellValue::Long(x)) => v.push(*x),
            (ColumnVector::Double(v), CellValue::Double(x)) => v.push(*x),
            (ColumnVector::Timestamp(v), CellValue::Timestamp(x)) => v.push(*x),
            (ColumnVector::Str(v), CellValue::Str(x)) => v.push(x.clone()),
            (_, cell) => {
                return Err(CodecError::SchemaMismatch(format!(
                    "cell of type {} does not fit the vector",
                    cell.column_type()
                ))
                .into())
            }
        }
        Ok(())
    }
}

/// A single binary record plus its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleResult {
    pub schema: Vec<ResultColumn>,
    pub record: Vec<u8>,
}

/// One or more typed column vectors of equal length plus their schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorResult {
    pub schema: Vec<ResultColumn>,
    pub columns: Vec<ColumnVector>,
}

/// The wire-facing result of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryResultValue {
    Tuple(TupleResult),
    Vector(VectorResult),
}

impl QueryResultValue {
    pub fn rows(&self) -> usize {
        match self {
            QueryResultValue::Tuple(_) => 1,
            QueryResultValue::Vector(v) => v.columns.first().map(|c| c.len()).unwrap_or(0),
        }
    }
}

// ── Binary tuple record ─────────────────────────────────────────────────────

/// Encode cells into a binary record laid out per the schema.
pub fn encode_tuple(schema: &[ResultColumn], cells: &[CellValue]) -> TempoResult<Vec<u8>> {
    if schema.len() != cells.len() {
        return Err(CodecError::SchemaMismatch(format!(
            "schema has {} columns, record has {} cells",
            schema.len(),
            cells.len()
        ))
        .into());
    }
    let mut buf = BytesMut::new();
    for (col, cell) in schema.iter().zip(cells) {
        match (col.column_type, cell) {
            (ColumnType::Int, CellValue::Int(x)) => buf.put_i32_le(*x),
            (ColumnType::Long, CellValue::Long(x)) => buf.put_i64_le(*x),
            (ColumnType::Double, CellValue::Double(x)) => buf.put_f64_le(*x),
            (ColumnType::Timestamp, CellValue::Timestamp(x)) => buf.put_i64_le(*x),
            (ColumnType::String, CellValue::Str(s)) => {
                let bytes = s.as_bytes();
                if bytes.len() > u16::MAX as usize {
                    return Err(CodecError::SchemaMismatch(format!(
                        "string field {} exceeds u16 length prefix",
                        col.name
                    ))
                    .into());
                }
                buf.put_u16_le(bytes.len() as u16);
                buf.put_slice(bytes);
            }
            (ty, cell) => {
                return Err(CodecError::SchemaMismatch(format!(
                    "field {} declared {} but cell is {}",
                    col.name,
                    ty,
                    cell.column_type()
                ))
                .into())
            }
        }
    }
    Ok(buf.to_vec())
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], CodecError> {
    if buf.len() < n {
        return Err(CodecError::Truncated {
            expected: n,
            actual: buf.len(),
        });
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

fn read_i32(buf: &mut &[u8]) -> Result<i32, CodecError> {
    let b = take(buf, 4)?;
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_i64(buf: &mut &[u8]) -> Result<i64, CodecError> {
    let b = take(buf, 8)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(b);
    Ok(i64::from_le_bytes(arr))
}

fn read_f64(buf: &mut &[u8]) -> Result<f64, CodecError> {
    let b = take(buf, 8)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(b);
    Ok(f64::from_le_bytes(arr))
}

/// Decode a binary record against its schema.
pub fn decode_tuple(schema: &[ResultColumn], record: &[u8]) -> TempoResult<Vec<CellValue>> {
    let mut buf = record;
    let mut cells = Vec::with_capacity(schema.len());
    for col in schema {
        let cell = match col.column_type {
            ColumnType::Int => CellValue::Int(read_i32(&mut buf)?),
            ColumnType::Long => CellValue::Long(read_i64(&mut buf)?),
            ColumnType::Double => CellValue::Double(read_f64(&mut buf)?),
            ColumnType::Timestamp => CellValue::Timestamp(read_i64(&mut buf)?),
            ColumnType::String => {
                let len = take(&mut buf, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))? as usize;
                let bytes = take(&mut buf, len)?;
                CellValue::Str(String::from_utf8(bytes.to_vec()).map_err(|_| {
                    CodecError::InvalidUtf8(col.name.clone())
                })?)
            }
            ColumnType::Histogram => {
                return Err(
                    CodecError::SchemaMismatch("histogram field in tuple record".into()).into(),
                )
            }
        };
        cells.push(cell);
    }
    if !buf.is_empty() {
        return Err(CodecError::SchemaMismatch(format!(
            "{} trailing bytes after record",
            buf.len()
        ))
        .into());
    }
    Ok(cells)
}

// ── Aggregate → result mapping ──────────────────────────────────────────────

fn scalar_schema(spec: &AggregateSpec) -> ResultColumn {
    let column_type = match spec.result_class {
        // Wide integer aggregators emit 64-bit.
        ResultClass::Int if spec.wide => ColumnType::Long,
        ResultClass::Int => ColumnType::Int,
        ResultClass::Long => ColumnType::Long,
        _ => ColumnType::Double,
    };
    ResultColumn::new("result", column_type)
}

fn map_aggregate(spec: &AggregateSpec, aggregate: Aggregate) -> TempoResult<QueryResultValue> {
    match aggregate {
        Aggregate::Histogram { bucket_max, counts } => {
            Ok(QueryResultValue::Vector(VectorResult {
                schema: vec![
                    ResultColumn::new("counts", ColumnType::Int),
                    ResultColumn::new("bucketMax", ColumnType::Double),
                ],
                columns: vec![ColumnVector::Int(counts), ColumnVector::Double(bucket_max)],
            }))
        }
        // Value lists arise from many-valued aggregators and from
        // order-preserving combiners over scalar partials.
        Aggregate::Doubles(values) => Ok(QueryResultValue::Vector(VectorResult {
            schema: vec![ResultColumn::new("result", ColumnType::Double)],
            columns: vec![ColumnVector::Double(values)],
        })),
        Aggregate::Empty => {
            // No samples: an empty vector rather than a fabricated scalar.
            let schema = match spec.cardinality {
                Cardinality::Many => ResultColumn::new("result", ColumnType::Double),
                Cardinality::One => scalar_schema(spec),
            };
            let column = ColumnVector::empty(schema.column_type)?;
            Ok(QueryResultValue::Vector(VectorResult {
                schema: vec![schema],
                columns: vec![column],
            }))
        }
        agg => {
            let schema = scalar_schema(spec);
            let cell = match (schema.column_type, agg) {
                (ColumnType::Int, Aggregate::Int(x)) => CellValue::Int(x),
                (ColumnType::Long, Aggregate::Long(x)) => CellValue::Long(x),
                (ColumnType::Long, Aggregate::Int(x)) => CellValue::Long(x as i64),
                (ColumnType::Double, Aggregate::Double(x)) => CellValue::Double(x),
                (ty, agg) => {
                    return Err(CodecError::SchemaMismatch(format!(
                        "aggregate {:?} does not fit declared class {}",
                        agg, ty
                    ))
                    .into())
                }
            };
            let schema = vec![schema];
            let record = encode_tuple(&schema, &[cell])?;
            Ok(QueryResultValue::Tuple(TupleResult { schema, record }))
        }
    }
}

fn read_schema(dataset: &Dataset, template: &LocalPlanTemplate) -> TempoResult<Vec<ResultColumn>> {
    template
        .columns()
        .iter()
        .map(|id| {
            dataset
                .column(*id)
                .map(|c| ResultColumn::new(c.name.clone(), c.column_type))
                .ok_or_else(|| TempoError::internal(format!("column {} out of range", id)))
        })
        .collect()
}

/// Pack the engine's output into the client-facing result shape.
pub fn encode_output(
    dataset: &Dataset,
    plan: &PhysicalPlan,
    output: QueryOutput,
) -> TempoResult<QueryResultValue> {
    let template = plan.template();
    match (template, output) {
        (LocalPlanTemplate::ShardAggregate { spec, .. }, QueryOutput::Combined(agg)) => {
            map_aggregate(spec, agg)
        }
        (LocalPlanTemplate::ShardAggregate { spec, .. }, QueryOutput::Items(items)) => {
            let mut partials = Vec::new();
            for item in items {
                match item {
                    ShardItem::Aggregate(Aggregate::Empty) => {}
                    ShardItem::Aggregate(agg) => partials.push(agg),
                    other => {
                        return Err(CodecError::SchemaMismatch(format!(
                            "aggregate plan produced non-aggregate item {:?}",
                            other
                        ))
                        .into())
                    }
                }
            }
            match partials.len() {
                0 => map_aggregate(spec, Aggregate::Empty),
                1 => map_aggregate(spec, partials.remove(0)),
                _ => concat_partials(spec, partials),
            }
        }
        (template, QueryOutput::Items(items)) => {
            let schema = read_schema(dataset, template)?;
            let mut columns: Vec<ColumnVector> = schema
                .iter()
                .map(|c| ColumnVector::empty(c.column_type))
                .collect::<TempoResult<_>>()?;
            for item in items {
                match item {
                    ShardItem::Row { values, .. } => {
                        if values.len() != columns.len() {
                            return Err(CodecError::SchemaMismatch(format!(
                                "row has {} cells, schema has {} columns",
                                values.len(),
                                columns.len()
                            ))
                            .into());
                        }
                        for (vector, cell) in columns.iter_mut().zip(&values) {
                            vector.push_cell(cell)?;
                        }
                    }
                    ShardItem::Series {
                        columns: series, ..
                    } => {
                        if series.len() != columns.len() {
                            return Err(CodecError::SchemaMismatch(format!(
                                "series has {} vectors, schema has {} columns",
                                series.len(),
                                columns.len()
                            ))
                            .into());
                        }
                        for (vector, part) in columns.iter_mut().zip(series) {
                            vector.append(part)?;
                        }
                    }
                    ShardItem::Aggregate(agg) => {
                        return Err(CodecError::SchemaMismatch(format!(
                            "read plan produced aggregate item {:?}",
                            agg
                        ))
                        .into())
                    }
                }
            }
            Ok(QueryResultValue::Vector(VectorResult { schema, columns }))
        }
        (_, QueryOutput::Combined(_)) => {
            Err(TempoError::internal("combine gather over a read plan"))
        }
    }
}

/// Concatenate per-shard partials of a bare `ReduceEach` into one vector.
/// Histogram partials share the query-defined bucket layout and concatenate
/// by bucket-wise sum.
fn concat_partials(
    spec: &AggregateSpec,
    partials: Vec<Aggregate>,
) -> TempoResult<QueryResultValue> {
    if spec.result_class == ResultClass::Histogram {
        let sum = tempo_planner::aggregate::combiner("sum")
            .ok_or_else(|| TempoError::internal("sum combiner missing from registry"))?;
        let mut acc = Aggregate::Empty;
        for p in partials {
            acc = sum.combine(acc, p)?;
        }
        return map_aggregate(spec, acc);
    }

    let mut values = Vec::with_capacity(partials.len());
    for p in partials {
        match p {
            Aggregate::Int(x) => values.push(x as f64),
            Aggregate::Long(x) => values.push(x as f64),
            Aggregate::Double(x) => values.push(x),
            Aggregate::Doubles(v) => values.extend(v),
            other => {
                return Err(CodecError::SchemaMismatch(format!(
                    "cannot concatenate partial {:?}",
                    other
                ))
                .into())
            }
        }
    }
    Ok(QueryResultValue::Vector(VectorResult {
        schema: vec![ResultColumn::new("result", ColumnType::Double)],
        columns: vec![ColumnVector::Double(values)],
    }))
}

/// Optional self-check behind `testQuerySerialization`: round-trip the
/// result and log failures. Never alters the client response.
pub fn self_check(result: &QueryResultValue) {
    let outcome = match result {
        QueryResultValue::Tuple(t) => decode_tuple(&t.schema, &t.record)
            .and_then(|cells| encode_tuple(&t.schema, &cells))
            .map(|bytes| bytes == t.record),
        QueryResultValue::Vector(v) => serde_json::to_string(v)
            .map_err(|e| TempoError::internal(e.to_string()))
            .and_then(|s| {
                serde_json::from_str::<VectorResult>(&s)
                    .map_err(|e| TempoError::internal(e.to_string()))
            })
            .map(|decoded| &decoded == v),
    };
    match outcome {
        Ok(true) => {}
        Ok(false) => tracing::warn!("result serialization self-check: round-trip mismatch"),
        Err(e) => tracing::warn!("result serialization self-check failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_common::types::ColumnId;

    fn spec(class: ResultClass, cardinality: Cardinality, wide: bool) -> AggregateSpec {
        AggregateSpec {
            function: "sum".into(),
            args: vec![],
            column: ColumnId(0),
            result_class: class,
            cardinality,
            wide,
        }
    }

    #[test]
    fn test_scalar_double_maps_to_tuple() {
        let r = map_aggregate(
            &spec(ResultClass::Double, Cardinality::One, false),
            Aggregate::Double(15.0),
        )
        .unwrap();
        let QueryResultValue::Tuple(t) = r else {
            panic!("expected tuple");
        };
        assert_eq!(t.schema, vec![ResultColumn::new("result", ColumnType::Double)]);
        assert_eq!(
            decode_tuple(&t.schema, &t.record).unwrap(),
            vec![CellValue::Double(15.0)]
        );
    }

    #[test]
    fn test_wide_int_widens_to_long() {
        let r = map_aggregate(
            &spec(ResultClass::Int, Cardinality::One, true),
            Aggregate::Int(7),
        )
        .unwrap();
        let QueryResultValue::Tuple(t) = r else {
            panic!("expected tuple");
        };
        assert_eq!(t.schema[0].column_type, ColumnType::Long);
        assert_eq!(
            decode_tuple(&t.schema, &t.record).unwrap(),
            vec![CellValue::Long(7)]
        );
    }

    #[test]
    fn test_nan_survives_round_trip() {
        let schema = vec![ResultColumn::new("result", ColumnType::Double)];
        let record = encode_tuple(&schema, &[CellValue::Double(f64::NAN)]).unwrap();
        let cells = decode_tuple(&schema, &record).unwrap();
        let CellValue::Double(x) = cells[0] else {
            panic!("expected double");
        };
        assert!(x.is_nan());

        let record = encode_tuple(&schema, &[CellValue::Double(f64::INFINITY)]).unwrap();
        assert_eq!(
            decode_tuple(&schema, &record).unwrap(),
            vec![CellValue::Double(f64::INFINITY)]
        );
    }

    #[test]
    fn test_histogram_maps_to_parallel_vectors() {
        let r = map_aggregate(
            &spec(ResultClass::Histogram, Cardinality::Many, false),
            Aggregate::Histogram {
                bucket_max: vec![1.0, 10.0],
                counts: vec![3, 4],
            },
        )
        .unwrap();
        let QueryResultValue::Vector(v) = r else {
            panic!("expected vector");
        };
        assert_eq!(v.schema[0].name, "counts");
        assert_eq!(v.schema[1].name, "bucketMax");
        assert_eq!(v.columns[0], ColumnVector::Int(vec![3, 4]));
        assert_eq!(v.columns[1], ColumnVector::Double(vec![1.0, 10.0]));
        assert_eq!(v.columns[0].len(), v.columns[1].len());
    }

    #[test]
    fn test_empty_scalar_becomes_empty_vector() {
        let r = map_aggregate(
            &spec(ResultClass::Double, Cardinality::One, false),
            Aggregate::Empty,
        )
        .unwrap();
        assert_eq!(r.rows(), 0);
    }

    #[test]
    fn test_truncated_record_is_detected() {
        let schema = vec![ResultColumn::new("result", ColumnType::Long)];
        let err = decode_tuple(&schema, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            TempoError::Codec(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_detected() {
        let schema = vec![ResultColumn::new("result", ColumnType::Int)];
        let mut record = encode_tuple(&schema, &[CellValue::Int(1)]).unwrap();
        record.push(0xff);
        let err = decode_tuple(&schema, &record).unwrap_err();
        assert!(matches!(
            err,
            TempoError::Codec(CodecError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_string_field_round_trip() {
        let schema = vec![
            ResultColumn::new("name", ColumnType::String),
            ResultColumn::new("n", ColumnType::Int),
        ];
        let cells = vec![CellValue::Str("host-1".into()), CellValue::Int(5)];
        let record = encode_tuple(&schema, &cells).unwrap();
        assert_eq!(decode_tuple(&schema, &record).unwrap(), cells);
    }

    #[test]
    fn test_self_check_accepts_good_results() {
        let schema = vec![ResultColumn::new("result", ColumnType::Double)];
        let record = encode_tuple(&schema, &[CellValue::Double(1.5)]).unwrap();
        self_check(&QueryResultValue::Tuple(TupleResult { schema, record }));
        self_check(&QueryResultValue::Vector(VectorResult {
            schema: vec![ResultColumn::new("result", ColumnType::Double)],
            columns: vec![ColumnVector::Double(vec![1.0])],
        }));
    }
}
