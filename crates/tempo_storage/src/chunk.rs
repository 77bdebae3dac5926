//! Columnar chunk model: the unit of I/O between the column store and the
//! shard executor. A chunk holds one column's values for a run of rows of a
//! single partition.

use serde::{Deserialize, Serialize};

use tempo_common::types::{ColumnType, PartitionKey};
use tempo_common::TempoResult;

/// Rows per chunk cut by the in-memory store.
pub const CHUNK_ROWS: usize = 256;

/// One pre-bucketed histogram observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSample {
    /// Ascending bucket upper bounds.
    pub bucket_max: Vec<f64>,
    /// Per-bucket counts, parallel to `bucket_max`.
    pub counts: Vec<i32>,
}

/// A single cell value, parallel to the dataset's column list on ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Int(i32),
    Long(i64),
    Double(f64),
    Timestamp(i64),
    Str(String),
    Histogram(HistogramSample),
}

impl CellValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            CellValue::Int(_) => ColumnType::Int,
            CellValue::Long(_) => ColumnType::Long,
            CellValue::Double(_) => ColumnType::Double,
            CellValue::Timestamp(_) => ColumnType::Timestamp,
            CellValue::Str(_) => ColumnType::String,
            CellValue::Histogram(_) => ColumnType::Histogram,
        }
    }
}

/// One ingested sample. `values` is parallel to the dataset's column list;
/// `timestamp` doubles as the row key for range scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub timestamp: i64,
    pub values: Vec<CellValue>,
}

impl Row {
    pub fn new(timestamp: i64, values: Vec<CellValue>) -> Self {
        Row { timestamp, values }
    }
}

/// A columnar block of values for one column of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnChunk {
    Int(Vec<i32>),
    Long(Vec<i64>),
    Double(Vec<f64>),
    Timestamp(Vec<i64>),
    Str(Vec<String>),
    Histogram(Vec<HistogramSample>),
}

impl ColumnChunk {
    pub fn len(&self) -> usize {
        match self {
            ColumnChunk::Int(v) => v.len(),
            ColumnChunk::Long(v) => v.len(),
            ColumnChunk::Double(v) => v.len(),
            ColumnChunk::Timestamp(v) => v.len(),
            ColumnChunk::Str(v) => v.len(),
            ColumnChunk::Histogram(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnChunk::Int(_) => ColumnType::Int,
            ColumnChunk::Long(_) => ColumnType::Long,
            ColumnChunk::Double(_) => ColumnType::Double,
            ColumnChunk::Timestamp(_) => ColumnType::Timestamp,
            ColumnChunk::Str(_) => ColumnType::String,
            ColumnChunk::Histogram(_) => ColumnType::Histogram,
        }
    }

    /// Build a chunk of the given type from cells. Cells of a different type
    /// than the chunk indicate corrupt ingest and are skipped with a warning.
    pub fn from_cells<'a>(
        column_type: ColumnType,
        cells: impl Iterator<Item = &'a CellValue>,
    ) -> ColumnChunk {
        let mut chunk = ColumnChunk::empty(column_type);
        for cell in cells {
            if !chunk.push(cell) {
                tracing::warn!(
                    expected = %column_type,
                    got = %cell.column_type(),
                    "cell type mismatch during chunk build, cell skipped"
                );
            }
        }
        chunk
    }

    /// The cell at a row index, or None past the end.
    pub fn cell(&self, idx: usize) -> Option<CellValue> {
        match self {
            ColumnChunk::Int(v) => v.get(idx).map(|x| CellValue::Int(*x)),
            ColumnChunk::Long(v) => v.get(idx).map(|x| CellValue::Long(*x)),
            ColumnChunk::Double(v) => v.get(idx).map(|x| CellValue::Double(*x)),
            ColumnChunk::Timestamp(v) => v.get(idx).map(|x| CellValue::Timestamp(*x)),
            ColumnChunk::Str(v) => v.get(idx).map(|x| CellValue::Str(x.clone())),
            ColumnChunk::Histogram(v) => v.get(idx).map(|x| CellValue::Histogram(x.clone())),
        }
    }

    fn empty(column_type: ColumnType) -> ColumnChunk {
        match column_type {
            ColumnType::Int => ColumnChunk::Int(Vec::new()),
            ColumnType::Long => ColumnChunk::Long(Vec::new()),
            ColumnType::Double => ColumnChunk::Double(Vec::new()),
            ColumnType::Timestamp => ColumnChunk::Timestamp(Vec::new()),
            ColumnType::String => ColumnChunk::Str(Vec::new()),
            ColumnType::Histogram => ColumnChunk::Histogram(Vec::new()),
        }
    }

    fn push(&mut self, cell: &CellValue) -> bool {
        match (self, cell) {
            (ColumnChunk::Int(v), CellValue::Int(x)) => v.push(*x),
            (ColumnChunk::Long(v), CellValue::Long(x)) => v.push(*x),
            (ColumnChunk::Double(v), CellValue::Double(x)) => v.push(*x),
            (ColumnChunk::Timestamp(v), CellValue::Timestamp(x)) => v.push(*x),
            (ColumnChunk::Str(v), CellValue::Str(x)) => v.push(x.clone()),
            (ColumnChunk::Histogram(v), CellValue::Histogram(x)) => v.push(x.clone()),
            _ => return false,
        }
        true
    }
}

/// A chunk of rows for one partition across the requested columns.
/// `columns` is parallel to the column-id list of the scan request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSet {
    pub partition: PartitionKey,
    pub columns: Vec<ColumnChunk>,
}

impl ChunkSet {
    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }
}

/// Lazy pull stream of chunk sets. The consumer fetches the next chunk only
/// after it has finished folding the previous one.
pub struct ChunkStream {
    inner: Box<dyn Iterator<Item = TempoResult<ChunkSet>> + Send>,
}

impl ChunkStream {
    pub fn new(inner: impl Iterator<Item = TempoResult<ChunkSet>> + Send + 'static) -> Self {
        ChunkStream {
            inner: Box::new(inner),
        }
    }

    pub fn empty() -> Self {
        ChunkStream::new(std::iter::empty())
    }

    /// Pull the next chunk set.
    pub async fn next(&mut self) -> Option<TempoResult<ChunkSet>> {
        self.inner.next()
    }
}
