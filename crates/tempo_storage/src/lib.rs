//! Column-store seam and in-memory implementations for the TempoDB query
//! coordinator: chunk model, `ColumnStore` trait, `MemStore`, and the
//! dataset metastore.

pub mod chunk;
pub mod memstore;
pub mod metastore;
pub mod store;

pub use chunk::{CellValue, ChunkSet, ChunkStream, ColumnChunk, HistogramSample, Row, CHUNK_ROWS};
pub use memstore::MemStore;
pub use metastore::MetaStore;
pub use store::ColumnStore;
