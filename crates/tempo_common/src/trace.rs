//! Per-query observability context.
//!
//! A `QueryTrace` is created at request entry and closed exactly once on the
//! final response, success or failure. Dropping an unclosed trace logs a
//! warning so lost replies show up in the logs.

use std::time::Instant;

use crate::error::TempoError;
use crate::types::{DatasetRef, QueryId};

pub struct QueryTrace {
    query_id: QueryId,
    dataset: DatasetRef,
    kind: &'static str,
    started: Instant,
    closed: bool,
}

impl QueryTrace {
    pub fn begin(query_id: QueryId, dataset: DatasetRef, kind: &'static str) -> Self {
        tracing::debug!(query_id = query_id.0, dataset = %dataset, kind, "query accepted");
        Self {
            query_id,
            dataset,
            kind,
            started: Instant::now(),
            closed: false,
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn finish_ok(mut self, items: usize) {
        self.closed = true;
        tracing::info!(
            query_id = self.query_id.0,
            dataset = %self.dataset,
            kind = self.kind,
            items,
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "query completed"
        );
    }

    pub fn finish_err(mut self, err: &TempoError) {
        self.closed = true;
        tracing::warn!(
            query_id = self.query_id.0,
            dataset = %self.dataset,
            kind = self.kind,
            kind_class = ?err.kind(),
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "query failed: {}",
            err
        );
    }
}

impl Drop for QueryTrace {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                query_id = self.query_id.0,
                dataset = %self.dataset,
                "query trace dropped without a final response"
            );
        }
    }
}
