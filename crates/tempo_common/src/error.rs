use thiserror::Error;

use crate::types::{DatasetRef, NodeAddress, ShardId};

/// Convenience alias for `Result<T, TempoError>`.
pub type TempoResult<T> = Result<T, TempoError>;

/// Error classification for retry/escalation decisions.
///
/// - `UserError`   — bad plan, unknown column, wrong arity; never retried
/// - `Retryable`   — node unreachable or shard recovering; re-route with a
///   fresh shard-map snapshot
/// - `Transient`   — timeout, cancellation, cluster not ready; client MAY
///   retry, the engine does not
/// - `InternalBug` — should never happen; logged with the query trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Retryable,
    Transient,
    InternalBug,
}

/// Validation and planning errors. Always user errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("No such aggregation function {0}")]
    NoSuchFunction(String),

    #[error("Wrong number of arguments: got {given}, expected {expected}")]
    WrongArity { given: usize, expected: usize },

    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("Dataset {0} has no timestamp column")]
    NoTimestampColumn(DatasetRef),

    #[error("Unsupported query plan: {0}")]
    UnsupportedPlan(String),
}

/// Routing and membership errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("Shard {0} is not active")]
    ShardNotActive(ShardId),

    #[error("Shard {0} is recovering")]
    ShardRecovering(ShardId),

    #[error("Node unavailable: {0}")]
    NodeUnavailable(NodeAddress),

    #[error("Cluster not ready: no shard map received yet")]
    NotReady,

    #[error("Router is draining, new queries are rejected")]
    Draining,

    #[error("No seed nodes discovered within {0}s")]
    SeedsTimeout(u64),

    #[error("Membership error: {0}")]
    Membership(String),
}

/// Dataset metastore errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Dataset not found: {0}")]
    DatasetNotFound(DatasetRef),

    #[error("Dataset already exists: {0}")]
    DatasetExists(DatasetRef),

    #[error("Invalid dataset definition: {0}")]
    InvalidSchema(String),
}

/// Result encode/decode errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Truncated record: needed {expected} bytes, had {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid UTF-8 in field {0}")]
    InvalidUtf8(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Top-level error type that all layer-specific errors convert into.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TempoError {
    #[error("Bad query: {0}")]
    Plan(#[from] PlanError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Query timed out")]
    Timeout,

    #[error("Query cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TempoError {
    /// Classify this error for the engine's retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TempoError::Plan(_) => ErrorKind::UserError,
            TempoError::Store(_) => ErrorKind::UserError,

            TempoError::Cluster(ClusterError::ShardNotActive(_)) => ErrorKind::UserError,
            TempoError::Cluster(ClusterError::ShardRecovering(_)) => ErrorKind::Retryable,
            TempoError::Cluster(ClusterError::NodeUnavailable(_)) => ErrorKind::Retryable,
            TempoError::Cluster(_) => ErrorKind::Transient,

            TempoError::Timeout => ErrorKind::Transient,
            TempoError::Cancelled => ErrorKind::Transient,

            TempoError::Codec(_) => ErrorKind::InternalBug,
            TempoError::Internal(_) => ErrorKind::InternalBug,
        }
    }

    /// True if the engine should re-route this failure via a fresh
    /// shard-map snapshot.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Retryable)
    }

    /// True if this is a bad-input error that must never be retried.
    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// Construct an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        TempoError::Internal(msg.into())
    }

    /// Add a context prefix to the error message, preserving classification
    /// for the structured variants.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        let ctx = ctx.into();
        match self {
            TempoError::Internal(msg) => TempoError::Internal(format!("{ctx}: {msg}")),
            other => match other.kind() {
                ErrorKind::InternalBug => TempoError::Internal(format!("{ctx}: {other}")),
                _ => other,
            },
        }
    }
}

#[cfg(test)]
mod error_classification {
    use super::*;

    #[test]
    fn test_plan_errors_are_user_errors() {
        let e = TempoError::Plan(PlanError::UnknownColumn("nope".into()));
        assert_eq!(e.kind(), ErrorKind::UserError);
        assert!(e.is_user_error());
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_wrong_arity_is_user_error() {
        let e = TempoError::Plan(PlanError::WrongArity {
            given: 2,
            expected: 1,
        });
        assert_eq!(e.kind(), ErrorKind::UserError);
    }

    #[test]
    fn test_node_unavailable_is_retryable() {
        let e = TempoError::Cluster(ClusterError::NodeUnavailable(NodeAddress::new("n1:8060")));
        assert_eq!(e.kind(), ErrorKind::Retryable);
        assert!(e.is_retryable());
    }

    #[test]
    fn test_shard_recovering_is_retryable() {
        let e = TempoError::Cluster(ClusterError::ShardRecovering(ShardId(3)));
        assert!(e.is_retryable());
    }

    #[test]
    fn test_shard_not_active_is_user_error() {
        let e = TempoError::Cluster(ClusterError::ShardNotActive(ShardId(1)));
        assert_eq!(e.kind(), ErrorKind::UserError);
    }

    #[test]
    fn test_timeout_is_transient_not_retryable() {
        assert_eq!(TempoError::Timeout.kind(), ErrorKind::Transient);
        assert!(!TempoError::Timeout.is_retryable());
    }

    #[test]
    fn test_codec_is_internal_bug() {
        let e = TempoError::Codec(CodecError::Truncated {
            expected: 8,
            actual: 3,
        });
        assert!(e.is_internal_bug());
    }

    #[test]
    fn test_with_context_preserves_user_errors() {
        let e = TempoError::Plan(PlanError::BadArgument("x".into()));
        let e2 = e.clone().with_context("validate");
        assert_eq!(e, e2);
    }

    #[test]
    fn test_with_context_prefixes_internal() {
        let e = TempoError::internal("boom").with_context("gather");
        assert_eq!(e.to_string(), "Internal error: gather: boom");
    }

    #[test]
    fn test_bad_query_message_shape() {
        let e = TempoError::Plan(PlanError::NoSuchFunction("Median".into()));
        assert_eq!(e.to_string(), "Bad query: No such aggregation function Median");
    }
}
