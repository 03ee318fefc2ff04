//! Unified fault taxonomy for the synchronization and search pipeline.
//!
//! Local item faults ([`Fault::Validation`], per-document index
//! failures) never abort the surrounding batch; faults threatening
//! transactional or delivery integrity ([`Fault::Persistence`],
//! [`Fault::Publish`]) mark the run failed with a captured message.
//! Search callers never observe [`Fault::Strategy`] — the orchestrator
//! converts it into a typed empty result.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Fault>;

/// Pipeline fault classification.
#[derive(Error, Debug)]
pub enum Fault {
    /// A malformed item: skipped, counted in the run's failed items,
    /// the batch continues.
    #[error("validation fault: {0}")]
    Validation(String),

    /// Provider, backend, or bus temporarily unreachable; retryable
    /// with bounded backoff.
    #[error("transient fault in {context}: {message}")]
    Transient { context: String, message: String },

    /// A persistence chunk failed and rolled back. Previously committed
    /// chunks are retained; the run is marked failed.
    #[error("persistence fault: {0}")]
    Persistence(String),

    /// A change notification could not be delivered after retries. The
    /// run is marked failed regardless of persistence outcome.
    #[error("publish fault: {0}")]
    Publish(String),

    /// Indexing failed for the whole request (total failure) or must be
    /// retried. Per-document failures stay inside `IndexResult`.
    #[error("index fault: {0}")]
    Index(String),

    /// A search strategy failed during execution. Handled internally by
    /// the orchestrator (one fallback, else empty result).
    #[error("strategy fault in '{strategy}': {message}")]
    Strategy { strategy: String, message: String },

    /// No strategy registered or no strategy matches every request.
    /// Fatal, fails fast at construction.
    #[error("configuration fault: {0}")]
    Configuration(String),

    /// I/O error surfaced at a storage boundary.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error surfaced at a storage boundary.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Fault {
    /// Create a validation fault.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transient fault with context.
    pub fn transient(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transient {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence fault.
    pub fn persistence(message: impl fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }

    /// Create a publish fault.
    pub fn publish(message: impl fmt::Display) -> Self {
        Self::Publish(message.to_string())
    }

    /// Create an index fault.
    pub fn index(message: impl fmt::Display) -> Self {
        Self::Index(message.to_string())
    }

    /// Create a strategy fault.
    pub fn strategy(strategy: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration fault.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether this fault is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Index(_) | Self::Db(_))
    }
}
