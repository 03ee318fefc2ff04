//! Synchronization run audit record.
//!
//! One [`SyncBatch`] is created per run and mutated through consuming
//! state transitions; `complete_successfully`/`fail` freeze the derived
//! timing metrics. Single finalization is a caller convention checked
//! via `is_finalized`, not enforced by the type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Fault, Result};

/// Audit record for one synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBatch {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_items_fetched: u64,
    pub items_created: u64,
    pub items_updated: u64,
    pub items_unchanged: u64,
    pub items_failed: u64,
    pub duration_ms: i64,
    pub avg_item_processing_ms: f64,
    pub source_providers: Vec<String>,
    pub database_rows_affected: u64,
    pub is_successful: bool,
    pub error_message: Option<String>,
}

impl SyncBatch {
    /// Start a new run over the given providers.
    ///
    /// At least one provider is required.
    pub fn start(source_providers: Vec<String>) -> Result<Self> {
        if source_providers.is_empty() {
            return Err(Fault::validation(
                "a sync batch requires at least one source provider",
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            total_items_fetched: 0,
            items_created: 0,
            items_updated: 0,
            items_unchanged: 0,
            items_failed: 0,
            duration_ms: 0,
            avg_item_processing_ms: 0.0,
            source_providers,
            database_rows_affected: 0,
            is_successful: false,
            error_message: None,
        })
    }

    /// Record the merged fetch count across all providers.
    pub fn record_items_fetched(mut self, count: u64) -> Self {
        self.total_items_fetched = count;
        self
    }

    /// Record the change-detection partition counts.
    pub fn record_change_results(mut self, created: u64, updated: u64, unchanged: u64) -> Self {
        self.items_created = created;
        self.items_updated = updated;
        self.items_unchanged = unchanged;
        self
    }

    /// Add items that failed validation or processing.
    pub fn record_failed_items(mut self, count: u64) -> Self {
        self.items_failed += count;
        self
    }

    /// Accumulate database rows affected by persistence calls.
    pub fn record_rows_affected(mut self, rows: u64) -> Self {
        self.database_rows_affected += rows;
        self
    }

    /// Finalize the run as successful, freezing timing metrics.
    pub fn complete_successfully(mut self) -> Self {
        self.is_successful = true;
        self.finalize()
    }

    /// Finalize the run as failed with a captured message.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.is_successful = false;
        self.error_message = Some(message.into());
        self.finalize()
    }

    fn finalize(mut self) -> Self {
        let completed = Utc::now();
        self.completed_at = Some(completed);
        self.duration_ms = (completed - self.started_at).num_milliseconds().max(0);
        self.avg_item_processing_ms = if self.total_items_fetched == 0 {
            0.0
        } else {
            self.duration_ms as f64 / self.total_items_fetched as f64
        };
        self
    }

    /// Whether the record has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }
}
