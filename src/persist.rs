//! Bulk persistence gateway.
//!
//! Applies a change-detection partition as batched transactional
//! writes. New and updated items are chunked (default 100 per chunk);
//! each chunk is one `bulk_upsert` call and therefore one transaction,
//! writing the records and their change-log rows together.
//!
//! Partial-batch trade-off: a failing chunk rolls back only itself.
//! Chunks committed before the failure are retained, the remaining
//! chunks are skipped, and the run is marked failed. Cancellation is
//! observed between chunks only — an in-flight chunk always commits or
//! rolls back whole.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::detect::ChangeDetectionResult;
use crate::models::{ChangeType, ContentChangeLog, PersistedContent};
use crate::score::calculate_score;
use crate::store::ContentStore;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Result of one gateway application.
#[derive(Debug, Default)]
pub struct PersistOutcome {
    pub rows_affected: u64,
    pub chunks_committed: usize,
    pub chunks_total: usize,
    /// Set when a chunk failed; earlier chunks stay committed.
    pub failure: Option<String>,
    /// Set when cancellation stopped the run between chunks.
    pub cancelled: bool,
}

impl PersistOutcome {
    /// Whether every chunk committed.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }
}

/// Applies classified changes to durable storage in transactional
/// chunks. Sole constructor of [`PersistedContent`] records.
pub struct BulkPersistenceGateway {
    store: Arc<dyn ContentStore>,
    batch_size: usize,
}

impl BulkPersistenceGateway {
    pub fn new(store: Arc<dyn ContentStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn with_default_batch_size(store: Arc<dyn ContentStore>) -> Self {
        Self::new(store, DEFAULT_BATCH_SIZE)
    }

    /// Apply new and updated items; unchanged items are no-ops.
    pub async fn apply(
        &self,
        detection: &ChangeDetectionResult,
        batch_id: Uuid,
        cancel: &CancellationToken,
    ) -> PersistOutcome {
        let now = Utc::now();
        let mut work: Vec<(PersistedContent, ContentChangeLog)> = Vec::new();

        for item in &detection.new_items {
            let record = PersistedContent {
                score: calculate_score(&item.content, now),
                content_hash: item.content_hash.clone(),
                version: 1,
                created_at: now,
                updated_at: now,
                content: item.content.clone(),
            };
            let entry = ContentChangeLog::new(
                &record.content.id,
                ChangeType::Created,
                &record.content_hash,
                batch_id,
            );
            work.push((record, entry));
        }

        for item in &detection.updated_items {
            let record = PersistedContent {
                score: calculate_score(&item.content, now),
                content_hash: item.content_hash.clone(),
                version: item.prior_version + 1,
                created_at: now,
                updated_at: now,
                content: item.content.clone(),
            };
            let entry = ContentChangeLog::new(
                &record.content.id,
                ChangeType::Updated,
                &record.content_hash,
                batch_id,
            );
            work.push((record, entry));
        }

        let mut outcome = PersistOutcome {
            chunks_total: work.len().div_ceil(self.batch_size),
            ..Default::default()
        };

        for chunk in work.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                info!(
                    batch_id = %batch_id,
                    committed = outcome.chunks_committed,
                    "persistence cancelled between chunks"
                );
                outcome.cancelled = true;
                return outcome;
            }

            let records: Vec<PersistedContent> = chunk.iter().map(|(r, _)| r.clone()).collect();
            let log: Vec<ContentChangeLog> = chunk.iter().map(|(_, l)| l.clone()).collect();

            match self.store.bulk_upsert(&records, &log).await {
                Ok(rows) => {
                    outcome.rows_affected += rows;
                    outcome.chunks_committed += 1;
                }
                Err(fault) => {
                    error!(
                        batch_id = %batch_id,
                        chunk = outcome.chunks_committed,
                        %fault,
                        "persistence chunk failed; earlier chunks retained"
                    );
                    outcome.failure = Some(fault.to_string());
                    return outcome;
                }
            }
        }

        info!(
            batch_id = %batch_id,
            rows = outcome.rows_affected,
            chunks = outcome.chunks_committed,
            "persisted change set"
        );
        outcome
    }

    /// Delete the given records, chunked, with change-log rows.
    pub async fn apply_deletions(
        &self,
        records: &[PersistedContent],
        batch_id: Uuid,
        cancel: &CancellationToken,
    ) -> PersistOutcome {
        let mut outcome = PersistOutcome {
            chunks_total: records.len().div_ceil(self.batch_size),
            ..Default::default()
        };

        for chunk in records.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return outcome;
            }

            let ids: Vec<String> = chunk.iter().map(|r| r.content.id.clone()).collect();
            let log: Vec<ContentChangeLog> = chunk
                .iter()
                .map(|r| {
                    ContentChangeLog::new(
                        &r.content.id,
                        ChangeType::Deleted,
                        &r.content_hash,
                        batch_id,
                    )
                })
                .collect();

            match self.store.bulk_delete(&ids, &log).await {
                Ok(rows) => {
                    outcome.rows_affected += rows;
                    outcome.chunks_committed += 1;
                }
                Err(fault) => {
                    error!(batch_id = %batch_id, %fault, "deletion chunk failed");
                    outcome.failure = Some(fault.to_string());
                    return outcome;
                }
            }
        }

        outcome
    }
}
