//! Durable storage abstraction.
//!
//! The [`ContentStore`] trait defines every storage operation the
//! pipeline needs, enabling pluggable backends (SQLite, in-memory for
//! tests). Each bulk call is one transactional scope: it commits or
//! rolls back as a unit, and mutating calls write their change-log rows
//! atomically with the data they mutate.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::batch::SyncBatch;
use crate::error::Result;
use crate::models::{ContentChangeLog, PersistedContent};

/// Abstract durable store for canonical content and audit records.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_by_ids`](ContentStore::get_by_ids) | Load persisted records for a set of ids |
/// | [`get_all`](ContentStore::get_all) | Load every persisted record |
/// | [`bulk_upsert`](ContentStore::bulk_upsert) | Transactionally write one chunk + its change log |
/// | [`bulk_delete`](ContentStore::bulk_delete) | Transactionally delete by id list + change log |
/// | [`bulk_update_scores`](ContentStore::bulk_update_scores) | Re-score without touching content |
/// | [`record_sync_batch`](ContentStore::record_sync_batch) | Persist a finalized run record |
/// | [`recent_sync_batches`](ContentStore::recent_sync_batches) | Audit inspection |
/// | [`change_log_for_batch`](ContentStore::change_log_for_batch) | Audit trail for one run |
/// | [`get_checkpoint`](ContentStore::get_checkpoint) / [`set_checkpoint`](ContentStore::set_checkpoint) | Consumer position tracking |
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Load the persisted records matching the given ids.
    ///
    /// Missing ids are silently absent from the result; they are not
    /// an error.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<PersistedContent>>;

    /// Load every persisted record.
    async fn get_all(&self) -> Result<Vec<PersistedContent>>;

    /// Upsert one chunk of records and append their change-log rows in
    /// a single transaction. Returns rows affected.
    async fn bulk_upsert(
        &self,
        records: &[PersistedContent],
        log: &[ContentChangeLog],
    ) -> Result<u64>;

    /// Delete the given ids and append their change-log rows in a
    /// single transaction. Returns rows affected.
    async fn bulk_delete(&self, ids: &[String], log: &[ContentChangeLog]) -> Result<u64>;

    /// Update scores for the given (id, score) pairs in one
    /// transaction. Returns rows affected.
    async fn bulk_update_scores(&self, scores: &[(String, f64)]) -> Result<u64>;

    /// Persist one finalized sync batch audit record.
    async fn record_sync_batch(&self, batch: &SyncBatch) -> Result<()>;

    /// Most recent sync batches, newest first.
    async fn recent_sync_batches(&self, limit: i64) -> Result<Vec<SyncBatch>>;

    /// Change-log rows written under the given batch correlation id.
    async fn change_log_for_batch(&self, batch_id: Uuid) -> Result<Vec<ContentChangeLog>>;

    /// Read a named checkpoint cursor, if one was ever written.
    async fn get_checkpoint(&self, name: &str) -> Result<Option<String>>;

    /// Write a named checkpoint cursor.
    async fn set_checkpoint(&self, name: &str, cursor: &str) -> Result<()>;
}
