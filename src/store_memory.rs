//! In-memory [`ContentStore`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread
//! safety. Every bulk call takes the write lock once, which mirrors the
//! one-transaction-per-call contract of the SQLite store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::batch::SyncBatch;
use crate::error::Result;
use crate::models::{ContentChangeLog, PersistedContent};
use crate::store::ContentStore;

/// In-memory store for tests and examples.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, PersistedContent>>,
    change_log: RwLock<Vec<ContentChangeLog>>,
    batches: RwLock<Vec<SyncBatch>>,
    checkpoints: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records; test helper.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full change log across all batches; test helper.
    pub fn change_log(&self) -> Vec<ContentChangeLog> {
        self.change_log.read().unwrap().clone()
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<PersistedContent>> {
        let records = self.records.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).cloned())
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<PersistedContent>> {
        let records = self.records.read().unwrap();
        let mut all: Vec<PersistedContent> = records.values().cloned().collect();
        all.sort_by(|a, b| a.content.id.cmp(&b.content.id));
        Ok(all)
    }

    async fn bulk_upsert(
        &self,
        records: &[PersistedContent],
        log: &[ContentChangeLog],
    ) -> Result<u64> {
        let mut map = self.records.write().unwrap();
        for record in records {
            let mut record = record.clone();
            // Replacement keeps the original creation time, matching
            // the SQLite ON CONFLICT clause.
            if let Some(existing) = map.get(&record.content.id) {
                record.created_at = existing.created_at;
            }
            map.insert(record.content.id.clone(), record);
        }
        self.change_log.write().unwrap().extend_from_slice(log);
        Ok(records.len() as u64)
    }

    async fn bulk_delete(&self, ids: &[String], log: &[ContentChangeLog]) -> Result<u64> {
        let mut map = self.records.write().unwrap();
        let mut affected = 0u64;
        for id in ids {
            if map.remove(id).is_some() {
                affected += 1;
            }
        }
        self.change_log.write().unwrap().extend_from_slice(log);
        Ok(affected)
    }

    async fn bulk_update_scores(&self, scores: &[(String, f64)]) -> Result<u64> {
        let mut map = self.records.write().unwrap();
        let mut affected = 0u64;
        for (id, score) in scores {
            if let Some(record) = map.get_mut(id) {
                record.score = *score;
                record.updated_at = chrono::Utc::now();
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn record_sync_batch(&self, batch: &SyncBatch) -> Result<()> {
        self.batches.write().unwrap().push(batch.clone());
        Ok(())
    }

    async fn recent_sync_batches(&self, limit: i64) -> Result<Vec<SyncBatch>> {
        let batches = self.batches.read().unwrap();
        let mut recent: Vec<SyncBatch> = batches.clone();
        recent.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        recent.truncate(limit.max(0) as usize);
        Ok(recent)
    }

    async fn change_log_for_batch(&self, batch_id: Uuid) -> Result<Vec<ContentChangeLog>> {
        let log = self.change_log.read().unwrap();
        Ok(log
            .iter()
            .filter(|entry| entry.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn get_checkpoint(&self, name: &str) -> Result<Option<String>> {
        Ok(self.checkpoints.read().unwrap().get(name).cloned())
    }

    async fn set_checkpoint(&self, name: &str, cursor: &str) -> Result<()> {
        self.checkpoints
            .write()
            .unwrap()
            .insert(name.to_string(), cursor.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::content_hash;
    use crate::models::{CanonicalContent, ChangeType, ContentMetrics, ContentType};
    use chrono::{Duration, Utc};

    fn make_record(id: &str) -> PersistedContent {
        let content = CanonicalContent::new(
            id,
            format!("Title {}", id),
            ContentType::Article,
            Utc::now() - Duration::days(3),
            vec!["rust".into()],
            "devblog",
            ContentMetrics::Article {
                reading_time_minutes: 4,
                reactions: 9,
            },
        )
        .unwrap();
        PersistedContent {
            content_hash: content_hash(&content),
            content,
            score: 2.5,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_then_get_by_ids_round_trip() {
        let store = InMemoryStore::new();
        let batch_id = Uuid::new_v4();
        let record = make_record("a1");
        let log = vec![ContentChangeLog::new(
            "a1",
            ChangeType::Created,
            &record.content_hash,
            batch_id,
        )];

        let affected = store.bulk_upsert(&[record.clone()], &log).await.unwrap();
        assert_eq!(affected, 1);

        let loaded = store.get_by_ids(&["a1".to_string()]).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content_hash, record.content_hash);
        assert_eq!(loaded[0].score, record.score);

        let audit = store.change_log_for_batch(batch_id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].change_type, ChangeType::Created);
    }

    #[tokio::test]
    async fn test_missing_ids_are_absent_not_errors() {
        let store = InMemoryStore::new();
        store
            .bulk_upsert(&[make_record("a1")], &[])
            .await
            .unwrap();
        let loaded = store
            .get_by_ids(&["a1".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_delete_counts_only_present_rows() {
        let store = InMemoryStore::new();
        store
            .bulk_upsert(&[make_record("a1"), make_record("a2")], &[])
            .await
            .unwrap();
        let affected = store
            .bulk_delete(&["a1".to_string(), "ghost".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_update_scores() {
        let store = InMemoryStore::new();
        store.bulk_upsert(&[make_record("a1")], &[]).await.unwrap();
        let affected = store
            .bulk_update_scores(&[("a1".to_string(), 9.75)])
            .await
            .unwrap();
        assert_eq!(affected, 1);
        let loaded = store.get_by_ids(&["a1".to_string()]).await.unwrap();
        assert_eq!(loaded[0].score, 9.75);
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let store = InMemoryStore::new();
        assert!(store.get_checkpoint("consumer").await.unwrap().is_none());
        store.set_checkpoint("consumer", "42").await.unwrap();
        assert_eq!(
            store.get_checkpoint("consumer").await.unwrap().as_deref(),
            Some("42")
        );
    }
}
