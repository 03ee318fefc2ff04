//! SQLite-backed [`ContentStore`] implementation.
//!
//! Every bulk call opens one transaction: the chunk and its change-log
//! rows commit or roll back together, which is what gives the
//! persistence gateway its per-chunk atomicity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::batch::SyncBatch;
use crate::error::{Fault, Result};
use crate::models::{
    CanonicalContent, ChangeType, ContentChangeLog, ContentMetrics, ContentType, PersistedContent,
};
use crate::store::ContentStore;

/// SQLite store over a shared connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_else(Utc::now)
}

fn parse_content_type(raw: &str) -> Result<ContentType> {
    match raw {
        "video" => Ok(ContentType::Video),
        "article" => Ok(ContentType::Article),
        other => Err(Fault::persistence(format!(
            "unknown content type '{}' in storage",
            other
        ))),
    }
}

fn parse_change_type(raw: &str) -> Result<ChangeType> {
    match raw {
        "created" => Ok(ChangeType::Created),
        "updated" => Ok(ChangeType::Updated),
        "deleted" => Ok(ChangeType::Deleted),
        other => Err(Fault::persistence(format!(
            "unknown change type '{}' in storage",
            other
        ))),
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Fault::persistence(format!("bad uuid in storage: {}", e)))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<PersistedContent> {
    let content_type = parse_content_type(&row.get::<String, _>("content_type"))?;
    let categories: Vec<String> = serde_json::from_str(&row.get::<String, _>("categories_json"))?;
    let metrics: ContentMetrics = serde_json::from_str(&row.get::<String, _>("metrics_json"))?;

    let content = CanonicalContent {
        id: row.get("id"),
        title: row.get("title"),
        content_type,
        published_at: from_ts(row.get("published_at")),
        categories,
        source_provider: row.get("source_provider"),
        transformed_at: from_ts(row.get("transformed_at")),
        metrics,
    };

    Ok(PersistedContent {
        content,
        score: row.get("score"),
        content_hash: row.get("content_hash"),
        version: row.get("version"),
        created_at: from_ts(row.get("created_at")),
        updated_at: from_ts(row.get("updated_at")),
    })
}

fn row_to_batch(row: &sqlx::sqlite::SqliteRow) -> Result<SyncBatch> {
    let providers: Vec<String> =
        serde_json::from_str(&row.get::<String, _>("source_providers_json"))?;
    Ok(SyncBatch {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        started_at: from_ts(row.get("started_at")),
        completed_at: row.get::<Option<i64>, _>("completed_at").map(from_ts),
        total_items_fetched: row.get::<i64, _>("total_items_fetched") as u64,
        items_created: row.get::<i64, _>("items_created") as u64,
        items_updated: row.get::<i64, _>("items_updated") as u64,
        items_unchanged: row.get::<i64, _>("items_unchanged") as u64,
        items_failed: row.get::<i64, _>("items_failed") as u64,
        duration_ms: row.get("duration_ms"),
        avg_item_processing_ms: row.get("avg_item_processing_ms"),
        source_providers: providers,
        database_rows_affected: row.get::<i64, _>("database_rows_affected") as u64,
        is_successful: row.get::<i64, _>("is_successful") != 0,
        error_message: row.get("error_message"),
    })
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<PersistedContent>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query("SELECT * FROM contents WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                records.push(row_to_record(&row)?);
            }
        }
        Ok(records)
    }

    async fn get_all(&self) -> Result<Vec<PersistedContent>> {
        let rows = sqlx::query("SELECT * FROM contents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn bulk_upsert(
        &self,
        records: &[PersistedContent],
        log: &[ContentChangeLog],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;

        for record in records {
            let content = &record.content;
            let result = sqlx::query(
                r#"
                INSERT INTO contents (
                    id, title, content_type, published_at, categories_json,
                    source_provider, transformed_at, metrics_json,
                    score, content_hash, version, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    content_type = excluded.content_type,
                    published_at = excluded.published_at,
                    categories_json = excluded.categories_json,
                    source_provider = excluded.source_provider,
                    transformed_at = excluded.transformed_at,
                    metrics_json = excluded.metrics_json,
                    score = excluded.score,
                    content_hash = excluded.content_hash,
                    version = excluded.version,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&content.id)
            .bind(&content.title)
            .bind(content.content_type.as_str())
            .bind(ts(content.published_at))
            .bind(serde_json::to_string(&content.categories)?)
            .bind(&content.source_provider)
            .bind(ts(content.transformed_at))
            .bind(serde_json::to_string(&content.metrics)?)
            .bind(record.score)
            .bind(&record.content_hash)
            .bind(record.version)
            .bind(ts(record.created_at))
            .bind(ts(record.updated_at))
            .execute(&mut *tx)
            .await?;
            affected += result.rows_affected();
        }

        for entry in log {
            sqlx::query(
                r#"
                INSERT INTO content_change_log
                    (id, content_id, change_type, content_hash, batch_id, changed_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.id.to_string())
            .bind(&entry.content_id)
            .bind(entry.change_type.as_str())
            .bind(&entry.content_hash)
            .bind(entry.batch_id.to_string())
            .bind(ts(entry.changed_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(affected)
    }

    async fn bulk_delete(&self, ids: &[String], log: &[ContentChangeLog]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;

        for id in ids {
            let result = sqlx::query("DELETE FROM contents WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            affected += result.rows_affected();
        }

        for entry in log {
            sqlx::query(
                r#"
                INSERT INTO content_change_log
                    (id, content_id, change_type, content_hash, batch_id, changed_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.id.to_string())
            .bind(&entry.content_id)
            .bind(entry.change_type.as_str())
            .bind(&entry.content_hash)
            .bind(entry.batch_id.to_string())
            .bind(ts(entry.changed_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(affected)
    }

    async fn bulk_update_scores(&self, scores: &[(String, f64)]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let now = ts(Utc::now());
        let mut affected = 0u64;

        for (id, score) in scores {
            let result = sqlx::query("UPDATE contents SET score = ?, updated_at = ? WHERE id = ?")
                .bind(score)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            affected += result.rows_affected();
        }

        tx.commit().await?;
        Ok(affected)
    }

    async fn record_sync_batch(&self, batch: &SyncBatch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sync_batches (
                id, started_at, completed_at, total_items_fetched,
                items_created, items_updated, items_unchanged, items_failed,
                duration_ms, avg_item_processing_ms, source_providers_json,
                database_rows_affected, is_successful, error_message
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch.id.to_string())
        .bind(ts(batch.started_at))
        .bind(batch.completed_at.map(ts))
        .bind(batch.total_items_fetched as i64)
        .bind(batch.items_created as i64)
        .bind(batch.items_updated as i64)
        .bind(batch.items_unchanged as i64)
        .bind(batch.items_failed as i64)
        .bind(batch.duration_ms)
        .bind(batch.avg_item_processing_ms)
        .bind(serde_json::to_string(&batch.source_providers)?)
        .bind(batch.database_rows_affected as i64)
        .bind(batch.is_successful as i64)
        .bind(&batch.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_sync_batches(&self, limit: i64) -> Result<Vec<SyncBatch>> {
        let rows = sqlx::query("SELECT * FROM sync_batches ORDER BY started_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_batch).collect()
    }

    async fn change_log_for_batch(&self, batch_id: Uuid) -> Result<Vec<ContentChangeLog>> {
        let rows = sqlx::query(
            "SELECT * FROM content_change_log WHERE batch_id = ? ORDER BY changed_at",
        )
        .bind(batch_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ContentChangeLog {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    content_id: row.get("content_id"),
                    change_type: parse_change_type(&row.get::<String, _>("change_type"))?,
                    content_hash: row.get("content_hash"),
                    batch_id: parse_uuid(&row.get::<String, _>("batch_id"))?,
                    changed_at: from_ts(row.get("changed_at")),
                })
            })
            .collect()
    }

    async fn get_checkpoint(&self, name: &str) -> Result<Option<String>> {
        let cursor: Option<String> =
            sqlx::query_scalar("SELECT cursor FROM checkpoints WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(cursor)
    }

    async fn set_checkpoint(&self, name: &str, cursor: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (name, cursor, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(cursor)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
