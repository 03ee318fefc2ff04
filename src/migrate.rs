//! Schema bootstrap. All statements are idempotent.

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Canonical content plus its persistence envelope
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content_type TEXT NOT NULL,
            published_at INTEGER NOT NULL,
            categories_json TEXT NOT NULL DEFAULT '[]',
            source_provider TEXT NOT NULL,
            transformed_at INTEGER NOT NULL,
            metrics_json TEXT NOT NULL DEFAULT '{}',
            score REAL NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only audit trail, one row per mutated item
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_change_log (
            id TEXT PRIMARY KEY,
            content_id TEXT NOT NULL,
            change_type TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            changed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_change_log_batch ON content_change_log(batch_id)",
    )
    .execute(pool)
    .await?;

    // One audit record per synchronization run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_batches (
            id TEXT PRIMARY KEY,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            total_items_fetched INTEGER NOT NULL DEFAULT 0,
            items_created INTEGER NOT NULL DEFAULT 0,
            items_updated INTEGER NOT NULL DEFAULT 0,
            items_unchanged INTEGER NOT NULL DEFAULT 0,
            items_failed INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            avg_item_processing_ms REAL NOT NULL DEFAULT 0,
            source_providers_json TEXT NOT NULL DEFAULT '[]',
            database_rows_affected INTEGER NOT NULL DEFAULT 0,
            is_successful INTEGER NOT NULL DEFAULT 0,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Consumer position tracking
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            name TEXT PRIMARY KEY,
            cursor TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Search-side projection, rebuilt wholesale per (re)index
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_documents (
            content_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content_type TEXT NOT NULL,
            categories_json TEXT NOT NULL DEFAULT '[]',
            score REAL NOT NULL DEFAULT 0,
            published_at INTEGER NOT NULL,
            search_text TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS index over the denormalized search text
    sqlx::query(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS search_fts USING fts5(
            content_id UNINDEXED,
            search_text
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
