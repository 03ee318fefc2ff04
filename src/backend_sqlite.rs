//! SQLite FTS5-backed [`SearchBackend`].
//!
//! Each document is indexed in its own transaction as a
//! delete-then-insert pair across `search_documents` and `search_fts`,
//! so a malformed document fails alone and re-indexing the same id is a
//! clean replace.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::backend::{IndexResult, SearchBackend};
use crate::error::{Fault, Result};
use crate::models::{ContentType, SearchDocument};
use crate::query::{
    SearchHit, SearchMetadata, SearchRequest, SearchResult, SortField, SortOrder,
};

#[derive(Clone)]
pub struct SqliteSearchBackend {
    pool: SqlitePool,
}

impl SqliteSearchBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn index_one(&self, doc: &SearchDocument) -> Result<()> {
        let categories_json = serde_json::to_string(&doc.categories)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM search_documents WHERE content_id = ?")
            .bind(&doc.content_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM search_fts WHERE content_id = ?")
            .bind(&doc.content_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO search_documents
                (content_id, title, content_type, categories_json, score, published_at, search_text)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.content_id)
        .bind(&doc.title)
        .bind(doc.content_type.as_str())
        .bind(&categories_json)
        .bind(doc.score)
        .bind(doc.published_at)
        .bind(&doc.search_text)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO search_fts (content_id, search_text) VALUES (?, ?)")
            .bind(&doc.content_id)
            .bind(&doc.search_text)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn parse_content_type(raw: &str) -> Result<ContentType> {
    match raw {
        "video" => Ok(ContentType::Video),
        "article" => Ok(ContentType::Article),
        other => Err(Fault::index(format!(
            "unknown content type '{}' in index",
            other
        ))),
    }
}

/// Quote each whitespace token so user input cannot inject FTS5 query
/// syntax.
fn fts_match_expression(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn order_clause(request: &SearchRequest) -> &'static str {
    match (request.sort_field, request.sort_order) {
        (SortField::Score, SortOrder::Descending) => "d.score DESC, d.content_id ASC",
        (SortField::Score, SortOrder::Ascending) => "d.score ASC, d.content_id ASC",
        (SortField::PublishedAt, SortOrder::Descending) => {
            "d.published_at DESC, d.content_id ASC"
        }
        (SortField::PublishedAt, SortOrder::Ascending) => "d.published_at ASC, d.content_id ASC",
    }
}

fn row_to_hit(row: &sqlx::sqlite::SqliteRow, relevance: Option<f64>) -> Result<SearchHit> {
    let categories: Vec<String> = serde_json::from_str(&row.get::<String, _>("categories_json"))?;
    Ok(SearchHit {
        content_id: row.get("content_id"),
        title: row.get("title"),
        content_type: parse_content_type(&row.get::<String, _>("content_type"))?,
        categories,
        score: row.get("score"),
        published_at: row.get("published_at"),
        relevance,
    })
}

#[async_trait]
impl SearchBackend for SqliteSearchBackend {
    fn name(&self) -> &str {
        "sqlite-fts"
    }

    async fn bulk_index(&self, documents: &[SearchDocument]) -> Result<IndexResult> {
        let started = Instant::now();
        let mut result = IndexResult {
            total_processed: documents.len(),
            ..Default::default()
        };

        for doc in documents {
            match self.index_one(doc).await {
                Ok(()) => result.success_count += 1,
                Err(fault) => {
                    warn!(content_id = %doc.content_id, error = %fault, "document failed to index");
                    result.failed_count += 1;
                    result.failed_ids.push(doc.content_id.clone());
                    result.error_message = Some(fault.to_string());
                }
            }
        }

        result.duration = started.elapsed();
        debug!(
            indexed = result.success_count,
            failed = result.failed_count,
            "bulk index finished"
        );
        Ok(result)
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<u64> {
        let mut removed = 0u64;
        for id in ids {
            let mut tx = self.pool.begin().await?;
            let outcome = sqlx::query("DELETE FROM search_documents WHERE content_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM search_fts WHERE content_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            removed += outcome.rows_affected();
        }
        Ok(removed)
    }

    async fn query(&self, request: &SearchRequest) -> Result<SearchResult> {
        let started = Instant::now();
        let (page, page_size) = request.normalized_paging();
        let offset = request.offset();

        let mut filters = String::new();
        if request.content_type.is_some() {
            filters.push_str(" AND d.content_type = ?");
        }
        if request.min_score.is_some() {
            filters.push_str(" AND d.score >= ?");
        }
        if request.max_score.is_some() {
            filters.push_str(" AND d.score <= ?");
        }

        // A blank keyword would render an empty MATCH expression, which
        // FTS5 rejects; treat it as no keyword at all.
        let keyword = request
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(fts_match_expression);

        let (count_sql, rows_sql) = if keyword.is_some() {
            (
                format!(
                    "SELECT COUNT(*) AS n FROM search_fts \
                     JOIN search_documents d ON d.content_id = search_fts.content_id \
                     WHERE search_fts MATCH ?{filters}"
                ),
                format!(
                    "SELECT d.content_id, d.title, d.content_type, d.categories_json, \
                            d.score, d.published_at, bm25(search_fts) AS relevance \
                     FROM search_fts \
                     JOIN search_documents d ON d.content_id = search_fts.content_id \
                     WHERE search_fts MATCH ?{filters} \
                     ORDER BY {} LIMIT ? OFFSET ?",
                    order_clause(request)
                ),
            )
        } else {
            (
                format!("SELECT COUNT(*) AS n FROM search_documents d WHERE 1 = 1{filters}"),
                format!(
                    "SELECT d.content_id, d.title, d.content_type, d.categories_json, \
                            d.score, d.published_at \
                     FROM search_documents d WHERE 1 = 1{filters} \
                     ORDER BY {} LIMIT ? OFFSET ?",
                    order_clause(request)
                ),
            )
        };

        let mut count_query = sqlx::query(&count_sql);
        let mut rows_query = sqlx::query(&rows_sql);
        if let Some(expr) = &keyword {
            count_query = count_query.bind(expr);
            rows_query = rows_query.bind(expr);
        }
        if let Some(ct) = request.content_type {
            count_query = count_query.bind(ct.as_str());
            rows_query = rows_query.bind(ct.as_str());
        }
        if let Some(min) = request.min_score {
            count_query = count_query.bind(min);
            rows_query = rows_query.bind(min);
        }
        if let Some(max) = request.max_score {
            count_query = count_query.bind(max);
            rows_query = rows_query.bind(max);
        }
        rows_query = rows_query.bind(page_size as i64).bind(offset as i64);

        let total_items: i64 = count_query.fetch_one(&self.pool).await?.get("n");
        let rows = rows_query.fetch_all(&self.pool).await?;

        let with_relevance = keyword.is_some();
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let relevance = if with_relevance {
                // bm25() is lower-is-better; negate so larger means
                // more relevant.
                Some(-row.get::<f64, _>("relevance"))
            } else {
                None
            };
            items.push(row_to_hit(row, relevance)?);
        }

        Ok(SearchResult {
            items,
            total_items: total_items as u64,
            page,
            page_size,
            metadata: SearchMetadata {
                strategy: String::new(),
                data_source: self.name().to_string(),
                latency_ms: started.elapsed().as_millis() as u64,
                cache_hit: false,
            },
        })
    }

    async fn document_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM search_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect;
    use crate::migrate::run_migrations;
    use tempfile::TempDir;

    async fn backend() -> (TempDir, SqliteSearchBackend) {
        let dir = TempDir::new().unwrap();
        let pool = connect(&dir.path().join("index.db")).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (dir, SqliteSearchBackend::new(pool))
    }

    fn doc(id: &str, title: &str, ct: ContentType, score: f64, published_at: i64) -> SearchDocument {
        SearchDocument {
            content_id: id.to_string(),
            title: title.to_string(),
            content_type: ct,
            categories: vec!["engineering".into()],
            score,
            published_at,
            search_text: format!("{} engineering", title),
        }
    }

    #[tokio::test]
    async fn test_keyword_match_and_filtering() {
        let (_dir, backend) = backend().await;
        backend
            .bulk_index(&[
                doc("v1", "Async Rust Deep Dive", ContentType::Video, 9.0, 100),
                doc("a1", "Rust Error Handling", ContentType::Article, 5.0, 200),
                doc("a2", "Kubernetes Basics", ContentType::Article, 7.0, 300),
            ])
            .await
            .unwrap();

        let result = backend.query(&SearchRequest::keyword("rust")).await.unwrap();
        assert_eq!(result.total_items, 2);
        assert_eq!(result.items[0].content_id, "v1");

        let request = SearchRequest {
            keyword: Some("rust".into()),
            content_type: Some(ContentType::Article),
            ..Default::default()
        };
        let result = backend.query(&request).await.unwrap();
        assert_eq!(result.total_items, 1);
        assert_eq!(result.items[0].content_id, "a1");
        assert!(result.items[0].relevance.is_some());
    }

    #[tokio::test]
    async fn test_reindex_replaces_document() {
        let (_dir, backend) = backend().await;
        backend
            .bulk_index(&[doc("a1", "Old Title", ContentType::Article, 1.0, 100)])
            .await
            .unwrap();
        backend
            .bulk_index(&[doc("a1", "Fresh Title", ContentType::Article, 2.0, 100)])
            .await
            .unwrap();

        assert_eq!(backend.document_count().await.unwrap(), 1);
        let result = backend.query(&SearchRequest::keyword("fresh")).await.unwrap();
        assert_eq!(result.total_items, 1);
        let stale = backend.query(&SearchRequest::keyword("old")).await.unwrap();
        assert_eq!(stale.total_items, 0);
    }

    #[tokio::test]
    async fn test_filter_only_query_sorts_and_pages() {
        let (_dir, backend) = backend().await;
        let docs: Vec<SearchDocument> = (1..=7)
            .map(|i| {
                doc(
                    &format!("a{}", i),
                    &format!("Post {}", i),
                    ContentType::Article,
                    i as f64,
                    i as i64,
                )
            })
            .collect();
        backend.bulk_index(&docs).await.unwrap();

        let request = SearchRequest {
            sort_field: SortField::PublishedAt,
            sort_order: SortOrder::Ascending,
            page: 2,
            page_size: 3,
            ..Default::default()
        };
        let result = backend.query(&request).await.unwrap();
        assert_eq!(result.total_items, 7);
        let ids: Vec<&str> = result.items.iter().map(|h| h.content_id.as_str()).collect();
        assert_eq!(ids, vec!["a4", "a5", "a6"]);
        assert!(result.items[0].relevance.is_none());
    }

    #[tokio::test]
    async fn test_bulk_delete_removes_from_both_tables() {
        let (_dir, backend) = backend().await;
        backend
            .bulk_index(&[doc("a1", "Going Away", ContentType::Article, 1.0, 100)])
            .await
            .unwrap();

        let removed = backend
            .bulk_delete(&["a1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.document_count().await.unwrap(), 0);
        let result = backend.query(&SearchRequest::keyword("going")).await.unwrap();
        assert_eq!(result.total_items, 0);
    }

    #[tokio::test]
    async fn test_blank_keyword_is_a_filter_scan() {
        let (_dir, backend) = backend().await;
        backend
            .bulk_index(&[
                doc("a1", "First Post", ContentType::Article, 1.0, 100),
                doc("a2", "Second Post", ContentType::Article, 2.0, 200),
            ])
            .await
            .unwrap();

        let request = SearchRequest {
            keyword: Some("   ".into()),
            ..Default::default()
        };
        let result = backend.query(&request).await.unwrap();
        assert_eq!(result.total_items, 2);
        assert!(result.items[0].relevance.is_none());
    }

    #[test]
    fn test_fts_expression_quotes_tokens() {
        assert_eq!(fts_match_expression("rust async"), "\"rust\" \"async\"");
        assert_eq!(fts_match_expression("a\"b"), "\"a\"\"b\"");
    }
}
