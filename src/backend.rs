//! Search backend abstraction.
//!
//! A backend owns one index and answers two operations: bulk indexing
//! (full-document replace keyed by content id, which makes re-indexing
//! after redelivery a no-op) and querying. Indexing failures are
//! partitioned per document — one bad document never blocks its
//! siblings.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::SearchDocument;
use crate::query::{sort_documents, SearchHit, SearchMetadata, SearchRequest, SearchResult};

/// Outcome of one bulk index call.
#[derive(Debug, Clone, Default)]
pub struct IndexResult {
    pub total_processed: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub failed_ids: Vec<String>,
    pub duration: Duration,
    pub error_message: Option<String>,
}

impl IndexResult {
    pub fn is_full_success(&self) -> bool {
        self.failed_count == 0
    }

    /// Some documents landed, some did not.
    pub fn is_partial_success(&self) -> bool {
        self.failed_count > 0 && self.success_count > 0
    }

    /// Nothing landed at all.
    pub fn is_total_failure(&self) -> bool {
        self.total_processed > 0 && self.success_count == 0
    }
}

/// One search index implementation (SQLite FTS, a remote engine, an
/// in-memory map for tests).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Human-readable backend name, used as result data-source
    /// metadata.
    fn name(&self) -> &str;

    /// Index the given documents, replacing any existing document with
    /// the same content id. Per-document failures are reported in the
    /// returned [`IndexResult`], not as an error.
    async fn bulk_index(&self, documents: &[SearchDocument]) -> Result<IndexResult>;

    /// Remove the given content ids from the index. Unknown ids are
    /// ignored.
    async fn bulk_delete(&self, ids: &[String]) -> Result<u64>;

    /// Run a keyword query against the index.
    async fn query(&self, request: &SearchRequest) -> Result<SearchResult>;

    /// Number of documents currently indexed.
    async fn document_count(&self) -> Result<u64>;
}

/// In-memory backend for tests: a document map plus naive substring
/// matching over the search text.
#[derive(Default)]
pub struct MemorySearchBackend {
    documents: RwLock<HashMap<String, SearchDocument>>,
}

impl MemorySearchBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchBackend for MemorySearchBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn bulk_index(&self, documents: &[SearchDocument]) -> Result<IndexResult> {
        let started = std::time::Instant::now();
        let mut map = self.documents.write().unwrap();
        for doc in documents {
            map.insert(doc.content_id.clone(), doc.clone());
        }
        Ok(IndexResult {
            total_processed: documents.len(),
            success_count: documents.len(),
            duration: started.elapsed(),
            ..Default::default()
        })
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<u64> {
        let mut map = self.documents.write().unwrap();
        let mut removed = 0u64;
        for id in ids {
            if map.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn query(&self, request: &SearchRequest) -> Result<SearchResult> {
        let needle = request
            .keyword
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        let map = self.documents.read().unwrap();
        let mut matched: Vec<SearchDocument> = map
            .values()
            .filter(|doc| {
                (needle.is_empty() || doc.search_text.to_lowercase().contains(&needle))
                    && request.filters_accept(doc)
            })
            .cloned()
            .collect();

        sort_documents(&mut matched, request);

        let total_items = matched.len() as u64;
        let (page, page_size) = request.normalized_paging();
        let items: Vec<SearchHit> = matched
            .iter()
            .skip(request.offset() as usize)
            .take(page_size as usize)
            .map(|doc| SearchHit::from_document(doc, None))
            .collect();

        Ok(SearchResult {
            items,
            total_items,
            page,
            page_size,
            metadata: SearchMetadata {
                strategy: String::new(),
                data_source: self.name().to_string(),
                latency_ms: 0,
                cache_hit: false,
            },
        })
    }

    async fn document_count(&self) -> Result<u64> {
        Ok(self.documents.read().unwrap().len() as u64)
    }
}
