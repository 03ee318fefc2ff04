//! Search orchestrator.
//!
//! Picks the highest-priority strategy whose `matches` accepts the
//! request; if that strategy fails, one fallback attempt goes to the
//! next applicable strategy. When both fail the caller still gets a
//! typed empty result rather than an error. Each strategy execution is
//! bounded by a timeout, and an elapse counts as a strategy failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::backend::SearchBackend;
use crate::error::{Fault, Result};
use crate::query::{
    sort_documents, SearchHit, SearchMetadata, SearchRequest, SearchResult,
};
use crate::store::ContentStore;

/// One way of answering a search request.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Higher wins when several strategies match.
    fn priority(&self) -> u32;

    /// Whether this strategy can answer the given request.
    fn matches(&self, request: &SearchRequest) -> bool;

    /// Marker for the guaranteed last resort; at least one registered
    /// strategy must return true here.
    fn handles_all(&self) -> bool {
        false
    }

    async fn execute(&self, request: &SearchRequest) -> Result<SearchResult>;
}

/// Keyword search delegated to the search backend.
pub struct KeywordSearchStrategy {
    backend: Arc<dyn SearchBackend>,
}

impl KeywordSearchStrategy {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SearchStrategy for KeywordSearchStrategy {
    fn name(&self) -> &str {
        "keyword"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn matches(&self, request: &SearchRequest) -> bool {
        request.has_keyword()
    }

    async fn execute(&self, request: &SearchRequest) -> Result<SearchResult> {
        self.backend
            .query(request)
            .await
            .map_err(|fault| Fault::strategy(self.name(), fault.to_string()))
    }
}

/// Last-resort strategy: scan durable storage and filter, sort and page
/// in memory. Answers every request, including filter-only ones.
pub struct StoreScanStrategy {
    store: Arc<dyn ContentStore>,
}

impl StoreScanStrategy {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchStrategy for StoreScanStrategy {
    fn name(&self) -> &str {
        "store-scan"
    }

    fn priority(&self) -> u32 {
        1
    }

    fn matches(&self, _request: &SearchRequest) -> bool {
        true
    }

    fn handles_all(&self) -> bool {
        true
    }

    async fn execute(&self, request: &SearchRequest) -> Result<SearchResult> {
        let records = self
            .store
            .get_all()
            .await
            .map_err(|fault| Fault::strategy(self.name(), fault.to_string()))?;

        let needle = request
            .keyword
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        let mut documents: Vec<_> = records
            .iter()
            .map(crate::models::SearchDocument::from_persisted)
            .filter(|doc| {
                (needle.is_empty() || doc.search_text.to_lowercase().contains(&needle))
                    && request.filters_accept(doc)
            })
            .collect();
        sort_documents(&mut documents, request);

        let total_items = documents.len() as u64;
        let (page, page_size) = request.normalized_paging();
        let items: Vec<SearchHit> = documents
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
                data_source: "store".to_string(),
                latency_ms: 0,
                cache_hit: false,
            },
        })
    }
}

pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(10);

/// Strategy registry ordered by priority, with one-step fallback.
pub struct SearchOrchestrator {
    strategies: Vec<Arc<dyn SearchStrategy>>,
    strategy_timeout: Duration,
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("strategy_timeout", &self.strategy_timeout)
            .finish()
    }
}

impl SearchOrchestrator {
    /// Registers the given strategies, highest priority first. Fails
    /// unless at least one strategy handles every request.
    pub fn new(mut strategies: Vec<Arc<dyn SearchStrategy>>) -> Result<Self> {
        if !strategies.iter().any(|s| s.handles_all()) {
            return Err(Fault::configuration(
                "no registered search strategy handles all requests",
            ));
        }
        strategies.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Ok(Self {
            strategies,
            strategy_timeout: DEFAULT_STRATEGY_TIMEOUT,
        })
    }

    /// Bound each strategy execution by `timeout`; an elapse is treated
    /// as a strategy failure and feeds the fallback path.
    pub fn with_strategy_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_timeout = timeout;
        self
    }

    fn applicable<'a>(
        &'a self,
        request: &SearchRequest,
    ) -> impl Iterator<Item = &'a Arc<dyn SearchStrategy>> {
        let request = request.clone();
        self.strategies.iter().filter(move |s| s.matches(&request))
    }

    /// Answer a request: best-match strategy, then one fallback, then a
    /// typed empty result. Never an error for a well-formed request.
    pub async fn search(&self, request: &SearchRequest) -> SearchResult {
        let started = Instant::now();
        let mut attempts = 0;

        for strategy in self.applicable(request) {
            if attempts >= 2 {
                break;
            }
            attempts += 1;
            debug!(strategy = strategy.name(), attempt = attempts, "executing search strategy");
            let outcome = match tokio::time::timeout(
                self.strategy_timeout,
                strategy.execute(request),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_elapsed) => Err(Fault::strategy(
                    strategy.name(),
                    format!("timed out after {:?}", self.strategy_timeout),
                )),
            };
            match outcome {
                Ok(mut result) => {
                    result.metadata.strategy = strategy.name().to_string();
                    result.metadata.latency_ms = started.elapsed().as_millis() as u64;
                    info!(
                        strategy = strategy.name(),
                        hits = result.items.len(),
                        total = result.total_items,
                        latency_ms = result.metadata.latency_ms,
                        "search answered"
                    );
                    return result;
                }
                Err(fault) => {
                    warn!(
                        strategy = strategy.name(),
                        error = %fault,
                        "search strategy failed; falling back"
                    );
                }
            }
        }

        warn!("all applicable search strategies failed; returning empty result");
        let mut result = SearchResult::empty_fallback(request);
        result.metadata.latency_ms = started.elapsed().as_millis() as u64;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemorySearchBackend;
    use crate::models::{CanonicalContent, ContentMetrics, ContentType, PersistedContent};
    use crate::store_memory::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn persisted(id: &str, title: &str, score: f64) -> PersistedContent {
        let content = CanonicalContent::new(
            id,
            title,
            ContentType::Article,
            Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap(),
            vec!["rust".into()],
            "devblog",
            ContentMetrics::Article {
                reading_time_minutes: 4,
                reactions: 8,
            },
        )
        .unwrap();
        let now = Utc::now();
        PersistedContent {
            content_hash: crate::hash::content_hash(&content),
            content,
            score,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Strategy that always fails, for fallback tests.
    struct FailingStrategy {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SearchStrategy for FailingStrategy {
        fn name(&self) -> &str {
            "failing"
        }
        fn priority(&self) -> u32 {
            100
        }
        fn matches(&self, _request: &SearchRequest) -> bool {
            true
        }
        async fn execute(&self, _request: &SearchRequest) -> Result<SearchResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Fault::strategy("failing", "engine unreachable"))
        }
    }

    #[test]
    fn test_registry_requires_a_catch_all() {
        let backend: Arc<dyn SearchBackend> = Arc::new(MemorySearchBackend::new());
        let err = SearchOrchestrator::new(vec![Arc::new(KeywordSearchStrategy::new(backend)) as _])
            .unwrap_err();
        assert!(matches!(err, Fault::Configuration(_)));
    }

    #[tokio::test]
    async fn test_keyword_request_uses_keyword_strategy() {
        let store = Arc::new(InMemoryStore::new());
        let backend = Arc::new(MemorySearchBackend::new());
        let record = persisted("a1", "Async Patterns", 3.0);
        backend
            .bulk_index(&[crate::models::SearchDocument::from_persisted(&record)])
            .await
            .unwrap();

        let orchestrator = SearchOrchestrator::new(vec![
            Arc::new(KeywordSearchStrategy::new(backend)) as _,
            Arc::new(StoreScanStrategy::new(store)) as _,
        ])
        .unwrap();

        let result = orchestrator.search(&SearchRequest::keyword("async")).await;
        assert_eq!(result.total_items, 1);
        assert_eq!(result.metadata.strategy, "keyword");
    }

    #[tokio::test]
    async fn test_filter_only_request_uses_store_scan() {
        let store = Arc::new(InMemoryStore::new());
        store
            .bulk_upsert(&[persisted("a1", "Quiet Post", 6.0)], &[])
            .await
            .unwrap();
        let backend: Arc<dyn SearchBackend> = Arc::new(MemorySearchBackend::new());

        let orchestrator = SearchOrchestrator::new(vec![
            Arc::new(KeywordSearchStrategy::new(backend)) as _,
            Arc::new(StoreScanStrategy::new(store)) as _,
        ])
        .unwrap();

        let request = SearchRequest {
            min_score: Some(5.0),
            ..Default::default()
        };
        let result = orchestrator.search(&request).await;
        assert_eq!(result.total_items, 1);
        assert_eq!(result.metadata.strategy, "store-scan");
        assert_eq!(result.metadata.data_source, "store");
    }

    #[tokio::test]
    async fn test_failed_strategy_falls_back_once() {
        let store = Arc::new(InMemoryStore::new());
        store
            .bulk_upsert(&[persisted("a1", "Fallback Target", 2.0)], &[])
            .await
            .unwrap();

        let failing = Arc::new(FailingStrategy {
            calls: AtomicU32::new(0),
        });
        let orchestrator = SearchOrchestrator::new(vec![
            Arc::clone(&failing) as _,
            Arc::new(StoreScanStrategy::new(store)) as _,
        ])
        .unwrap();

        let result = orchestrator.search(&SearchRequest::keyword("fallback")).await;
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.total_items, 1);
        assert_eq!(result.metadata.strategy, "store-scan");
    }

    #[tokio::test]
    async fn test_stalled_strategy_times_out_and_falls_back() {
        struct StalledStrategy;

        #[async_trait]
        impl SearchStrategy for StalledStrategy {
            fn name(&self) -> &str {
                "stalled"
            }
            fn priority(&self) -> u32 {
                100
            }
            fn matches(&self, _request: &SearchRequest) -> bool {
                true
            }
            async fn execute(&self, _request: &SearchRequest) -> Result<SearchResult> {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Err(Fault::strategy("stalled", "never reached"))
            }
        }

        let store = Arc::new(InMemoryStore::new());
        store
            .bulk_upsert(&[persisted("a1", "Rescued Result", 4.0)], &[])
            .await
            .unwrap();

        let orchestrator = SearchOrchestrator::new(vec![
            Arc::new(StalledStrategy) as _,
            Arc::new(StoreScanStrategy::new(store)) as _,
        ])
        .unwrap()
        .with_strategy_timeout(std::time::Duration::from_millis(20));

        let result = orchestrator.search(&SearchRequest::keyword("rescued")).await;
        assert_eq!(result.total_items, 1);
        assert_eq!(result.metadata.strategy, "store-scan");
    }

    #[tokio::test]
    async fn test_all_strategies_failing_yields_typed_empty_result() {
        struct FailingCatchAll;

        #[async_trait]
        impl SearchStrategy for FailingCatchAll {
            fn name(&self) -> &str {
                "failing-catch-all"
            }
            fn priority(&self) -> u32 {
                1
            }
            fn matches(&self, _request: &SearchRequest) -> bool {
                true
            }
            fn handles_all(&self) -> bool {
                true
            }
            async fn execute(&self, _request: &SearchRequest) -> Result<SearchResult> {
                Err(Fault::strategy("failing-catch-all", "down"))
            }
        }

        let orchestrator = SearchOrchestrator::new(vec![
            Arc::new(FailingStrategy {
                calls: AtomicU32::new(0),
            }) as _,
            Arc::new(FailingCatchAll) as _,
        ])
        .unwrap();

        let result = orchestrator.search(&SearchRequest::keyword("anything")).await;
        assert_eq!(result.total_items, 0);
        assert_eq!(result.metadata.strategy, "Fallback");
        assert_eq!(result.metadata.data_source, "None");
    }
}
