//! End-to-end pipeline tests over in-process collaborators: fixture
//! providers feed a sync run, the consumer drains the bus into the
//! search backend, and the orchestrator answers queries against the
//! result.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use syndex::backend::{MemorySearchBackend, SearchBackend};
use syndex::bus::{InMemoryBus, MessageBus};
use syndex::consumer::{BreakerPolicy, CheckpointPolicy, IndexConsumer, RetryPolicy};
use syndex::models::{ChangeType, ContentType};
use syndex::notify::{BackoffPolicy, ChangeNotifier};
use syndex::orchestrator::{
    KeywordSearchStrategy, SearchOrchestrator, SearchStrategy, StoreScanStrategy,
};
use syndex::persist::BulkPersistenceGateway;
use syndex::pipeline::SyncPipeline;
use syndex::provider::{ContentProvider, FixtureProvider};
use syndex::query::SearchRequest;
use syndex::store::ContentStore;
use syndex::store_memory::InMemoryStore;

const DEVBLOG_FIXTURE: &str = r#"[
    {
        "id": "a1",
        "title": "Ownership and Borrowing",
        "content_type": "article",
        "published_at": "2021-03-10T10:00:00Z",
        "categories": ["rust", "fundamentals"],
        "metrics": { "kind": "article", "reading_time_minutes": 8, "reactions": 120 }
    },
    {
        "id": "a2",
        "title": "Async Patterns in Practice",
        "content_type": "article",
        "published_at": "2021-02-01T09:00:00Z",
        "categories": ["rust", "async"],
        "metrics": { "kind": "article", "reading_time_minutes": 12, "reactions": 45 }
    }
]"#;

const VIDEOHUB_FIXTURE: &str = r#"[
    {
        "id": "v1",
        "title": "Debugging Async Rust",
        "content_type": "video",
        "published_at": "2021-03-05T18:00:00Z",
        "categories": ["rust", "debugging"],
        "metrics": { "kind": "video", "views": 15000, "likes": 800 }
    }
]"#;

struct Harness {
    _dir: TempDir,
    store: Arc<InMemoryStore>,
    backend: Arc<MemorySearchBackend>,
    bus: Arc<InMemoryBus>,
    pipeline: SyncPipeline,
}

fn write_fixture(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn harness(fixtures: &[(&str, &str)]) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let backend = Arc::new(MemorySearchBackend::new());
    let bus = Arc::new(InMemoryBus::new());

    let providers: Vec<Arc<dyn ContentProvider>> = fixtures
        .iter()
        .map(|(name, body)| {
            let path = write_fixture(&dir, &format!("{}.json", name), body);
            Arc::new(FixtureProvider::new(*name, path)) as Arc<dyn ContentProvider>
        })
        .collect();

    let pipeline = SyncPipeline::new(
        providers,
        store.clone(),
        BulkPersistenceGateway::with_default_batch_size(store.clone()),
        ChangeNotifier::new(bus.clone(), BackoffPolicy::default()),
        Duration::from_secs(5),
    );

    Harness {
        _dir: dir,
        store,
        backend,
        bus,
        pipeline,
    }
}

fn consumer(h: &Harness) -> IndexConsumer {
    IndexConsumer::new(
        h.store.clone(),
        h.backend.clone(),
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            step: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        BreakerPolicy::default(),
        CheckpointPolicy::default(),
        4,
    )
}

/// Pull every queued notification through the consumer.
async fn drain(
    h: &Harness,
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<syndex::models::ChangeNotification>,
) {
    let consumer = consumer(h);
    while let Ok(notification) = rx.try_recv() {
        consumer.process(&notification).await.unwrap();
    }
}

#[tokio::test]
async fn test_sync_then_search_end_to_end() {
    let h = harness(&[("devblog", DEVBLOG_FIXTURE), ("videohub", VIDEOHUB_FIXTURE)]);
    let mut rx = h.bus.subscribe();

    let report = h.pipeline.run_sync(&CancellationToken::new()).await.unwrap();
    assert!(report.batch.is_successful);
    assert_eq!(report.batch.total_items_fetched, 3);
    assert_eq!(report.batch.items_created, 3);
    assert_eq!(h.store.len(), 3);

    drain(&h, &mut rx).await;
    assert_eq!(h.backend.document_count().await.unwrap(), 3);

    let orchestrator = SearchOrchestrator::new(vec![
        Arc::new(KeywordSearchStrategy::new(h.backend.clone())) as Arc<dyn SearchStrategy>,
        Arc::new(StoreScanStrategy::new(h.store.clone())) as Arc<dyn SearchStrategy>,
    ])
    .unwrap();

    let result = orchestrator.search(&SearchRequest::keyword("async")).await;
    assert_eq!(result.total_items, 2);
    assert_eq!(result.metadata.strategy, "keyword");

    // Filter-only request goes to the store scan.
    let request = SearchRequest {
        content_type: Some(ContentType::Video),
        ..Default::default()
    };
    let result = orchestrator.search(&request).await;
    assert_eq!(result.total_items, 1);
    assert_eq!(result.items[0].content_id, "v1");
    assert_eq!(result.metadata.strategy, "store-scan");
}

#[tokio::test]
async fn test_second_run_detects_update_and_reindexes() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "devblog.json", DEVBLOG_FIXTURE);

    let store = Arc::new(InMemoryStore::new());
    let backend = Arc::new(MemorySearchBackend::new());
    let bus = Arc::new(InMemoryBus::new());
    let pipeline = SyncPipeline::new(
        vec![Arc::new(FixtureProvider::new("devblog", path.clone())) as Arc<dyn ContentProvider>],
        store.clone(),
        BulkPersistenceGateway::with_default_batch_size(store.clone()),
        ChangeNotifier::new(bus.clone(), BackoffPolicy::default()),
        Duration::from_secs(5),
    );
    let h = Harness {
        _dir: dir,
        store: store.clone(),
        backend: backend.clone(),
        bus: bus.clone(),
        pipeline,
    };

    let mut rx = h.bus.subscribe();
    h.pipeline.run_sync(&CancellationToken::new()).await.unwrap();
    drain(&h, &mut rx).await;

    // Same content again: nothing changes, nothing published.
    let report = h.pipeline.run_sync(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.batch.items_unchanged, 2);
    assert!(rx.try_recv().is_err());

    // Retitle one article; only that id is announced and re-indexed.
    let retitled = DEVBLOG_FIXTURE.replace("Ownership and Borrowing", "Ownership Explained");
    std::fs::write(&path, retitled).unwrap();
    let report = h.pipeline.run_sync(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.batch.items_updated, 1);
    assert_eq!(report.batch.items_unchanged, 1);

    let notification = rx.try_recv().unwrap();
    assert_eq!(notification.change_type, ChangeType::Updated);
    assert_eq!(notification.content_ids, vec!["a1"]);
    consumer(&h).process(&notification).await.unwrap();

    let records = h.store.get_by_ids(&["a1".to_string()]).await.unwrap();
    assert_eq!(records[0].version, 2);

    let result = h
        .backend
        .query(&SearchRequest::keyword("explained"))
        .await
        .unwrap();
    assert_eq!(result.total_items, 1);
    let stale = h
        .backend
        .query(&SearchRequest::keyword("borrowing"))
        .await
        .unwrap();
    assert_eq!(stale.total_items, 0);
}

#[tokio::test]
async fn test_redelivered_notification_is_idempotent() {
    let h = harness(&[("devblog", DEVBLOG_FIXTURE)]);
    let mut rx = h.bus.subscribe();
    h.pipeline.run_sync(&CancellationToken::new()).await.unwrap();

    let notification = rx.try_recv().unwrap();
    let consumer = consumer(&h);
    consumer.process(&notification).await.unwrap();
    consumer.process(&notification).await.unwrap();

    assert_eq!(h.backend.document_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_deletion_pass_flows_through_to_index() {
    let h = harness(&[("devblog", DEVBLOG_FIXTURE)]);
    let mut rx = h.bus.subscribe();
    let report = h.pipeline.run_sync(&CancellationToken::new()).await.unwrap();
    drain(&h, &mut rx).await;
    assert_eq!(h.backend.document_count().await.unwrap(), 2);

    // Source dropped a2: the deletion pass removes it everywhere.
    let live: Vec<String> = report
        .incoming_ids
        .iter()
        .filter(|id| id.as_str() != "a2")
        .cloned()
        .collect();
    let deleted = h
        .pipeline
        .run_deletion_pass(&live, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(deleted, vec!["a2"]);
    assert_eq!(h.store.len(), 1);

    drain(&h, &mut rx).await;
    assert_eq!(h.backend.document_count().await.unwrap(), 1);

    let result = h
        .backend
        .query(&SearchRequest::keyword("async patterns"))
        .await
        .unwrap();
    assert_eq!(result.total_items, 0);
}
