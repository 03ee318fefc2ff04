//! # Syndex CLI (`syndex`)
//!
//! The `syndex` binary drives the synchronization and search pipeline.
//!
//! ## Usage
//!
//! ```bash
//! syndex --config ./config/syndex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `syndex init` | Create the SQLite database and run schema migrations |
//! | `syndex sync` | Fetch from providers, persist changes, update the index |
//! | `syndex search "<query>"` | Search indexed content |
//! | `syndex rescore` | Recompute stored scores and re-index drifted items |
//! | `syndex batches` | Show recent synchronization run audit records |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! syndex init --config ./config/syndex.toml
//!
//! # Run one sync pass, then prune content gone from the sources
//! syndex sync --prune --config ./config/syndex.toml
//!
//! # Keyword search with filters
//! syndex search "async rust" --content-type article --min-score 5 --page 1
//!
//! # Filter-only search (no keyword)
//! syndex search --content-type video --sort published-at --order asc
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use syndex::backend_sqlite::SqliteSearchBackend;
use syndex::bus::{InMemoryBus, MessageBus};
use syndex::config::{self, Config};
use syndex::consumer::{BreakerPolicy, CheckpointPolicy, IndexConsumer, RetryPolicy};
use syndex::notify::{BackoffPolicy, ChangeNotifier};
use syndex::orchestrator::{
    KeywordSearchStrategy, SearchOrchestrator, SearchStrategy, StoreScanStrategy,
};
use syndex::persist::BulkPersistenceGateway;
use syndex::pipeline::SyncPipeline;
use syndex::provider::{ContentProvider, FixtureProvider};
use syndex::query::{SearchRequest, SortField, SortOrder};
use syndex::store::ContentStore;
use syndex::store_sqlite::SqliteStore;
use syndex::{db, migrate, models};

/// Syndex — a content synchronization and search indexing pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/syndex.example.toml` for a full
/// example.
#[derive(Parser)]
#[command(
    name = "syndex",
    about = "Syndex — a content synchronization and search indexing pipeline",
    version,
    long_about = "Syndex pulls canonical content from configured providers, detects changes by \
    content hash, persists them in transactional batches to SQLite, and keeps an FTS5 search \
    index in step via change notifications. Search is answered by a strategy orchestrator with \
    graceful fallback."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/syndex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables.
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Run one synchronization pass.
    ///
    /// Fetches from every configured provider concurrently, classifies
    /// items as new/updated/unchanged by content hash, persists changes
    /// in transactional chunks, and updates the search index through
    /// the change-notification consumer.
    Sync {
        /// After a successful pass, delete stored content no longer
        /// present at any source.
        #[arg(long)]
        prune: bool,
    },

    /// Search indexed content.
    ///
    /// With a query string the FTS5 index answers; without one, a
    /// filter-only scan over stored content.
    Search {
        /// The search query string; omit for filter-only search.
        query: Option<String>,

        /// Restrict results to one content type.
        #[arg(long, value_enum)]
        content_type: Option<ContentTypeArg>,

        /// Sort key.
        #[arg(long, value_enum, default_value_t = SortArg::Score)]
        sort: SortArg,

        /// Sort direction.
        #[arg(long, value_enum, default_value_t = OrderArg::Desc)]
        order: OrderArg,

        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Results per page (capped).
        #[arg(long)]
        page_size: Option<u32>,

        /// Only return content scoring at least this much.
        #[arg(long)]
        min_score: Option<f64>,

        /// Only return content scoring at most this much.
        #[arg(long)]
        max_score: Option<f64>,
    },

    /// Recompute scores for all stored content.
    ///
    /// Freshness decays with age, so scores drift between syncs even
    /// when content does not change. Drifted items are written back and
    /// re-indexed.
    Rescore,

    /// Show recent synchronization run audit records.
    Batches {
        /// Maximum number of runs to show.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ContentTypeArg {
    Video,
    Article,
}

impl From<ContentTypeArg> for models::ContentType {
    fn from(arg: ContentTypeArg) -> Self {
        match arg {
            ContentTypeArg::Video => models::ContentType::Video,
            ContentTypeArg::Article => models::ContentType::Article,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Score,
    PublishedAt,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Asc,
    Desc,
}

fn build_providers(cfg: &Config) -> anyhow::Result<Vec<Arc<dyn ContentProvider>>> {
    let providers: Vec<Arc<dyn ContentProvider>> = cfg
        .providers
        .fixture
        .iter()
        .map(|p| Arc::new(FixtureProvider::new(&p.name, &p.path)) as Arc<dyn ContentProvider>)
        .collect();
    if providers.is_empty() {
        anyhow::bail!("no providers configured; add at least one [[providers.fixture]] entry");
    }
    Ok(providers)
}

/// Sync-side wiring shared by the `sync` and `rescore` commands: a
/// pipeline publishing to an in-process bus, drained by a spawned
/// consumer that updates the search index.
struct SyncRuntime {
    pipeline: SyncPipeline,
    bus: Arc<InMemoryBus>,
    consumer_handle: tokio::task::JoinHandle<syndex::error::Result<u64>>,
}

impl SyncRuntime {
    fn build(cfg: &Config, store: Arc<SqliteStore>, backend: Arc<SqliteSearchBackend>) -> anyhow::Result<Self> {
        let bus = Arc::new(InMemoryBus::new());

        // Subscribe before any publish so the consumer sees the whole
        // run.
        let rx = bus.subscribe();
        let consumer = Arc::new(IndexConsumer::new(
            store.clone(),
            backend,
            RetryPolicy {
                max_attempts: cfg.consumer.retry_attempts,
                initial_delay: std::time::Duration::from_secs(
                    cfg.consumer.retry_initial_delay_secs,
                ),
                step: std::time::Duration::from_secs(cfg.consumer.retry_step_secs),
                max_delay: std::time::Duration::from_secs(cfg.consumer.retry_max_delay_secs),
            },
            BreakerPolicy {
                failure_threshold: cfg.consumer.breaker_threshold,
                cooldown: std::time::Duration::from_secs(cfg.consumer.breaker_cooldown_secs),
            },
            CheckpointPolicy {
                every_n: cfg.consumer.checkpoint_every_n,
                every: std::time::Duration::from_secs(cfg.consumer.checkpoint_every_secs),
            },
            cfg.consumer.concurrency,
        ));
        let consumer_handle = tokio::spawn(consumer.run(rx, CancellationToken::new()));

        let pipeline = SyncPipeline::new(
            build_providers(cfg)?,
            store.clone(),
            BulkPersistenceGateway::new(store, cfg.sync.batch_size),
            ChangeNotifier::new(
                bus.clone(),
                BackoffPolicy {
                    max_attempts: cfg.notifier.max_attempts,
                    initial_delay: std::time::Duration::from_millis(cfg.notifier.initial_delay_ms),
                    max_delay: std::time::Duration::from_millis(cfg.notifier.max_delay_ms),
                },
            ),
            cfg.sync.provider_timeout(),
        );

        Ok(Self {
            pipeline,
            bus,
            consumer_handle,
        })
    }

    /// Close the bus and wait for the consumer to drain what was
    /// published. Returns the number of notifications indexed.
    async fn finish(self) -> anyhow::Result<u64> {
        drop(self.pipeline);
        drop(self.bus);
        Ok(self.consumer_handle.await??)
    }
}

async fn run_sync(cfg: &Config, prune: bool) -> anyhow::Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let backend = Arc::new(SqliteSearchBackend::new(pool));
    let runtime = SyncRuntime::build(cfg, store, backend)?;
    let pipeline = &runtime.pipeline;

    let cancel = CancellationToken::new();
    let report = pipeline.run_sync(&cancel).await?;

    let mut pruned = 0usize;
    if prune {
        if report.batch.is_successful {
            pruned = pipeline
                .run_deletion_pass(&report.incoming_ids, &cancel)
                .await?
                .len();
        } else {
            eprintln!("Skipping prune: sync run was not fully successful.");
        }
    }

    let indexed = runtime.finish().await?;

    let batch = &report.batch;
    println!(
        "Sync {}: {} fetched, {} created, {} updated, {} unchanged, {} failed",
        if batch.is_successful { "OK" } else { "FAILED" },
        batch.total_items_fetched,
        batch.items_created,
        batch.items_updated,
        batch.items_unchanged,
        batch.items_failed,
    );
    println!(
        "  batch {} | {} rows affected | {} notifications indexed | {} pruned | {} ms",
        batch.id, batch.database_rows_affected, indexed, pruned, batch.duration_ms
    );
    if let Some(message) = &batch.error_message {
        println!("  error: {}", message);
    }
    if !batch.is_successful {
        anyhow::bail!("sync run failed");
    }
    Ok(())
}

async fn run_rescore(cfg: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let backend = Arc::new(SqliteSearchBackend::new(pool));
    let runtime = SyncRuntime::build(cfg, store, backend)?;

    let rescored = runtime
        .pipeline
        .run_rescore(&CancellationToken::new())
        .await?;
    let count = rescored.len();
    let indexed = runtime.finish().await?;

    if count == 0 {
        println!("All scores current; nothing to do.");
    } else {
        println!(
            "Rescored {} items; {} notifications indexed.",
            count, indexed
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    cfg: &Config,
    query: Option<String>,
    content_type: Option<ContentTypeArg>,
    sort: SortArg,
    order: OrderArg,
    page: u32,
    page_size: Option<u32>,
    min_score: Option<f64>,
    max_score: Option<f64>,
) -> anyhow::Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let backend = Arc::new(SqliteSearchBackend::new(pool));

    let orchestrator = SearchOrchestrator::new(vec![
        Arc::new(KeywordSearchStrategy::new(backend)) as Arc<dyn SearchStrategy>,
        Arc::new(StoreScanStrategy::new(store)) as Arc<dyn SearchStrategy>,
    ])?
    .with_strategy_timeout(cfg.search.strategy_timeout());

    let request = SearchRequest {
        keyword: query,
        content_type: content_type.map(Into::into),
        sort_field: match sort {
            SortArg::Score => SortField::Score,
            SortArg::PublishedAt => SortField::PublishedAt,
        },
        sort_order: match order {
            OrderArg::Asc => SortOrder::Ascending,
            OrderArg::Desc => SortOrder::Descending,
        },
        page,
        page_size: page_size.unwrap_or(cfg.search.default_page_size),
        min_score,
        max_score,
    };

    let result = orchestrator.search(&request).await;
    println!(
        "{} results (page {}/{} x {}) via {} [{}] in {} ms",
        result.total_items,
        result.page,
        (result.total_items as u32).div_ceil(result.page_size.max(1)).max(1),
        result.page_size,
        result.metadata.strategy,
        result.metadata.data_source,
        result.metadata.latency_ms,
    );
    for hit in &result.items {
        let when = chrono::DateTime::from_timestamp(hit.published_at, 0)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  [{:7.2}] {:<7} {}  {}  ({})",
            hit.score,
            hit.content_type.as_str(),
            hit.content_id,
            hit.title,
            when,
        );
    }
    Ok(())
}

async fn run_batches(cfg: &Config, limit: i64) -> anyhow::Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    let store = SqliteStore::new(pool);
    let batches = store.recent_sync_batches(limit).await?;

    if batches.is_empty() {
        println!("No synchronization runs recorded yet.");
        return Ok(());
    }
    for batch in batches {
        println!(
            "{} {} | started {} | {} fetched / {} created / {} updated / {} unchanged / {} failed | {} ms{}",
            if batch.is_successful { "OK    " } else { "FAILED" },
            batch.id,
            batch.started_at.format("%Y-%m-%d %H:%M:%S"),
            batch.total_items_fetched,
            batch.items_created,
            batch.items_updated,
            batch.items_unchanged,
            batch.items_failed,
            batch.duration_ms,
            batch
                .error_message
                .map(|m| format!(" | {}", m))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { prune } => {
            run_sync(&cfg, prune).await?;
        }
        Commands::Search {
            query,
            content_type,
            sort,
            order,
            page,
            page_size,
            min_score,
            max_score,
        } => {
            run_search(
                &cfg,
                query,
                content_type,
                sort,
                order,
                page,
                page_size,
                min_score,
                max_score,
            )
            .await?;
        }
        Commands::Rescore => {
            run_rescore(&cfg).await?;
        }
        Commands::Batches { limit } => {
            run_batches(&cfg, limit).await?;
        }
    }

    Ok(())
}
