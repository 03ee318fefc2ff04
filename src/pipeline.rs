//! Synchronization pipeline.
//!
//! One run: fetch from every provider concurrently, merge at the
//! barrier, classify against persisted state, apply the changes in
//! transactional chunks, then publish one dirty-bit notification for
//! the changed ids. Every run produces a finalized [`SyncBatch`] audit
//! record, successful or not.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::SyncBatch;
use crate::detect::detect_batch;
use crate::error::{Fault, Result};
use crate::models::{CanonicalContent, ChangeType};
use crate::notify::ChangeNotifier;
use crate::persist::BulkPersistenceGateway;
use crate::provider::ContentProvider;
use crate::store::ContentStore;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// What one synchronization run produced.
#[derive(Debug)]
pub struct SyncReport {
    /// Finalized audit record; `is_successful` carries the verdict.
    pub batch: SyncBatch,
    /// Ids seen across all providers this run, for the deletion pass.
    pub incoming_ids: Vec<String>,
}

/// Merged fetch outcome across all providers.
struct FetchOutcome {
    items: Vec<CanonicalContent>,
    /// Items rejected by canonical validation inside providers.
    invalid_items: u64,
    /// Providers that errored or timed out outright.
    failed_providers: u64,
}

/// Wires providers, detection, persistence and notification together.
pub struct SyncPipeline {
    providers: Vec<Arc<dyn ContentProvider>>,
    store: Arc<dyn ContentStore>,
    gateway: BulkPersistenceGateway,
    notifier: ChangeNotifier,
    provider_timeout: Duration,
}

impl SyncPipeline {
    pub fn new(
        providers: Vec<Arc<dyn ContentProvider>>,
        store: Arc<dyn ContentStore>,
        gateway: BulkPersistenceGateway,
        notifier: ChangeNotifier,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            store,
            gateway,
            notifier,
            provider_timeout,
        }
    }

    fn provider_label(&self) -> String {
        self.providers
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Fetch from all providers concurrently, each behind its own
    /// timeout. A failed provider never aborts the others.
    async fn fetch_all(&self, cancel: &CancellationToken) -> FetchOutcome {
        let fetches = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let cancel = cancel.clone();
            let timeout = self.provider_timeout;
            async move {
                let name = provider.name().to_string();
                let outcome = tokio::time::timeout(timeout, provider.fetch(&cancel)).await;
                (name, outcome)
            }
        });

        let mut items = Vec::new();
        let mut invalid_items = 0u64;
        let mut failed_providers = 0u64;
        for (name, outcome) in futures::future::join_all(fetches).await {
            match outcome {
                Ok(Ok(page)) => {
                    info!(
                        provider = %name,
                        items = page.items.len(),
                        invalid = page.skipped,
                        "provider fetch complete"
                    );
                    invalid_items += page.skipped;
                    items.extend(page.items);
                }
                Ok(Err(error)) => {
                    warn!(provider = %name, %error, "provider fetch failed; run continues");
                    failed_providers += 1;
                }
                Err(_elapsed) => {
                    warn!(
                        provider = %name,
                        timeout_s = self.provider_timeout.as_secs(),
                        "provider fetch timed out; run continues"
                    );
                    failed_providers += 1;
                }
            }
        }
        FetchOutcome {
            items,
            invalid_items,
            failed_providers,
        }
    }

    /// Run one synchronization pass end to end.
    ///
    /// The returned batch is always finalized and already recorded in
    /// the store; `Err` is reserved for the audit write itself failing.
    pub async fn run_sync(&self, cancel: &CancellationToken) -> Result<SyncReport> {
        let names: Vec<String> = self.providers.iter().map(|p| p.name().to_string()).collect();
        let batch = SyncBatch::start(names)?;
        let batch_id = batch.id;
        info!(batch_id = %batch_id, providers = self.providers.len(), "sync run started");

        let fetched = self.fetch_all(cancel).await;
        // Validation-skipped items and failed providers both count as
        // failed items in the audit record.
        let batch = batch.record_failed_items(fetched.invalid_items + fetched.failed_providers);

        if fetched.items.is_empty() && fetched.failed_providers as usize == self.providers.len() {
            let batch = batch.fail("all providers failed");
            self.store.record_sync_batch(&batch).await?;
            return Ok(SyncReport {
                batch,
                incoming_ids: Vec::new(),
            });
        }

        let incoming_ids: Vec<String> = fetched.items.iter().map(|c| c.id.clone()).collect();
        let existing = self.store.get_by_ids(&incoming_ids).await?;
        let detection = detect_batch(fetched.items, &existing);

        let batch = batch
            .record_items_fetched(detection.total_processed() as u64)
            .record_change_results(
                detection.new_items.len() as u64,
                detection.updated_items.len() as u64,
                detection.unchanged_items.len() as u64,
            );
        info!(
            batch_id = %batch_id,
            new = detection.new_items.len(),
            updated = detection.updated_items.len(),
            unchanged = detection.unchanged_items.len(),
            change_pct = detection.change_percentage(),
            "change detection complete"
        );

        let outcome = self.gateway.apply(&detection, batch_id, cancel).await;
        let batch = batch.record_rows_affected(outcome.rows_affected);
        if !outcome.is_complete() {
            let reason = if outcome.cancelled {
                "run cancelled during persistence".to_string()
            } else {
                outcome
                    .failure
                    .unwrap_or_else(|| "persistence incomplete".to_string())
            };
            let batch = batch.fail(reason);
            self.store.record_sync_batch(&batch).await?;
            return Ok(SyncReport {
                batch,
                incoming_ids,
            });
        }

        if detection.has_changes() {
            // New-only runs announce Created; anything with updates is
            // Updated. The consumer re-fetches either way.
            let change_type = if detection.updated_items.is_empty() {
                ChangeType::Created
            } else {
                ChangeType::Updated
            };
            if let Err(fault) = self
                .notifier
                .publish_changes(
                    detection.changed_ids(),
                    change_type,
                    &self.provider_label(),
                    batch_id,
                )
                .await
            {
                // Persistence stands; the run still fails because the
                // index will not hear about these changes.
                let batch = batch.fail(fault.to_string());
                self.store.record_sync_batch(&batch).await?;
                return Ok(SyncReport {
                    batch,
                    incoming_ids,
                });
            }
        }

        let batch = batch.complete_successfully();
        self.store.record_sync_batch(&batch).await?;
        info!(
            batch_id = %batch_id,
            duration_ms = batch.duration_ms,
            rows = batch.database_rows_affected,
            "sync run complete"
        );
        Ok(SyncReport {
            batch,
            incoming_ids,
        })
    }

    /// Recompute scores for all stored content at the current instant.
    ///
    /// Freshness decays with age, so scores drift between syncs even
    /// when content does not change. Items whose score moved are
    /// written back through `bulk_update_scores` and announced as
    /// updated so the index catches up.
    pub async fn run_rescore(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let now = chrono::Utc::now();
        let stored = self.store.get_all().await?;
        let changed: Vec<(String, f64)> = stored
            .iter()
            .filter_map(|record| {
                let fresh = crate::score::calculate_score(&record.content, now);
                (fresh != record.score).then(|| (record.content.id.clone(), fresh))
            })
            .collect();

        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self.store.bulk_update_scores(&changed).await?;
        let ids: Vec<String> = changed.into_iter().map(|(id, _)| id).collect();
        let batch_id = Uuid::new_v4();
        self.notifier
            .publish_changes(
                ids.clone(),
                ChangeType::Updated,
                &self.provider_label(),
                batch_id,
            )
            .await?;

        info!(batch_id = %batch_id, rescored = ids.len(), rows, "rescore pass complete");
        Ok(ids)
    }

    /// Remove stored items no longer present at the sources.
    ///
    /// `live_ids` is the merged id set from a fully successful sync
    /// run; running this after a partial fetch would delete content the
    /// failed provider still owns, so callers must gate on success.
    pub async fn run_deletion_pass(
        &self,
        live_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let live: HashSet<&str> = live_ids.iter().map(String::as_str).collect();
        let stored = self.store.get_all().await?;
        let doomed: Vec<_> = stored
            .into_iter()
            .filter(|record| !live.contains(record.content.id.as_str()))
            .collect();

        if doomed.is_empty() {
            return Ok(Vec::new());
        }

        let batch_id = Uuid::new_v4();
        let deleted_ids: Vec<String> = doomed.iter().map(|r| r.content.id.clone()).collect();
        let outcome = self.gateway.apply_deletions(&doomed, batch_id, cancel).await;
        if !outcome.is_complete() {
            return Err(Fault::persistence(outcome.failure.unwrap_or_else(|| {
                "deletion pass cancelled or incomplete".to_string()
            })));
        }

        self.notifier
            .publish_changes(
                deleted_ids.clone(),
                ChangeType::Deleted,
                &self.provider_label(),
                batch_id,
            )
            .await?;

        info!(batch_id = %batch_id, deleted = deleted_ids.len(), "deletion pass complete");
        Ok(deleted_ids)
    }
}
