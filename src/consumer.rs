//! Index consumer.
//!
//! Subscribes to the message bus and keeps the search index in step
//! with durable storage. Notifications are dirty-bits: the consumer
//! always re-fetches the named ids from the store before indexing, so
//! redelivery and out-of-order arrival cannot write stale data.
//!
//! Failure handling is layered: per-document partitioning inside the
//! backend, bounded retries with an additive backoff curve around each
//! notification, and a circuit breaker that fails fast once retries
//! keep exhausting.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::SearchBackend;
use crate::error::{Fault, Result};
use crate::models::{ChangeNotification, ChangeType, SearchDocument};
use crate::store::ContentStore;

pub const CHECKPOINT_NAME: &str = "index-consumer";

/// Additive retry curve for one notification: the delay grows by a
/// fixed step per attempt, capped at a maximum.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub step: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            step: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let extra = self.step.saturating_mul(attempt.saturating_sub(1));
        self.initial_delay.saturating_add(extra).min(self.max_delay)
    }
}

/// Threshold circuit breaker guarding the indexing path.
#[derive(Debug, Clone)]
pub struct BreakerPolicy {
    /// Consecutive exhausted-retry failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a half-open probe.
    pub cooldown: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Closed → Open after N consecutive failures; Open → HalfOpen once the
/// cooldown elapses; the half-open probe decides Closed or Open again.
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed right now. An open circuit flips to
    /// half-open once its cooldown has elapsed, admitting one probe.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.policy.cooldown)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = BreakerState::HalfOpen;
                    info!("circuit breaker half-open; admitting probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != BreakerState::Closed {
            info!("circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        let tripped = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.policy.failure_threshold;
        if tripped {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(
                failures = inner.consecutive_failures,
                cooldown_s = self.policy.cooldown.as_secs(),
                "circuit breaker open"
            );
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().unwrap().state == BreakerState::Open
    }
}

/// Count- and time-based checkpoint cadence.
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    pub every_n: u64,
    pub every: Duration,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            every_n: 50,
            every: Duration::from_secs(30),
        }
    }
}

/// Consumes change notifications and drives the search backend.
pub struct IndexConsumer {
    store: Arc<dyn ContentStore>,
    backend: Arc<dyn SearchBackend>,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    checkpoint: CheckpointPolicy,
    concurrency: Arc<Semaphore>,
}

impl IndexConsumer {
    pub fn new(
        store: Arc<dyn ContentStore>,
        backend: Arc<dyn SearchBackend>,
        retry: RetryPolicy,
        breaker_policy: BreakerPolicy,
        checkpoint: CheckpointPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            backend,
            retry,
            breaker: Arc::new(CircuitBreaker::new(breaker_policy)),
            checkpoint,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn with_defaults(store: Arc<dyn ContentStore>, backend: Arc<dyn SearchBackend>) -> Self {
        Self::new(
            store,
            backend,
            RetryPolicy::default(),
            BreakerPolicy::default(),
            CheckpointPolicy::default(),
            4,
        )
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Handle one notification end to end: re-fetch, project, index (or
    /// delete), with retries and the breaker around the whole attempt.
    pub async fn process(&self, notification: &ChangeNotification) -> Result<()> {
        if notification.content_ids.is_empty() {
            warn!(batch_id = %notification.batch_id, "notification carries no ids; acknowledged");
            return Ok(());
        }

        if !self.breaker.allow() {
            return Err(Fault::index(format!(
                "circuit open; rejecting notification for batch {}",
                notification.batch_id
            )));
        }

        let mut last_error = String::new();
        for attempt in 1..=self.retry.max_attempts {
            match self.process_once(notification).await {
                Ok(()) => {
                    self.breaker.record_success();
                    return Ok(());
                }
                Err(fault) => {
                    last_error = fault.to_string();
                    if attempt < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            batch_id = %notification.batch_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_error,
                            "indexing attempt failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.breaker.record_failure();
        Err(Fault::index(format!(
            "notification for batch {} failed after {} attempts: {}",
            notification.batch_id, self.retry.max_attempts, last_error
        )))
    }

    async fn process_once(&self, notification: &ChangeNotification) -> Result<()> {
        if notification.change_type == ChangeType::Deleted {
            let removed = self.backend.bulk_delete(&notification.content_ids).await?;
            info!(
                batch_id = %notification.batch_id,
                requested = notification.content_ids.len(),
                removed,
                "removed deleted ids from index"
            );
            return Ok(());
        }

        // Dirty-bit semantics: the notification names ids, storage is
        // the source of truth for their current state.
        let records = self.store.get_by_ids(&notification.content_ids).await?;
        if records.is_empty() {
            warn!(
                batch_id = %notification.batch_id,
                ids = notification.content_ids.len(),
                "no notified ids found in storage; acknowledged"
            );
            return Ok(());
        }
        if records.len() < notification.content_ids.len() {
            debug!(
                batch_id = %notification.batch_id,
                notified = notification.content_ids.len(),
                found = records.len(),
                "some notified ids vanished from storage"
            );
        }

        let documents: Vec<SearchDocument> =
            records.iter().map(SearchDocument::from_persisted).collect();
        let result = self.backend.bulk_index(&documents).await?;

        if result.is_total_failure() {
            return Err(Fault::index(
                result
                    .error_message
                    .unwrap_or_else(|| "all documents failed to index".to_string()),
            ));
        }
        if result.is_partial_success() {
            warn!(
                batch_id = %notification.batch_id,
                failed_ids = ?result.failed_ids,
                "partial index success; failed documents dropped"
            );
        }
        info!(
            batch_id = %notification.batch_id,
            indexed = result.success_count,
            failed = result.failed_count,
            duration_ms = result.duration.as_millis() as u64,
            "notification indexed"
        );
        Ok(())
    }

    /// Run the consumption loop until the receiver closes or the token
    /// is cancelled. Notifications are handled concurrently up to the
    /// semaphore width; position is checkpointed by count and by time.
    pub async fn run(
        self: Arc<Self>,
        mut rx: tokio::sync::mpsc::UnboundedReceiver<ChangeNotification>,
        cancel: CancellationToken,
    ) -> Result<u64> {
        let mut tasks = tokio::task::JoinSet::new();
        let mut processed = 0u64;
        let mut since_checkpoint = 0u64;
        let mut last_checkpoint = Instant::now();
        let mut receiving = true;

        // Completion-order writes are accepted: full-document replace
        // keyed by id keeps same-id races harmless.
        while receiving || !tasks.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe = rx.recv(), if receiving => match maybe {
                    Some(notification) => {
                        let permit = match self.concurrency.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        let consumer = Arc::clone(&self);
                        tasks.spawn(async move {
                            let _permit = permit;
                            consumer.process(&notification).await
                        });
                    }
                    None => receiving = false,
                },
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    match finished {
                        Ok(Ok(())) => {}
                        Ok(Err(fault)) => error!(error = %fault, "notification processing failed"),
                        Err(join_err) => error!(error = %join_err, "consumer task panicked"),
                    }

                    processed += 1;
                    since_checkpoint += 1;
                    if since_checkpoint >= self.checkpoint.every_n
                        || last_checkpoint.elapsed() >= self.checkpoint.every
                    {
                        self.store
                            .set_checkpoint(CHECKPOINT_NAME, &processed.to_string())
                            .await?;
                        since_checkpoint = 0;
                        last_checkpoint = Instant::now();
                        debug!(processed, "consumer checkpoint written");
                    }
                }
            }
        }

        // Cancellation or channel close: let in-flight work finish.
        while let Some(finished) = tasks.join_next().await {
            match finished {
                Ok(Ok(())) => {}
                Ok(Err(fault)) => error!(error = %fault, "notification processing failed"),
                Err(join_err) => error!(error = %join_err, "consumer task panicked"),
            }
            processed += 1;
            since_checkpoint += 1;
        }

        if since_checkpoint > 0 {
            self.store
                .set_checkpoint(CHECKPOINT_NAME, &processed.to_string())
                .await?;
        }
        info!(processed, "consumer loop stopped");
        Ok(processed)
    }
}
