//! Change notifier.
//!
//! Publishes exactly one [`ChangeNotification`] per synchronization run
//! carrying only the changed ids. Publishing retries with bounded
//! exponential backoff; exhaustion marks the whole run failed even when
//! persistence succeeded, because indexing will not happen downstream.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::error::{Fault, Result};
use crate::models::{ChangeNotification, ChangeType};

/// Bounded exponential backoff curve, passed explicitly at setup.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based): doubling from the
    /// initial delay, capped at the maximum.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Publishes run-level change notifications over the bus.
pub struct ChangeNotifier {
    bus: Arc<dyn MessageBus>,
    policy: BackoffPolicy,
}

impl ChangeNotifier {
    pub fn new(bus: Arc<dyn MessageBus>, policy: BackoffPolicy) -> Self {
        Self { bus, policy }
    }

    /// Publish one notification for the run, retrying on failure.
    ///
    /// Returns [`Fault::Publish`] once the retry budget is exhausted.
    pub async fn publish_changes(
        &self,
        content_ids: Vec<String>,
        change_type: ChangeType,
        source_provider: &str,
        batch_id: Uuid,
    ) -> Result<ChangeNotification> {
        let notification =
            ChangeNotification::new(content_ids, change_type, source_provider, batch_id);

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            match self.bus.publish(notification.clone()).await {
                Ok(()) => {
                    info!(
                        batch_id = %batch_id,
                        attempt,
                        ids = notification.content_ids.len(),
                        "change notification published"
                    );
                    return Ok(notification);
                }
                Err(fault) => {
                    last_error = fault.to_string();
                    if attempt < self.policy.max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            batch_id = %batch_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_error,
                            "publish failed; backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(Fault::publish(format!(
            "notification for batch {} undeliverable after {} attempts: {}",
            batch_id, self.policy.max_attempts, last_error
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    /// Bus that fails the first N publishes.
    struct FlakyBus {
        inner: InMemoryBus,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl MessageBus for FlakyBus {
        async fn publish(&self, notification: ChangeNotification) -> Result<()> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Fault::transient("bus", "broker unavailable"));
            }
            self.inner.publish(notification).await
        }

        fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeNotification> {
            self.inner.subscribe()
        }
    }

    fn fast_policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_curve_doubles_and_caps() {
        let policy = BackoffPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_publish_succeeds_first_try() {
        let bus = Arc::new(InMemoryBus::new());
        let mut rx = bus.subscribe();
        let notifier = ChangeNotifier::new(bus, fast_policy(3));

        let batch_id = Uuid::new_v4();
        let sent = notifier
            .publish_changes(
                vec!["a1".into(), "a2".into()],
                ChangeType::Created,
                "devblog",
                batch_id,
            )
            .await
            .unwrap();

        assert_eq!(sent.batch_id, batch_id);
        let received = rx.try_recv().unwrap();
        assert_eq!(received.content_ids, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_publish_retries_then_succeeds() {
        let bus = Arc::new(FlakyBus {
            inner: InMemoryBus::new(),
            failures_left: AtomicU32::new(2),
        });
        let mut rx = bus.subscribe();
        let notifier = ChangeNotifier::new(bus, fast_policy(3));

        notifier
            .publish_changes(vec!["a1".into()], ChangeType::Updated, "devblog", Uuid::new_v4())
            .await
            .unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_publish_exhaustion_is_publish_fault() {
        let bus = Arc::new(FlakyBus {
            inner: InMemoryBus::new(),
            failures_left: AtomicU32::new(10),
        });
        let notifier = ChangeNotifier::new(bus, fast_policy(3));

        let err = notifier
            .publish_changes(vec!["a1".into()], ChangeType::Created, "devblog", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Fault::Publish(_)));
    }
}
