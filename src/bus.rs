//! Message bus collaborator.
//!
//! Delivery is fan-out: every subscriber receives every published
//! notification, with no partitioning. The in-memory implementation
//! backs local runs and tests; a broker-backed implementation would
//! plug in behind the same trait.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::ChangeNotification;

/// Fan-out publish/subscribe boundary.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Deliver one notification to every current subscriber.
    async fn publish(&self, notification: ChangeNotification) -> Result<()>;

    /// Register a new subscriber. Only notifications published after
    /// this call are delivered to it.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeNotification>;
}

/// In-process bus: a sender per subscriber, every publish goes to all.
///
/// Contention is low (one publisher per sync run), so a plain mutex
/// over the subscriber list is enough.
#[derive(Default)]
pub struct InMemoryBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeNotification>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current live subscriber count; test helper.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, notification: ChangeNotification) -> Result<()> {
        let mut subscribers = self.subscribers.lock().unwrap();
        // Prune subscribers whose receiver has been dropped.
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());

        info!(
            batch_id = %notification.batch_id,
            change_type = notification.change_type.as_str(),
            ids = notification.content_ids.len(),
            subscribers = subscribers.len(),
            "published change notification"
        );
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        debug!("bus subscriber registered");
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeType;
    use uuid::Uuid;

    fn make_notification(ids: Vec<&str>) -> ChangeNotification {
        ChangeNotification::new(
            ids.into_iter().map(String::from).collect(),
            ChangeType::Created,
            "devblog",
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = InMemoryBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(make_notification(vec!["a1", "a2"])).await.unwrap();

        let n1 = rx1.try_recv().unwrap();
        let n2 = rx2.try_recv().unwrap();
        assert_eq!(n1.content_ids, vec!["a1", "a2"]);
        assert_eq!(n2.content_ids, n1.content_ids);
        assert_eq!(n1.batch_id, n2.batch_id);
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = InMemoryBus::new();
        let rx = bus.subscribe();
        let _rx2 = bus.subscribe();
        drop(rx);

        bus.publish(make_notification(vec!["a1"])).await.unwrap();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_subscription_sees_only_later_publishes() {
        let bus = InMemoryBus::new();
        bus.publish(make_notification(vec!["before"])).await.unwrap();

        let mut rx = bus.subscribe();
        bus.publish(make_notification(vec!["after"])).await.unwrap();

        let n = rx.try_recv().unwrap();
        assert_eq!(n.content_ids, vec!["after"]);
        assert!(rx.try_recv().is_err());
    }
}
