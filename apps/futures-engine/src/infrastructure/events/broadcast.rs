//! In-process broadcast of chain events.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::ports::{EventPublishError, EventPublisherPort};
use crate::domain::order_chain::ChainEvent;

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Sends events to every subscriber.
///
/// Publishing with no subscribers is not an error. Slow subscribers lag and
/// lose the oldest events; they should dedupe on `event_id` after resync.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    tx: broadcast::Sender<ChainEvent>,
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastEventPublisher {
    /// Create a publisher with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventPublisherPort for BroadcastEventPublisher {
    async fn publish_chain_events(&self, events: Vec<ChainEvent>) -> Result<(), EventPublishError> {
        for event in events {
            // Err only means nobody is listening.
            let _ = self.tx.send(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_chain::ChainEventKind;
    use crate::domain::shared::{ChainId, Symbol};
    use chrono::Utc;

    fn event() -> ChainEvent {
        ChainEvent::new(
            ChainId::new("SCA-16OCT-00001"),
            Symbol::new("BTCUSDT"),
            Utc::now(),
            ChainEventKind::ChainCancelled,
        )
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let publisher = BroadcastEventPublisher::new(8);
        let mut rx = publisher.subscribe();
        let (a, b) = (event(), event());
        publisher
            .publish_chain_events(vec![a.clone(), b.clone()])
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().event_id, a.event_id);
        assert_eq!(rx.recv().await.unwrap().event_id, b.event_id);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_ok() {
        let publisher = BroadcastEventPublisher::default();
        assert_eq!(publisher.subscriber_count(), 0);
        assert!(publisher.publish_chain_event(event()).await.is_ok());
    }
}
