//! Publisher writing events to the log.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::ports::{EventPublishError, EventPublisherPort};
use crate::domain::order_chain::{ChainEvent, ChainEventKind};

/// Logs every event; protection failures at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    /// Create a logging publisher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisherPort for LoggingEventPublisher {
    async fn publish_chain_events(&self, events: Vec<ChainEvent>) -> Result<(), EventPublishError> {
        for event in events {
            let payload = serde_json::to_string(&event.kind).map_err(|e| {
                EventPublishError::SerializationError {
                    message: e.to_string(),
                }
            })?;
            if matches!(event.kind, ChainEventKind::ProtectionFailed { .. }) {
                warn!(
                    event_id = %event.event_id,
                    chain_id = %event.chain_id,
                    symbol = %event.symbol,
                    event_type = event.event_type(),
                    payload = %payload,
                    "Chain event"
                );
            } else {
                info!(
                    event_id = %event.event_id,
                    chain_id = %event.chain_id,
                    symbol = %event.symbol,
                    event_type = event.event_type(),
                    payload = %payload,
                    "Chain event"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::{ChainId, Symbol};
    use chrono::Utc;

    #[tokio::test]
    async fn logs_without_error() {
        let event = ChainEvent::new(
            ChainId::new("SCA-16OCT-00001"),
            Symbol::new("BTCUSDT"),
            Utc::now(),
            ChainEventKind::ProtectionFailed {
                failures: 1,
                reason: "timeout".to_string(),
            },
        );
        tokio_test::assert_ok!(LoggingEventPublisher::new().publish_chain_event(event).await);
    }
}
