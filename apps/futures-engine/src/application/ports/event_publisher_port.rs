//! Event Publisher Port (Driven Port)
//!
//! Interface for publishing chain lifecycle events to external systems.
//! Delivery is at-least-once; consumers dedupe on `event_id`.

use async_trait::async_trait;

use crate::domain::order_chain::ChainEvent;

/// Event publishing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventPublishError {
    /// Connection error.
    #[error("Event publish connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// Serialization error.
    #[error("Event serialization error: {message}")]
    SerializationError {
        /// Error details.
        message: String,
    },

    /// Publishing failed.
    #[error("Event publish failed: {message}")]
    PublishFailed {
        /// Error details.
        message: String,
    },
}

/// Port for publishing chain events.
#[async_trait]
pub trait EventPublisherPort: Send + Sync {
    /// Publish chain events in order.
    async fn publish_chain_events(&self, events: Vec<ChainEvent>) -> Result<(), EventPublishError>;

    /// Publish a single chain event.
    async fn publish_chain_event(&self, event: ChainEvent) -> Result<(), EventPublishError> {
        self.publish_chain_events(vec![event]).await
    }
}

/// No-op event publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisherPort for NoOpEventPublisher {
    async fn publish_chain_events(
        &self,
        _events: Vec<ChainEvent>,
    ) -> Result<(), EventPublishError> {
        Ok(())
    }
}
