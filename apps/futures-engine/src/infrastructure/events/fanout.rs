//! Publisher forwarding to several publishers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::application::ports::{EventPublishError, EventPublisherPort};
use crate::domain::order_chain::ChainEvent;

/// Forwards every batch to each inner publisher.
///
/// A failing publisher does not stop delivery to the others; the first
/// error is returned after all have been tried.
#[derive(Clone, Default)]
pub struct FanoutEventPublisher {
    publishers: Vec<Arc<dyn EventPublisherPort>>,
}

impl std::fmt::Debug for FanoutEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEventPublisher")
            .field("publishers", &self.publishers.len())
            .finish()
    }
}

impl FanoutEventPublisher {
    /// Create an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a publisher.
    #[must_use]
    pub fn with(mut self, publisher: Arc<dyn EventPublisherPort>) -> Self {
        self.publishers.push(publisher);
        self
    }

    /// Number of inner publishers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    /// Whether no publisher is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

#[async_trait]
impl EventPublisherPort for FanoutEventPublisher {
    async fn publish_chain_events(&self, events: Vec<ChainEvent>) -> Result<(), EventPublishError> {
        let mut first_error = None;
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish_chain_events(events.clone()).await {
                warn!(error = %e, "Event publisher failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
