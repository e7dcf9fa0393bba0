//! Application Ports (Driver and Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! - **Driver Ports** (Primary/Inbound): How the world uses our application
//! - **Driven Ports** (Secondary/Outbound): How our application uses external systems

mod event_publisher_port;
mod exchange_port;
mod price_source_port;

pub use event_publisher_port::{EventPublishError, EventPublisherPort, NoOpEventPublisher};
pub use exchange_port::{
    ExchangeError, ExchangePort, OrderRef, OrderState, OrderVenue, PlaceOrderRequest,
    PlacementKind, PositionSnapshot,
};
pub use price_source_port::PriceSourcePort;
