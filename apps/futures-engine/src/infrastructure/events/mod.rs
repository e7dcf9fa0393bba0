//! Chain event publishers.
//!
//! - `LoggingEventPublisher`: one structured log line per event
//! - `BroadcastEventPublisher`: in-process fan-out over `tokio::sync::broadcast`
//! - `FanoutEventPublisher`: forwards to several publishers

mod broadcast;
mod fanout;
mod logging;

pub use broadcast::BroadcastEventPublisher;
pub use fanout::FanoutEventPublisher;
pub use logging::LoggingEventPublisher;
