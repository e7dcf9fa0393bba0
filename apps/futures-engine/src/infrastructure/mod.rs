//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - `exchange/`: the signed futures REST client and the paper exchange
//! - `events/`: chain event publishers (log, broadcast, fan-out)

pub mod events;
pub mod exchange;
