//! Order chain value objects.

mod chain_status;
mod leg_role;
mod leg_status;
mod order_type;
mod side;
mod trading_mode;

pub use chain_status::ChainStatus;
pub use leg_role::{LegRole, UnknownLegRole};
pub use leg_status::LegStatus;
pub use order_type::LegOrderType;
pub use side::{OrderSide, PositionSide};
pub use trading_mode::TradingMode;
