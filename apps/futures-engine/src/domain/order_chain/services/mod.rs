//! Order chain domain services.

mod client_order_id;

pub use client_order_id::{
    ClientOrderIdGenerator, MAX_CLIENT_ORDER_ID_LEN, leg_token, parse_leg_token,
};
