//! Delivery order entity and its status lifecycle.

mod aggregate;
mod state;

pub use aggregate::Order;
pub use state::OrderStatus;
