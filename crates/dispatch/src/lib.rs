//! Order and drone lifecycle for drone delivery dispatch.
//!
//! [`DispatchService`] owns every state transition. Each operation runs in a
//! single store transaction that also appends the outbox events describing
//! the change, so state and notifications commit together.

pub mod error;
pub mod eta;
pub mod service;
pub mod view;

pub use error::{DispatchError, Result};
pub use eta::{DEFAULT_SPEED_MPS, compute_eta_seconds, current_location};
pub use service::DispatchService;
pub use view::{DroneStatusView, OrderView};
