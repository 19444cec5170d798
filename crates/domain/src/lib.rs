//! Domain model for the drone dispatch system.
//!
//! This crate provides the entities shared by the service and storage layers:
//! - [`Order`] with its [`OrderStatus`] lifecycle and transition guards
//! - [`Drone`] with its [`DroneStatus`]
//! - [`Location`] coordinates, range validation and great-circle distance
//! - [`Role`] of the caller performing an operation
//!
//! Entities reference each other by ID only. Nothing here touches storage.

pub mod drone;
pub mod error;
pub mod location;
pub mod order;
pub mod role;

pub use common::{DroneId, EventId, OrderId, UserId};
pub use drone::{Drone, DroneStatus};
pub use error::DomainError;
pub use location::Location;
pub use order::{Order, OrderStatus};
pub use role::Role;
