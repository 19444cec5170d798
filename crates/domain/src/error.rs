//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by domain validation and invariant checks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// Latitude outside [-90, 90].
    #[error("Latitude out of range: {0}")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180].
    #[error("Longitude out of range: {0}")]
    LongitudeOutOfRange(f64),

    /// A status string did not name a known order status.
    #[error("Unknown order status: {0}")]
    UnknownOrderStatus(String),

    /// A status string did not name a known drone status.
    #[error("Unknown drone status: {0}")]
    UnknownDroneStatus(String),

    /// A role string did not name a known role.
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// The assigned drone does not agree with the order status.
    #[error("Order in {status} state has inconsistent drone assignment")]
    AssignmentMismatch { status: OrderStatus },

    /// A handoff origin is present outside HANDOFF_REQUESTED.
    #[error("Order in {status} state must not carry a handoff origin")]
    UnexpectedHandoffOrigin { status: OrderStatus },
}
