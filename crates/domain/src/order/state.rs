//! Order status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// The status of a delivery order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► Reserved ──► PickedUp ──┬──► Delivered
///    │  ▲        │  ▲          │      └──► Failed
///    │  └────────┘  │          ▼
///    │  (drone      └──── HandoffRequested
///    │   broken)        (reserved again)
///    ▼
/// Withdrawn ◄── Reserved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Submitted and waiting for a drone.
    #[default]
    Created,

    /// Exclusively assigned to a drone that has not picked it up yet.
    Reserved,

    /// The package is on board the assigned drone.
    PickedUp,

    /// The carrying drone broke mid-flight; waiting for another drone to
    /// collect the package from where it was dropped.
    HandoffRequested,

    /// Delivered to the destination (terminal state).
    Delivered,

    /// The delivery failed (terminal state).
    Failed,

    /// Withdrawn by its owner before pickup (terminal state).
    Withdrawn,
}

impl OrderStatus {
    /// Statuses a drone may reserve work from, in no particular order.
    pub const RESERVABLE: [OrderStatus; 2] = [OrderStatus::Created, OrderStatus::HandoffRequested];

    /// Returns true if the order's owner may withdraw it in this status.
    pub fn can_withdraw(&self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::Reserved)
    }

    /// Returns true if the assigned drone may pick the order up in this status.
    pub fn can_pick_up(&self) -> bool {
        matches!(self, OrderStatus::Reserved | OrderStatus::HandoffRequested)
    }

    /// Returns true if the order can be delivered or failed in this status.
    pub fn can_complete(&self) -> bool {
        matches!(self, OrderStatus::PickedUp)
    }

    /// Returns true if the status requires an assigned drone.
    ///
    /// An order carries an assigned drone if and only if this is true.
    pub fn requires_drone(&self) -> bool {
        matches!(self, OrderStatus::Reserved | OrderStatus::PickedUp)
    }

    /// Returns true if this is a terminal status (no further mutation possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Failed | OrderStatus::Withdrawn
        )
    }

    /// Returns the status name as stored and published.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Reserved => "RESERVED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::HandoffRequested => "HANDOFF_REQUESTED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Withdrawn => "WITHDRAWN",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(OrderStatus::Created),
            "RESERVED" => Ok(OrderStatus::Reserved),
            "PICKED_UP" => Ok(OrderStatus::PickedUp),
            "HANDOFF_REQUESTED" => Ok(OrderStatus::HandoffRequested),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "FAILED" => Ok(OrderStatus::Failed),
            "WITHDRAWN" => Ok(OrderStatus::Withdrawn),
            other => Err(DomainError::UnknownOrderStatus(other.to_string())),
        }
    }
}
