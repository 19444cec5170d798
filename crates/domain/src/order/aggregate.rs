//! Order aggregate.

use chrono::{DateTime, Utc};
use common::{DroneId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::{DomainError, Location};

use super::OrderStatus;

/// A delivery order.
///
/// The order never holds a drone, only the ID of the drone assigned to it.
/// Fields are public because the dispatch service owns every transition;
/// [`Order::check_invariants`] states what a persisted order must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub origin: Location,
    pub destination: Location,
    pub status: OrderStatus,
    pub assigned_drone_id: Option<DroneId>,
    /// Where the package was dropped by a broken drone. Only set while
    /// the order is [`OrderStatus::HandoffRequested`].
    pub handoff_origin: Option<Location>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Order {
    /// Creates a new order in [`OrderStatus::Created`].
    ///
    /// Coordinates are not validated here; callers validate before building.
    pub fn new(
        user_id: UserId,
        origin: Location,
        destination: Location,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            origin,
            destination,
            status: OrderStatus::Created,
            assigned_drone_id: None,
            handoff_origin: None,
            created_at: now,
            updated_at: now,
            reserved_at: None,
            picked_up_at: None,
            delivered_at: None,
            failed_at: None,
            failure_reason: None,
        }
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if `user_id` owns this order.
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    /// Returns true if `drone_id` is the drone currently assigned.
    pub fn is_assigned_to(&self, drone_id: &DroneId) -> bool {
        self.assigned_drone_id.as_ref() == Some(drone_id)
    }

    /// Checks the structural invariants tying status to the optional fields.
    ///
    /// - an assigned drone is present exactly when the status requires one
    /// - a handoff origin is present only while a handoff is requested
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.assigned_drone_id.is_some() != self.status.requires_drone() {
            return Err(DomainError::AssignmentMismatch {
                status: self.status,
            });
        }
        if self.handoff_origin.is_some() && self.status != OrderStatus::HandoffRequested {
            return Err(DomainError::UnexpectedHandoffOrigin {
                status: self.status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new(
            UserId::from("user-1"),
            Location::new(24.7136, 46.6753),
            Location::new(24.7743, 46.7386),
            Utc::now(),
        )
    }

    #[test]
    fn new_order_starts_created_and_unassigned() {
        let order = sample_order();
        assert_eq!(order.status, OrderStatus::Created);
        assert!(order.assigned_drone_id.is_none());
        assert!(order.handoff_origin.is_none());
        assert_eq!(order.created_at, order.updated_at);
        assert!(order.check_invariants().is_ok());
    }

    #[test]
    fn ownership_and_assignment_checks() {
        let mut order = sample_order();
        assert!(order.is_owned_by(&UserId::from("user-1")));
        assert!(!order.is_owned_by(&UserId::from("user-2")));

        let drone = DroneId::from("drone-a");
        assert!(!order.is_assigned_to(&drone));
        order.assigned_drone_id = Some(drone.clone());
        assert!(order.is_assigned_to(&drone));
        assert!(!order.is_assigned_to(&DroneId::from("drone-b")));
    }

    #[test]
    fn reserved_order_without_drone_violates_invariant() {
        let mut order = sample_order();
        order.status = OrderStatus::Reserved;
        assert_eq!(
            order.check_invariants(),
            Err(DomainError::AssignmentMismatch {
                status: OrderStatus::Reserved
            })
        );
        order.assigned_drone_id = Some(DroneId::from("drone-a"));
        assert!(order.check_invariants().is_ok());
    }

    #[test]
    fn created_order_with_drone_violates_invariant() {
        let mut order = sample_order();
        order.assigned_drone_id = Some(DroneId::from("drone-a"));
        assert!(order.check_invariants().is_err());
    }

    #[test]
    fn handoff_origin_only_while_handoff_requested() {
        let mut order = sample_order();
        order.status = OrderStatus::HandoffRequested;
        order.handoff_origin = Some(Location::new(24.74, 46.70));
        assert!(order.check_invariants().is_ok());

        order.status = OrderStatus::Created;
        assert_eq!(
            order.check_invariants(),
            Err(DomainError::UnexpectedHandoffOrigin {
                status: OrderStatus::Created
            })
        );
    }

    #[test]
    fn terminal_detection() {
        let mut order = sample_order();
        assert!(!order.is_terminal());
        order.status = OrderStatus::Withdrawn;
        assert!(order.is_terminal());
    }
}
