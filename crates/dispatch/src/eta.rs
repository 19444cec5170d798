//! Location and ETA projection.
//!
//! Pure functions over an order and, optionally, the drone assigned to it.

use domain::{Drone, Location, Order, OrderStatus};

/// Default cruise speed, in meters per second.
pub const DEFAULT_SPEED_MPS: f64 = 15.0;

/// Where the package effectively is right now.
///
/// - `Created` / `Reserved`: the order's origin
/// - `PickedUp`: the drone's last reported location, if any
/// - `HandoffRequested`: the stored handoff origin
/// - terminal: none
pub fn current_location(order: &Order, drone: Option<&Drone>) -> Option<Location> {
    match order.status {
        OrderStatus::Created | OrderStatus::Reserved => Some(order.origin),
        OrderStatus::PickedUp => drone.and_then(|d| d.last_location),
        OrderStatus::HandoffRequested => order.handoff_origin,
        OrderStatus::Delivered | OrderStatus::Failed | OrderStatus::Withdrawn => None,
    }
}

/// Estimated whole seconds until the package reaches its destination.
///
/// Great-circle distance from [`current_location`] to the destination
/// divided by `speed_mps`, rounded down. Absent for terminal orders, when
/// no location is known, or when the speed is not positive.
pub fn compute_eta_seconds(order: &Order, drone: Option<&Drone>, speed_mps: f64) -> Option<i64> {
    if order.is_terminal() || speed_mps.is_nan() || speed_mps <= 0.0 {
        return None;
    }
    let from = current_location(order, drone)?;
    let distance = from.haversine_meters(&order.destination);
    Some(((distance / speed_mps).floor() as i64).max(0))
}
