use domain::{Drone, Location, Order};
use serde::Serialize;

/// Read projection of an order with its live position and ETA.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub current_location: Option<Location>,
    pub eta_seconds: Option<i64>,
}

/// A drone together with the projection of the order it carries, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroneStatusView {
    pub drone: Drone,
    pub current_order: Option<OrderView>,
}
