//! Drone entity.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{DroneId, OrderId};
use serde::{Deserialize, Serialize};

use crate::{DomainError, Location};

/// Operational status of a drone.
///
/// ```text
/// Active ◄──► Broken
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneStatus {
    /// Able to reserve and carry orders.
    #[default]
    Active,

    /// Reported broken; excluded from reservation until fixed.
    Broken,
}

impl DroneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DroneStatus::Active => "ACTIVE",
            DroneStatus::Broken => "BROKEN",
        }
    }
}

impl std::fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DroneStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(DroneStatus::Active),
            "BROKEN" => Ok(DroneStatus::Broken),
            other => Err(DomainError::UnknownDroneStatus(other.to_string())),
        }
    }
}

/// A drone in the fleet.
///
/// A drone carries at most one order at a time, referenced by ID through
/// `current_order_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub id: DroneId,
    pub status: DroneStatus,
    pub last_location: Option<Location>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub current_order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Drone {
    /// Creates the record for a drone seen for the first time.
    pub fn new(id: DroneId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: DroneStatus::Active,
            last_location: None,
            last_heartbeat_at: None,
            current_order_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == DroneStatus::Active
    }

    /// Returns true if the drone currently holds an order.
    pub fn is_busy(&self) -> bool {
        self.current_order_id.is_some()
    }
}
