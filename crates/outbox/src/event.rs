use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{DroneId, OrderId, UserId};
use domain::{Drone, DroneStatus, Order, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::{EventId, OutboxError};

/// The kind of state change an outbox event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.reserved")]
    OrderReserved,
    #[serde(rename = "order.picked_up")]
    OrderPickedUp,
    #[serde(rename = "order.delivered")]
    OrderDelivered,
    #[serde(rename = "order.failed")]
    OrderFailed,
    #[serde(rename = "order.handoff_requested")]
    OrderHandoffRequested,
    #[serde(rename = "order.withdrawn")]
    OrderWithdrawn,
    #[serde(rename = "order.updated")]
    OrderUpdated,
    #[serde(rename = "drone.broken")]
    DroneBroken,
    #[serde(rename = "drone.fixed")]
    DroneFixed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "order.created",
            EventType::OrderReserved => "order.reserved",
            EventType::OrderPickedUp => "order.picked_up",
            EventType::OrderDelivered => "order.delivered",
            EventType::OrderFailed => "order.failed",
            EventType::OrderHandoffRequested => "order.handoff_requested",
            EventType::OrderWithdrawn => "order.withdrawn",
            EventType::OrderUpdated => "order.updated",
            EventType::DroneBroken => "drone.broken",
            EventType::DroneFixed => "drone.fixed",
        }
    }

    /// The aggregate this event type is reported against.
    pub fn aggregate_kind(&self) -> AggregateKind {
        match self {
            EventType::DroneBroken | EventType::DroneFixed => AggregateKind::Drone,
            _ => AggregateKind::Order,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let event_type = match s {
            "order.created" => EventType::OrderCreated,
            "order.reserved" => EventType::OrderReserved,
            "order.picked_up" => EventType::OrderPickedUp,
            "order.delivered" => EventType::OrderDelivered,
            "order.failed" => EventType::OrderFailed,
            "order.handoff_requested" => EventType::OrderHandoffRequested,
            "order.withdrawn" => EventType::OrderWithdrawn,
            "order.updated" => EventType::OrderUpdated,
            "drone.broken" => EventType::DroneBroken,
            "drone.fixed" => EventType::DroneFixed,
            other => {
                return Err(OutboxError::InvalidRecord(format!(
                    "unknown event type {other}"
                )));
            }
        };
        Ok(event_type)
    }
}

/// Aggregate an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Order,
    Drone,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Order => "order",
            AggregateKind::Drone => "drone",
        }
    }
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateKind {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(AggregateKind::Order),
            "drone" => Ok(AggregateKind::Drone),
            other => Err(OutboxError::InvalidRecord(format!(
                "unknown aggregate type {other}"
            ))),
        }
    }
}

/// Payload of every `order.*` event.
///
/// Consumers must ignore fields they do not know; new fields may be added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEventPayload {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub user_id: UserId,
    /// The assigned drone, or the drone that caused the change when the
    /// change cleared the assignment (handoff, requeue).
    pub drone_id: Option<DroneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drone_status: Option<DroneStatus>,
    pub occurred_at: DateTime<Utc>,
}

/// Payload of every `drone.*` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneEventPayload {
    pub drone_id: DroneId,
    pub status: DroneStatus,
    pub occurred_at: DateTime<Utc>,
}

/// A row of the outbox.
///
/// Written in the same transaction as the change it reports, published by
/// the worker, then stamped with `published_at` once. Never deleted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: EventId,
    pub event_type: EventType,
    pub aggregate_type: AggregateKind,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Builds an unpublished event from an already-serialized payload.
    pub fn new(
        event_type: EventType,
        aggregate_id: impl Into<String>,
        payload: serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            aggregate_type: event_type.aggregate_kind(),
            aggregate_id: aggregate_id.into(),
            payload,
            occurred_at,
            published_at: None,
        }
    }

    /// Builds an `order.*` event from the order's state after the change.
    ///
    /// `drone` is the drone involved in the change, if any.
    pub fn for_order(
        event_type: EventType,
        order: &Order,
        drone: Option<&Drone>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, OutboxError> {
        let payload = OrderEventPayload {
            order_id: order.id,
            status: order.status,
            user_id: order.user_id.clone(),
            drone_id: order
                .assigned_drone_id
                .clone()
                .or_else(|| drone.map(|d| d.id.clone())),
            drone_status: drone.map(|d| d.status),
            occurred_at,
        };
        Ok(Self::new(
            event_type,
            order.id.to_string(),
            serde_json::to_value(&payload)?,
            occurred_at,
        ))
    }

    /// Builds a `drone.*` event from the drone's state after the change.
    pub fn for_drone(
        event_type: EventType,
        drone: &Drone,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, OutboxError> {
        let payload = DroneEventPayload {
            drone_id: drone.id.clone(),
            status: drone.status,
            occurred_at,
        };
        Ok(Self::new(
            event_type,
            drone.id.as_str(),
            serde_json::to_value(&payload)?,
            occurred_at,
        ))
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }
}
