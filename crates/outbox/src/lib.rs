//! Transactional outbox for the drone dispatch system.
//!
//! State changes and the events describing them are written in one store
//! transaction. This crate provides the pieces that get those events out:
//! - [`OutboxEvent`] and the typed payload builders
//! - [`OutboxRepository`], the store-side contract for draining the outbox
//! - [`EventPublisher`] with NATS, logging and in-memory implementations
//! - [`OutboxWorker`], the poll loop that publishes and marks events
//!
//! Delivery is at least once. A crash between a successful publish and the
//! mark-published write redelivers the event, so consumers must treat
//! [`EventId`] as an idempotency key.

pub mod error;
pub mod event;
pub mod publisher;
pub mod repository;
pub mod worker;

pub use common::EventId;
pub use error::{OutboxError, Result};
pub use event::{AggregateKind, DroneEventPayload, EventType, OrderEventPayload, OutboxEvent};
pub use publisher::{
    DEFAULT_NATS_SUBJECT, EventPublisher, InMemoryPublisher, LogPublisher, NatsPublisher,
};
pub use repository::OutboxRepository;
pub use worker::{CycleReport, OutboxWorker, OutboxWorkerConfig};
