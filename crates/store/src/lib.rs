//! Persistence contract for the drone dispatch core.
//!
//! The dispatch service only talks to storage through the [`Store`] and
//! [`StoreTx`] traits. Two implementations are provided:
//! - [`InMemoryStore`] for tests and single-process runs
//! - [`PostgresStore`] backed by `sqlx`
//!
//! Both also implement [`outbox::OutboxRepository`] so the outbox worker can
//! drain the events written inside store transactions.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::OrderFilter;
pub use store::{Store, StoreTx};
