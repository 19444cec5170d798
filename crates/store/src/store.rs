use async_trait::async_trait;
use common::{DroneId, OrderId};
use domain::{Drone, Order, OrderStatus};
use outbox::{OutboxEvent, OutboxRepository};

use crate::{OrderFilter, Result};

/// Entry point to the persisted state of the dispatch core.
///
/// Reads outside a transaction see committed state only. Every mutation
/// goes through a [`StoreTx`] obtained from [`Store::begin`].
///
/// Implementations also serve as the outbox repository so the worker reads
/// the same events the transactions wrote.
#[async_trait]
pub trait Store: OutboxRepository + Clone + Send + Sync + 'static {
    /// Transaction handle type.
    type Tx: StoreTx;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Retrieves an order by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders, oldest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;

    /// Retrieves a drone by ID.
    async fn get_drone(&self, id: &DroneId) -> Result<Option<Drone>>;

    /// Lists all known drones ordered by ID.
    async fn list_drones(&self) -> Result<Vec<Drone>>;
}

/// A unit of work over orders, drones and the outbox.
///
/// Either every write made through the transaction becomes visible on
/// [`commit`](StoreTx::commit), or none does. Dropping the handle without
/// committing rolls back.
///
/// Rows returned by the `*_for_update` and `reserve_next_order` methods stay
/// locked against other transactions until commit or rollback.
#[async_trait]
pub trait StoreTx: Send {
    /// Reads and locks an order.
    async fn get_order_for_update(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Reads and locks a drone.
    async fn get_drone_for_update(&mut self, id: &DroneId) -> Result<Option<Drone>>;

    /// Inserts a new order. Fails with `Conflict` if the ID exists.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Inserts a new drone. Fails with `Conflict` if the ID exists.
    async fn insert_drone(&mut self, drone: &Drone) -> Result<()>;

    /// Overwrites an existing order. Fails with `NotFound` if it is missing.
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    /// Overwrites an existing drone. Fails with `NotFound` if it is missing.
    async fn update_drone(&mut self, drone: &Drone) -> Result<()>;

    /// Locks and returns the oldest unassigned order whose status is one of
    /// `statuses`.
    ///
    /// Orders locked by a concurrent transaction are skipped rather than
    /// waited on, so two transactions never receive the same order.
    async fn reserve_next_order(&mut self, statuses: &[OrderStatus]) -> Result<Option<Order>>;

    /// Appends an event to the outbox as part of this transaction.
    async fn enqueue_event(&mut self, event: &OutboxEvent) -> Result<()>;

    /// Makes every write of this transaction visible atomically.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(self) -> Result<()>;
}
