use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{DroneId, EventId, OrderId};
use domain::{Drone, Order, OrderStatus};
use outbox::{OutboxEvent, OutboxRepository};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    OrderFilter, Result, StoreError,
    store::{Store, StoreTx},
};

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    drones: BTreeMap<DroneId, Drone>,
    events: Vec<OutboxEvent>,
}

/// In-memory store implementation for testing and single-process runs.
///
/// Transactions are serialized: [`Store::begin`] waits for the previous
/// transaction to finish. Writes are buffered in the transaction and merged
/// into the committed state on commit, so readers never observe a partial
/// transaction.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every committed outbox event, published or not, in write order.
    pub async fn events(&self) -> Vec<OutboxEvent> {
        self.state.read().await.events.clone()
    }

    /// Returns the number of committed events not yet published.
    pub async fn pending_event_count(&self) -> usize {
        self.state
            .read()
            .await
            .events
            .iter()
            .filter(|e| !e.is_published())
            .count()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(InMemoryTx {
            state: self.state.clone(),
            guard: Some(guard),
            orders: HashMap::new(),
            drones: HashMap::new(),
            events: Vec::new(),
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(orders
            .into_iter()
            .skip(filter.offset)
            .take(filter.effective_limit())
            .collect())
    }

    async fn get_drone(&self, id: &DroneId) -> Result<Option<Drone>> {
        Ok(self.state.read().await.drones.get(id).cloned())
    }

    async fn list_drones(&self) -> Result<Vec<Drone>> {
        Ok(self.state.read().await.drones.values().cloned().collect())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryStore {
    async fn fetch_pending(&self, limit: usize) -> outbox::Result<Vec<OutboxEvent>> {
        let state = self.state.read().await;
        let mut pending: Vec<_> = state
            .events
            .iter()
            .filter(|e| !e.is_published())
            .cloned()
            .collect();
        // Stable sort keeps write order for equal timestamps.
        pending.sort_by_key(|e| e.occurred_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_published(&self, ids: &[EventId]) -> outbox::Result<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        for event in state.events.iter_mut() {
            if event.published_at.is_none() && ids.contains(&event.id) {
                event.published_at = Some(now);
            }
        }
        Ok(())
    }
}

/// Transaction over an [`InMemoryStore`].
///
/// Holds the store's writer lock for its whole lifetime.
pub struct InMemoryTx {
    state: Arc<RwLock<State>>,
    guard: Option<OwnedMutexGuard<()>>,
    orders: HashMap<OrderId, Order>,
    drones: HashMap<DroneId, Drone>,
    events: Vec<OutboxEvent>,
}

impl InMemoryTx {
    fn ensure_open(&self) -> Result<()> {
        if self.guard.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(())
    }

    async fn order_exists(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id) || self.state.read().await.orders.contains_key(&id)
    }

    async fn drone_exists(&self, id: &DroneId) -> bool {
        self.drones.contains_key(id) || self.state.read().await.drones.contains_key(id)
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn get_order_for_update(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.ensure_open()?;
        if let Some(order) = self.orders.get(&id) {
            return Ok(Some(order.clone()));
        }
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn get_drone_for_update(&mut self, id: &DroneId) -> Result<Option<Drone>> {
        self.ensure_open()?;
        if let Some(drone) = self.drones.get(id) {
            return Ok(Some(drone.clone()));
        }
        Ok(self.state.read().await.drones.get(id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.ensure_open()?;
        if self.order_exists(order.id).await {
            return Err(StoreError::Conflict {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_drone(&mut self, drone: &Drone) -> Result<()> {
        self.ensure_open()?;
        if self.drone_exists(&drone.id).await {
            return Err(StoreError::Conflict {
                entity: "drone",
                id: drone.id.to_string(),
            });
        }
        self.drones.insert(drone.id.clone(), drone.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        self.ensure_open()?;
        if !self.order_exists(order.id).await {
            return Err(StoreError::order_not_found(order.id));
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_drone(&mut self, drone: &Drone) -> Result<()> {
        self.ensure_open()?;
        if !self.drone_exists(&drone.id).await {
            return Err(StoreError::drone_not_found(&drone.id));
        }
        self.drones.insert(drone.id.clone(), drone.clone());
        Ok(())
    }

    async fn reserve_next_order(&mut self, statuses: &[OrderStatus]) -> Result<Option<Order>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        let eligible = |o: &&Order| statuses.contains(&o.status) && o.assigned_drone_id.is_none();

        // Pending writes of this transaction shadow the committed rows.
        let candidate = state
            .orders
            .values()
            .filter(|o| !self.orders.contains_key(&o.id))
            .chain(self.orders.values())
            .filter(eligible)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned();

        Ok(candidate)
    }

    async fn enqueue_event(&mut self, event: &OutboxEvent) -> Result<()> {
        self.ensure_open()?;
        self.events.push(event.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        let guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        {
            let mut state = self.state.write().await;
            state.orders.extend(self.orders.drain());
            state.drones.extend(self.drones.drain());
            state.events.append(&mut self.events);
        }
        drop(guard);
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        self.guard.take().ok_or(StoreError::TransactionClosed)?;
        Ok(())
    }
}
