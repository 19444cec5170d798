//! Dispatch service orchestrating every order and drone transition.

use std::future::Future;

use chrono::{DateTime, Utc};
use common::{DroneId, OrderId, UserId};
use domain::{Drone, DroneStatus, Location, Order, OrderStatus, Role};
use outbox::{EventType, OutboxEvent};
use store::{OrderFilter, Store, StoreTx};

use crate::eta::{compute_eta_seconds, current_location};
use crate::{DispatchError, DroneStatusView, OrderView, Result};

/// How a picked-up order ends.
enum Completion {
    Delivered,
    Failed(String),
}

/// Service for the order and drone lifecycle.
///
/// Every mutating operation opens one transaction, locks the rows it reads,
/// validates against their current state, writes the new state together
/// with its outbox events and commits. Any early return drops the
/// transaction, which rolls it back.
pub struct DispatchService<S: Store> {
    store: S,
    speed_mps: f64,
}

impl<S: Store> DispatchService<S> {
    /// Creates a new service. `speed_mps` feeds the ETA projection.
    pub fn new(store: S, speed_mps: f64) -> Self {
        Self { store, speed_mps }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // -- End user --

    /// Creates a new order in `Created` and emits `order.created`.
    #[tracing::instrument(skip(self))]
    pub async fn submit_order(
        &self,
        user_id: &UserId,
        origin: Location,
        destination: Location,
    ) -> Result<Order> {
        observe("submit_order", async {
            validate_location("origin", &origin)?;
            validate_location("destination", &destination)?;

            let now = Utc::now();
            let order = Order::new(user_id.clone(), origin, destination, now);

            let mut tx = self.store.begin().await?;
            tx.insert_order(&order).await?;
            enqueue_order_event(&mut tx, EventType::OrderCreated, &order, None, now).await?;
            tx.commit().await?;

            tracing::info!(order_id = %order.id, "order submitted");
            Ok(order)
        })
        .await
    }

    /// Withdraws an order before pickup.
    ///
    /// Only the owner may withdraw, and only from `Created` or `Reserved`.
    /// A reserved order releases its drone.
    ///
    /// Rows are locked drone first, then order. The assigned drone is read
    /// from committed state; if the assignment moves before the order is
    /// locked the call fails with `Conflict` and may be retried.
    #[tracing::instrument(skip(self))]
    pub async fn withdraw_order(&self, user_id: &UserId, order_id: OrderId) -> Result<Order> {
        observe("withdraw_order", async {
            let assigned = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| DispatchError::order_not_found(order_id))?
                .assigned_drone_id;

            let mut tx = self.store.begin().await?;
            let mut released = match &assigned {
                Some(drone_id) => tx.get_drone_for_update(drone_id).await?,
                None => None,
            };
            let mut order = lock_order(&mut tx, order_id).await?;
            if order.assigned_drone_id != assigned {
                return Err(DispatchError::Conflict(format!(
                    "order {order_id} changed concurrently"
                )));
            }

            if !order.is_owned_by(user_id) {
                return Err(DispatchError::Forbidden(format!(
                    "order {order_id} belongs to another user"
                )));
            }
            if !order.status.can_withdraw() {
                return Err(DispatchError::Precondition(format!(
                    "cannot withdraw order in status {}",
                    order.status
                )));
            }

            let now = Utc::now();
            order.assigned_drone_id = None;
            if let Some(drone) = released.as_mut() {
                if drone.current_order_id == Some(order.id) {
                    drone.current_order_id = None;
                    drone.updated_at = now;
                    tx.update_drone(drone).await?;
                }
            }

            order.status = OrderStatus::Withdrawn;
            order.updated_at = now;
            save_order(&mut tx, &order).await?;
            enqueue_order_event(
                &mut tx,
                EventType::OrderWithdrawn,
                &order,
                released.as_ref(),
                now,
            )
            .await?;
            tx.commit().await?;

            tracing::info!(order_id = %order.id, "order withdrawn");
            Ok(order)
        })
        .await
    }

    /// Returns the projected view of an order.
    ///
    /// Admins may read any order; everyone else only their own.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_view(
        &self,
        requester: &UserId,
        role: Role,
        order_id: OrderId,
    ) -> Result<OrderView> {
        observe("get_order_view", async {
            let order = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| DispatchError::order_not_found(order_id))?;

            if role != Role::Admin && !order.is_owned_by(requester) {
                return Err(DispatchError::Forbidden(format!(
                    "order {order_id} belongs to another user"
                )));
            }

            self.build_view(order).await
        })
        .await
    }

    // -- Admin --

    /// Lists orders as projected views, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn admin_list_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderView>> {
        observe("admin_list_orders", async {
            let orders = self.store.list_orders(filter).await?;
            let mut views = Vec::with_capacity(orders.len());
            for order in orders {
                views.push(self.build_view(order).await?);
            }
            Ok(views)
        })
        .await
    }

    /// Replaces the origin and/or destination of a non-terminal order.
    #[tracing::instrument(skip(self))]
    pub async fn admin_update_order(
        &self,
        order_id: OrderId,
        origin: Option<Location>,
        destination: Option<Location>,
    ) -> Result<Order> {
        observe("admin_update_order", async {
            if origin.is_none() && destination.is_none() {
                return Err(DispatchError::Invalid(
                    "at least one of origin or destination is required".to_string(),
                ));
            }
            if let Some(origin) = &origin {
                validate_location("origin", origin)?;
            }
            if let Some(destination) = &destination {
                validate_location("destination", destination)?;
            }

            let mut tx = self.store.begin().await?;
            let mut order = lock_order(&mut tx, order_id).await?;
            ensure_not_terminal(&order)?;

            let now = Utc::now();
            if let Some(origin) = origin {
                order.origin = origin;
            }
            if let Some(destination) = destination {
                order.destination = destination;
            }
            order.updated_at = now;

            save_order(&mut tx, &order).await?;
            enqueue_order_event(&mut tx, EventType::OrderUpdated, &order, None, now).await?;
            tx.commit().await?;

            tracing::info!(order_id = %order.id, "order updated by admin");
            Ok(order)
        })
        .await
    }

    /// Lists every known drone ordered by ID.
    #[tracing::instrument(skip(self))]
    pub async fn admin_list_drones(&self) -> Result<Vec<Drone>> {
        observe("admin_list_drones", async { Ok(self.store.list_drones().await?) }).await
    }

    /// Marks a drone broken on behalf of an operator.
    pub async fn admin_mark_drone_broken(&self, drone_id: &DroneId) -> Result<Drone> {
        self.mark_drone_broken(drone_id).await
    }

    /// Marks a drone fixed on behalf of an operator.
    pub async fn admin_mark_drone_fixed(&self, drone_id: &DroneId) -> Result<Drone> {
        self.mark_drone_fixed(drone_id).await
    }

    // -- Drone --

    /// Reserves the oldest available order for a drone.
    ///
    /// The drone must be active and idle. Returns [`DispatchError::NoJob`]
    /// when nothing can be reserved. Reserving a handoff order turns its
    /// drop point into the new pickup origin.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_job(&self, drone_id: &DroneId) -> Result<Order> {
        let result = observe("reserve_job", async {
            let now = Utc::now();
            let mut tx = self.store.begin().await?;
            let mut drone = get_or_create_drone(&mut tx, drone_id, now).await?;

            if !drone.is_active() {
                return Err(DispatchError::Precondition(format!(
                    "drone {drone_id} is broken"
                )));
            }
            if drone.is_busy() {
                return Err(DispatchError::Conflict(format!(
                    "drone {drone_id} already holds an order"
                )));
            }

            let Some(mut order) = tx.reserve_next_order(&OrderStatus::RESERVABLE).await? else {
                return Err(DispatchError::NoJob);
            };

            if let Some(drop_point) = order.handoff_origin.take() {
                order.origin = drop_point;
            }
            order.status = OrderStatus::Reserved;
            order.assigned_drone_id = Some(drone.id.clone());
            order.reserved_at = Some(now);
            order.updated_at = now;
            save_order(&mut tx, &order).await?;

            drone.current_order_id = Some(order.id);
            drone.updated_at = now;
            tx.update_drone(&drone).await?;

            enqueue_order_event(&mut tx, EventType::OrderReserved, &order, Some(&drone), now)
                .await?;
            tx.commit().await?;

            tracing::info!(order_id = %order.id, drone_id = %drone.id, "order reserved");
            Ok(order)
        })
        .await;

        let outcome = match &result {
            Ok(_) => "reserved",
            Err(e) => e.kind(),
        };
        metrics::counter!("dispatch_reservations_total", "outcome" => outcome).increment(1);
        result
    }

    /// Records that the assigned drone collected the package.
    #[tracing::instrument(skip(self))]
    pub async fn pickup_order(&self, drone_id: &DroneId, order_id: OrderId) -> Result<Order> {
        observe("pickup_order", async {
            let mut tx = self.store.begin().await?;
            let mut order = lock_order(&mut tx, order_id).await?;
            ensure_not_terminal(&order)?;
            ensure_assigned(&order, drone_id)?;

            if !order.status.can_pick_up() {
                return Err(DispatchError::Precondition(format!(
                    "cannot pick up order in status {}",
                    order.status
                )));
            }

            let now = Utc::now();
            order.status = OrderStatus::PickedUp;
            order.picked_up_at = Some(now);
            order.handoff_origin = None;
            order.updated_at = now;

            save_order(&mut tx, &order).await?;
            enqueue_order_event(&mut tx, EventType::OrderPickedUp, &order, None, now).await?;
            tx.commit().await?;

            tracing::info!(order_id = %order.id, drone_id = %drone_id, "order picked up");
            Ok(order)
        })
        .await
    }

    /// Records a successful delivery and frees the drone.
    #[tracing::instrument(skip(self))]
    pub async fn deliver_order(&self, drone_id: &DroneId, order_id: OrderId) -> Result<Order> {
        observe("deliver_order", async {
            self.complete_order(drone_id, order_id, Completion::Delivered)
                .await
        })
        .await
    }

    /// Records a failed delivery and frees the drone. `reason` must not be
    /// blank.
    #[tracing::instrument(skip(self))]
    pub async fn fail_order(
        &self,
        drone_id: &DroneId,
        order_id: OrderId,
        reason: &str,
    ) -> Result<Order> {
        observe("fail_order", async {
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(DispatchError::Invalid(
                    "failure reason is required".to_string(),
                ));
            }
            self.complete_order(drone_id, order_id, Completion::Failed(reason.to_string()))
                .await
        })
        .await
    }

    /// Marks a drone broken and recovers the order it was holding.
    ///
    /// - `PickedUp`: the order asks for a handoff from the drone's last
    ///   reported location
    /// - `Reserved`: the order goes back to `Created`
    /// - any other status: the order is left untouched
    #[tracing::instrument(skip(self))]
    pub async fn mark_drone_broken(&self, drone_id: &DroneId) -> Result<Drone> {
        observe("mark_drone_broken", async {
            let now = Utc::now();
            let mut tx = self.store.begin().await?;
            let mut drone = get_or_create_drone(&mut tx, drone_id, now).await?;
            drone.status = DroneStatus::Broken;

            let mut recovered = None;
            if let Some(order_id) = drone.current_order_id.take() {
                match tx.get_order_for_update(order_id).await? {
                    Some(mut order) => match order.status {
                        OrderStatus::PickedUp => {
                            order.status = OrderStatus::HandoffRequested;
                            order.assigned_drone_id = None;
                            order.handoff_origin = drone.last_location;
                            order.updated_at = now;
                            recovered = Some((EventType::OrderHandoffRequested, order));
                        }
                        OrderStatus::Reserved => {
                            order.status = OrderStatus::Created;
                            order.assigned_drone_id = None;
                            order.reserved_at = None;
                            order.handoff_origin = None;
                            order.updated_at = now;
                            recovered = Some((EventType::OrderUpdated, order));
                        }
                        _ => {}
                    },
                    None => {
                        tracing::warn!(%order_id, "broken drone referenced a missing order");
                    }
                }
            }

            drone.updated_at = now;
            tx.update_drone(&drone).await?;

            if let Some((event_type, order)) = &recovered {
                save_order(&mut tx, order).await?;
                enqueue_order_event(&mut tx, *event_type, order, Some(&drone), now).await?;
            }
            tx.enqueue_event(&OutboxEvent::for_drone(EventType::DroneBroken, &drone, now)?)
                .await?;
            tx.commit().await?;

            tracing::warn!(
                drone_id = %drone.id,
                order_id = ?recovered.as_ref().map(|(_, o)| o.id),
                "drone marked broken"
            );
            Ok(drone)
        })
        .await
    }

    /// Returns a drone to service. Work is not reassigned automatically.
    #[tracing::instrument(skip(self))]
    pub async fn mark_drone_fixed(&self, drone_id: &DroneId) -> Result<Drone> {
        observe("mark_drone_fixed", async {
            let now = Utc::now();
            let mut tx = self.store.begin().await?;
            let mut drone = get_or_create_drone(&mut tx, drone_id, now).await?;

            drone.status = DroneStatus::Active;
            drone.updated_at = now;
            tx.update_drone(&drone).await?;
            tx.enqueue_event(&OutboxEvent::for_drone(EventType::DroneFixed, &drone, now)?)
                .await?;
            tx.commit().await?;

            tracing::info!(drone_id = %drone.id, "drone marked fixed");
            Ok(drone)
        })
        .await
    }

    /// Records a drone's position and returns its status view.
    ///
    /// Order state is never changed here; the current order is read after
    /// commit to project its position and ETA.
    #[tracing::instrument(skip(self))]
    pub async fn heartbeat(&self, drone_id: &DroneId, location: Location) -> Result<DroneStatusView> {
        observe("heartbeat", async {
            validate_location("location", &location)?;

            let now = Utc::now();
            let mut tx = self.store.begin().await?;
            let mut drone = get_or_create_drone(&mut tx, drone_id, now).await?;
            drone.last_location = Some(location);
            drone.last_heartbeat_at = Some(now);
            drone.updated_at = now;
            tx.update_drone(&drone).await?;
            tx.commit().await?;

            let current_order = match drone.current_order_id {
                Some(order_id) => self
                    .store
                    .get_order(order_id)
                    .await?
                    .map(|order| self.project(order, Some(&drone))),
                None => None,
            };

            Ok(DroneStatusView {
                drone,
                current_order,
            })
        })
        .await
    }

    /// Returns the projected view of the order a drone currently holds.
    #[tracing::instrument(skip(self))]
    pub async fn drone_current_order(&self, drone_id: &DroneId) -> Result<OrderView> {
        observe("drone_current_order", async {
            let drone = self
                .store
                .get_drone(drone_id)
                .await?
                .ok_or_else(|| DispatchError::drone_not_found(drone_id))?;

            let order_id = drone.current_order_id.ok_or_else(|| DispatchError::NotFound {
                entity: "current order",
                id: drone_id.to_string(),
            })?;
            let order = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| DispatchError::order_not_found(order_id))?;

            Ok(self.project(order, Some(&drone)))
        })
        .await
    }

    async fn complete_order(
        &self,
        drone_id: &DroneId,
        order_id: OrderId,
        completion: Completion,
    ) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        // Same lock order as `mark_drone_broken`: drone, then order.
        let drone = tx.get_drone_for_update(drone_id).await?;
        let mut order = lock_order(&mut tx, order_id).await?;
        ensure_not_terminal(&order)?;
        ensure_assigned(&order, drone_id)?;

        if !order.status.can_complete() {
            return Err(DispatchError::Precondition(format!(
                "cannot complete order in status {}",
                order.status
            )));
        }

        let now = Utc::now();
        let event_type = match completion {
            Completion::Delivered => {
                order.status = OrderStatus::Delivered;
                order.delivered_at = Some(now);
                EventType::OrderDelivered
            }
            Completion::Failed(reason) => {
                order.status = OrderStatus::Failed;
                order.failed_at = Some(now);
                order.failure_reason = Some(reason);
                EventType::OrderFailed
            }
        };
        order.assigned_drone_id = None;
        order.updated_at = now;
        save_order(&mut tx, &order).await?;

        let mut drone = drone.ok_or_else(|| DispatchError::drone_not_found(drone_id))?;
        if drone.current_order_id == Some(order.id) {
            drone.current_order_id = None;
            drone.updated_at = now;
            tx.update_drone(&drone).await?;
        }

        enqueue_order_event(&mut tx, event_type, &order, Some(&drone), now).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, drone_id = %drone_id, status = %order.status, "order completed");
        Ok(order)
    }

    /// Projects an order, loading its assigned drone if it has one.
    async fn build_view(&self, order: Order) -> Result<OrderView> {
        let drone = match &order.assigned_drone_id {
            Some(drone_id) => self.store.get_drone(drone_id).await?,
            None => None,
        };
        Ok(self.project(order, drone.as_ref()))
    }

    fn project(&self, order: Order, drone: Option<&Drone>) -> OrderView {
        // Only the assigned drone's position says anything about the order.
        let drone = drone.filter(|d| order.is_assigned_to(&d.id));
        OrderView {
            current_location: current_location(&order, drone),
            eta_seconds: compute_eta_seconds(&order, drone, self.speed_mps),
            order,
        }
    }
}

/// Awaits an operation and records its outcome.
async fn observe<T>(
    operation: &'static str,
    operation_future: impl Future<Output = Result<T>>,
) -> Result<T> {
    let result = operation_future.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(
        "dispatch_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);

    match &result {
        Err(e @ DispatchError::Internal(_)) => {
            tracing::error!(operation, error = %e, "dispatch operation failed");
        }
        Err(e) => tracing::debug!(operation, error = %e, "dispatch operation rejected"),
        Ok(_) => {}
    }
    result
}

fn validate_location(field: &str, location: &Location) -> Result<()> {
    location
        .validate()
        .map_err(|e| DispatchError::Invalid(format!("{field}: {e}")))
}

fn ensure_not_terminal(order: &Order) -> Result<()> {
    if order.is_terminal() {
        return Err(DispatchError::Precondition(format!(
            "order {} is {} and can no longer change",
            order.id, order.status
        )));
    }
    Ok(())
}

fn ensure_assigned(order: &Order, drone_id: &DroneId) -> Result<()> {
    if !order.is_assigned_to(drone_id) {
        return Err(DispatchError::Forbidden(format!(
            "order {} is not assigned to drone {drone_id}",
            order.id
        )));
    }
    Ok(())
}

async fn lock_order<T: StoreTx>(tx: &mut T, order_id: OrderId) -> Result<Order> {
    tx.get_order_for_update(order_id)
        .await?
        .ok_or_else(|| DispatchError::order_not_found(order_id))
}

/// Locks a drone, registering it if this is its first contact.
async fn get_or_create_drone<T: StoreTx>(
    tx: &mut T,
    drone_id: &DroneId,
    now: DateTime<Utc>,
) -> Result<Drone> {
    if let Some(drone) = tx.get_drone_for_update(drone_id).await? {
        return Ok(drone);
    }
    let drone = Drone::new(drone_id.clone(), now);
    tx.insert_drone(&drone).await?;
    tracing::debug!(drone_id = %drone_id, "drone registered on first contact");
    Ok(drone)
}

/// Writes an order after checking the status/field invariants.
async fn save_order<T: StoreTx>(tx: &mut T, order: &Order) -> Result<()> {
    order.check_invariants()?;
    tx.update_order(order).await?;
    Ok(())
}

async fn enqueue_order_event<T: StoreTx>(
    tx: &mut T,
    event_type: EventType,
    order: &Order,
    drone: Option<&Drone>,
    now: DateTime<Utc>,
) -> Result<()> {
    let event = OutboxEvent::for_order(event_type, order, drone, now)?;
    tx.enqueue_event(&event).await?;
    Ok(())
}
