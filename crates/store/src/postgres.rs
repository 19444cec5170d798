use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DroneId, EventId, OrderId, UserId};
use domain::{Drone, DroneStatus, Location, Order, OrderStatus};
use outbox::{AggregateKind, EventType, OutboxError, OutboxEvent, OutboxRepository};
use sqlx::{
    PgConnection, PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    OrderFilter, Result, StoreError,
    store::{Store, StoreTx},
};

const ORDER_COLUMNS: &str = r#"
    id, user_id, origin_lat, origin_lng, dest_lat, dest_lng, status,
    assigned_drone_id, handoff_origin_lat, handoff_origin_lng,
    created_at, updated_at, reserved_at, picked_up_at, delivered_at, failed_at, failure_reason
"#;

const DRONE_COLUMNS: &str =
    "id, status, last_lat, last_lng, last_heartbeat_at, current_order_id, created_at, updated_at";

/// PostgreSQL-backed store implementation.
///
/// Row locks (`FOR UPDATE`) serialize writers touching the same order or
/// drone; job reservation uses `FOR UPDATE SKIP LOCKED` so concurrent
/// drones never wait on, or receive, the same order.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool and wraps it in a store.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

fn location(lat: Option<f64>, lng: Option<f64>) -> Option<Location> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(Location::new(lat, lng)),
        _ => None,
    }
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let assigned: Option<String> = row.try_get("assigned_drone_id")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        origin: Location::new(row.try_get("origin_lat")?, row.try_get("origin_lng")?),
        destination: Location::new(row.try_get("dest_lat")?, row.try_get("dest_lng")?),
        status: status.parse::<OrderStatus>()?,
        assigned_drone_id: assigned.map(DroneId::new),
        handoff_origin: location(
            row.try_get("handoff_origin_lat")?,
            row.try_get("handoff_origin_lng")?,
        ),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        reserved_at: row.try_get("reserved_at")?,
        picked_up_at: row.try_get("picked_up_at")?,
        delivered_at: row.try_get("delivered_at")?,
        failed_at: row.try_get("failed_at")?,
        failure_reason: row.try_get("failure_reason")?,
    })
}

fn row_to_drone(row: PgRow) -> Result<Drone> {
    let status: String = row.try_get("status")?;
    let current: Option<Uuid> = row.try_get("current_order_id")?;

    Ok(Drone {
        id: DroneId::new(row.try_get::<String, _>("id")?),
        status: status.parse::<DroneStatus>()?,
        last_location: location(row.try_get("last_lat")?, row.try_get("last_lng")?),
        last_heartbeat_at: row.try_get::<Option<DateTime<Utc>>, _>("last_heartbeat_at")?,
        current_order_id: current.map(OrderId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_event(row: PgRow) -> outbox::Result<OutboxEvent> {
    let event_type: String = row.try_get("event_type").map_err(OutboxError::repository)?;
    let aggregate_type: String = row
        .try_get("aggregate_type")
        .map_err(OutboxError::repository)?;

    Ok(OutboxEvent {
        id: EventId::from_uuid(row.try_get::<Uuid, _>("id").map_err(OutboxError::repository)?),
        event_type: event_type.parse::<EventType>()?,
        aggregate_type: aggregate_type.parse::<AggregateKind>()?,
        aggregate_id: row.try_get("aggregate_id").map_err(OutboxError::repository)?,
        payload: row.try_get("payload").map_err(OutboxError::repository)?,
        occurred_at: row.try_get("occurred_at").map_err(OutboxError::repository)?,
        published_at: None,
    })
}

/// Maps a unique violation to `Conflict`, anything else to `Database`.
fn insert_error(e: sqlx::Error, entity: &'static str, id: String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict { entity, id };
    }
    StoreError::Database(e)
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTx { tx: Some(tx) })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.effective_limit() as i64)
        .bind(filter.sql_offset())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }

    async fn get_drone(&self, id: &DroneId) -> Result<Option<Drone>> {
        let row = sqlx::query(&format!("SELECT {DRONE_COLUMNS} FROM drones WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_drone).transpose()
    }

    async fn list_drones(&self) -> Result<Vec<Drone>> {
        let rows = sqlx::query(&format!("SELECT {DRONE_COLUMNS} FROM drones ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_drone).collect()
    }
}

#[async_trait]
impl OutboxRepository for PostgresStore {
    async fn fetch_pending(&self, limit: usize) -> outbox::Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_type, aggregate_id, payload, occurred_at
            FROM outbox_events
            WHERE published_at IS NULL
            ORDER BY occurred_at, seq
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(OutboxError::repository)?;

        rows.into_iter().map(row_to_event).collect()
    }

    async fn mark_published(&self, ids: &[EventId]) -> outbox::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = ids.iter().map(EventId::as_uuid).collect();

        sqlx::query(
            r#"
            UPDATE outbox_events
            SET published_at = now()
            WHERE id = ANY($1::uuid[]) AND published_at IS NULL
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(OutboxError::repository)?;

        Ok(())
    }
}

/// Transaction over a [`PostgresStore`].
///
/// Dropping it without committing rolls the database transaction back.
pub struct PostgresTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTx {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn get_order_for_update(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.conn()?)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn get_drone_for_update(&mut self, id: &DroneId) -> Result<Option<Drone>> {
        let row = sqlx::query(&format!(
            "SELECT {DRONE_COLUMNS} FROM drones WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_str())
        .fetch_optional(self.conn()?)
        .await?;

        row.map(row_to_drone).transpose()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, origin_lat, origin_lng, dest_lat, dest_lng, status,
                assigned_drone_id, handoff_origin_lat, handoff_origin_lng,
                created_at, updated_at, reserved_at, picked_up_at, delivered_at, failed_at, failure_reason
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_str())
        .bind(order.origin.lat)
        .bind(order.origin.lng)
        .bind(order.destination.lat)
        .bind(order.destination.lng)
        .bind(order.status.as_str())
        .bind(order.assigned_drone_id.as_ref().map(DroneId::as_str))
        .bind(order.handoff_origin.map(|l| l.lat))
        .bind(order.handoff_origin.map(|l| l.lng))
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.reserved_at)
        .bind(order.picked_up_at)
        .bind(order.delivered_at)
        .bind(order.failed_at)
        .bind(order.failure_reason.as_deref())
        .execute(self.conn()?)
        .await
        .map_err(|e| insert_error(e, "order", order.id.to_string()))?;

        Ok(())
    }

    async fn insert_drone(&mut self, drone: &Drone) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO drones (
                id, status, last_lat, last_lng, last_heartbeat_at, current_order_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(drone.id.as_str())
        .bind(drone.status.as_str())
        .bind(drone.last_location.map(|l| l.lat))
        .bind(drone.last_location.map(|l| l.lng))
        .bind(drone.last_heartbeat_at)
        .bind(drone.current_order_id.map(|id| id.as_uuid()))
        .bind(drone.created_at)
        .bind(drone.updated_at)
        .execute(self.conn()?)
        .await
        .map_err(|e| insert_error(e, "drone", drone.id.to_string()))?;

        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                user_id = $1,
                origin_lat = $2,
                origin_lng = $3,
                dest_lat = $4,
                dest_lng = $5,
                status = $6,
                assigned_drone_id = $7,
                handoff_origin_lat = $8,
                handoff_origin_lng = $9,
                updated_at = $10,
                reserved_at = $11,
                picked_up_at = $12,
                delivered_at = $13,
                failed_at = $14,
                failure_reason = $15
            WHERE id = $16
            "#,
        )
        .bind(order.user_id.as_str())
        .bind(order.origin.lat)
        .bind(order.origin.lng)
        .bind(order.destination.lat)
        .bind(order.destination.lng)
        .bind(order.status.as_str())
        .bind(order.assigned_drone_id.as_ref().map(DroneId::as_str))
        .bind(order.handoff_origin.map(|l| l.lat))
        .bind(order.handoff_origin.map(|l| l.lng))
        .bind(order.updated_at)
        .bind(order.reserved_at)
        .bind(order.picked_up_at)
        .bind(order.delivered_at)
        .bind(order.failed_at)
        .bind(order.failure_reason.as_deref())
        .bind(order.id.as_uuid())
        .execute(self.conn()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::order_not_found(order.id));
        }
        Ok(())
    }

    async fn update_drone(&mut self, drone: &Drone) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE drones SET
                status = $1,
                last_lat = $2,
                last_lng = $3,
                last_heartbeat_at = $4,
                current_order_id = $5,
                updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(drone.status.as_str())
        .bind(drone.last_location.map(|l| l.lat))
        .bind(drone.last_location.map(|l| l.lng))
        .bind(drone.last_heartbeat_at)
        .bind(drone.current_order_id.map(|id| id.as_uuid()))
        .bind(drone.updated_at)
        .bind(drone.id.as_str())
        .execute(self.conn()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::drone_not_found(&drone.id));
        }
        Ok(())
    }

    async fn reserve_next_order(&mut self, statuses: &[OrderStatus]) -> Result<Option<Order>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        let row = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE status = ANY($1)
              AND assigned_drone_id IS NULL
            ORDER BY created_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(statuses)
        .fetch_optional(self.conn()?)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn enqueue_event(&mut self, event: &OutboxEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, event_type, aggregate_type, aggregate_id, payload, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.event_type.as_str())
        .bind(event.aggregate_type.as_str())
        .bind(&event.aggregate_id)
        .bind(&event.payload)
        .bind(event.occurred_at)
        .execute(self.conn()?)
        .await?;

        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
