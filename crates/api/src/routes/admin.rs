//! Administrative endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use dispatch::OrderView;
use domain::{Drone, Location, Order, OrderStatus, Role};
use serde::Deserialize;
use store::{OrderFilter, Store};

use super::{AppState, parse_drone_id, parse_order_id};
use crate::error::ApiError;
use crate::identity::Actor;

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListOrdersQuery {
    fn into_filter(self) -> Result<OrderFilter, ApiError> {
        let mut filter = OrderFilter::new()
            .with_limit(self.limit.unwrap_or_default())
            .with_offset(self.offset.unwrap_or_default());
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            let status: OrderStatus = status
                .parse()
                .map_err(|e: domain::DomainError| ApiError::BadRequest(e.to_string()))?;
            filter = filter.with_status(status);
        }
        Ok(filter)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub origin: Option<Location>,
    pub destination: Option<Location>,
}

/// GET /admin/orders?status=&limit=&offset=
#[tracing::instrument(skip(state, actor, query), fields(admin = %actor.id))]
pub async fn list_orders<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    actor.require(&[Role::Admin])?;
    let Query(query) = query?;
    let filter = query.into_filter()?;

    let views = state.service.admin_list_orders(&filter).await?;
    Ok(Json(views))
}

/// PATCH /admin/orders/{id}: move an order's origin and/or destination.
#[tracing::instrument(skip(state, actor, payload), fields(admin = %actor.id))]
pub async fn update_order<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    actor.require(&[Role::Admin])?;
    let order_id = parse_order_id(&id)?;
    let Json(req) = payload?;

    let order = state
        .service
        .admin_update_order(order_id, req.origin, req.destination)
        .await?;
    Ok(Json(order))
}

/// GET /admin/drones
#[tracing::instrument(skip(state, actor), fields(admin = %actor.id))]
pub async fn list_drones<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
) -> Result<Json<Vec<Drone>>, ApiError> {
    actor.require(&[Role::Admin])?;
    Ok(Json(state.service.admin_list_drones().await?))
}

/// POST /admin/drones/{id}/broken
#[tracing::instrument(skip(state, actor), fields(admin = %actor.id))]
pub async fn mark_drone_broken<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<Drone>, ApiError> {
    actor.require(&[Role::Admin])?;
    let drone_id = parse_drone_id(&id)?;
    Ok(Json(state.service.admin_mark_drone_broken(&drone_id).await?))
}

/// POST /admin/drones/{id}/fixed
#[tracing::instrument(skip(state, actor), fields(admin = %actor.id))]
pub async fn mark_drone_fixed<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<Drone>, ApiError> {
    actor.require(&[Role::Admin])?;
    let drone_id = parse_drone_id(&id)?;
    Ok(Json(state.service.admin_mark_drone_fixed(&drone_id).await?))
}
