//! Endpoints called by drones.
//!
//! The drone acting is always the authenticated caller; a drone cannot
//! act on behalf of another.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use dispatch::{DroneStatusView, OrderView};
use domain::{Drone, Location, Order, Role};
use serde::Deserialize;
use store::Store;

use super::{AppState, parse_order_id};
use crate::error::ApiError;
use crate::identity::Actor;

#[derive(Debug, Deserialize)]
pub struct FailOrderRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub lat: f64,
    pub lng: f64,
}

/// POST /drone/jobs/reserve: claim the oldest available order.
///
/// Responds 204 when there is nothing to reserve.
#[tracing::instrument(skip(state, actor), fields(drone_id = %actor.id))]
pub async fn reserve<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
) -> Result<Json<Order>, ApiError> {
    actor.require(&[Role::Drone])?;
    let order = state.service.reserve_job(&actor.drone_id()).await?;
    Ok(Json(order))
}

/// POST /drone/orders/{id}/pickup
#[tracing::instrument(skip(state, actor), fields(drone_id = %actor.id))]
pub async fn pickup<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    actor.require(&[Role::Drone])?;
    let order_id = parse_order_id(&id)?;
    let order = state
        .service
        .pickup_order(&actor.drone_id(), order_id)
        .await?;
    Ok(Json(order))
}

/// POST /drone/orders/{id}/deliver
#[tracing::instrument(skip(state, actor), fields(drone_id = %actor.id))]
pub async fn deliver<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    actor.require(&[Role::Drone])?;
    let order_id = parse_order_id(&id)?;
    let order = state
        .service
        .deliver_order(&actor.drone_id(), order_id)
        .await?;
    Ok(Json(order))
}

/// POST /drone/orders/{id}/fail
#[tracing::instrument(skip(state, actor, payload), fields(drone_id = %actor.id))]
pub async fn fail<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<FailOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    actor.require(&[Role::Drone])?;
    let order_id = parse_order_id(&id)?;
    let Json(req) = payload?;
    let order = state
        .service
        .fail_order(&actor.drone_id(), order_id, &req.reason)
        .await?;
    Ok(Json(order))
}

/// POST /drone/broken: report the calling drone as broken.
#[tracing::instrument(skip(state, actor), fields(drone_id = %actor.id))]
pub async fn broken<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
) -> Result<Json<Drone>, ApiError> {
    actor.require(&[Role::Drone])?;
    let drone = state.service.mark_drone_broken(&actor.drone_id()).await?;
    Ok(Json(drone))
}

/// POST /drone/heartbeat: record the drone's position.
#[tracing::instrument(skip(state, actor, payload), fields(drone_id = %actor.id))]
pub async fn heartbeat<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Result<Json<DroneStatusView>, ApiError> {
    actor.require(&[Role::Drone])?;
    let Json(req) = payload?;
    let view = state
        .service
        .heartbeat(&actor.drone_id(), Location::new(req.lat, req.lng))
        .await?;
    Ok(Json(view))
}

/// GET /drone/orders/current
#[tracing::instrument(skip(state, actor), fields(drone_id = %actor.id))]
pub async fn current_order<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
) -> Result<Json<OrderView>, ApiError> {
    actor.require(&[Role::Drone])?;
    let view = state
        .service
        .drone_current_order(&actor.drone_id())
        .await?;
    Ok(Json(view))
}
