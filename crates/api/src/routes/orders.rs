//! End-user order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use dispatch::OrderView;
use domain::{Location, Order, Role};
use serde::Deserialize;
use store::Store;

use super::{AppState, parse_order_id};
use crate::error::ApiError;
use crate::identity::Actor;

#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    pub origin: Location,
    pub destination: Location,
}

/// POST /orders: submit a delivery order for the calling user.
#[tracing::instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn submit<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    payload: Result<Json<SubmitOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    actor.require(&[Role::EndUser])?;
    let Json(req) = payload?;

    let order = state
        .service
        .submit_order(&actor.user_id(), req.origin, req.destination)
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /orders/{id}/withdraw: cancel an order that has not been picked up.
#[tracing::instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn withdraw<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    actor.require(&[Role::EndUser])?;
    let order_id = parse_order_id(&id)?;

    let order = state
        .service
        .withdraw_order(&actor.user_id(), order_id)
        .await?;
    Ok(Json(order))
}

/// GET /orders/{id}: the order with its live position and ETA.
#[tracing::instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    actor.require(&[Role::EndUser, Role::Admin])?;
    let order_id = parse_order_id(&id)?;

    let view = state
        .service
        .get_order_view(&actor.user_id(), actor.role, order_id)
        .await?;
    Ok(Json(view))
}
