//! HTTP adapter for the drone dispatch service.
//!
//! Exposes the end-user, drone and admin operations as REST endpoints,
//! with structured logging (tracing) and Prometheus metrics. Caller
//! identity arrives in headers set by the upstream authenticator; see
//! [`identity`].

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use dispatch::DispatchService;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // End users
        .route("/orders", post(routes::orders::submit::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/withdraw", post(routes::orders::withdraw::<S>))
        // Drones
        .route("/drone/jobs/reserve", post(routes::drones::reserve::<S>))
        .route("/drone/orders/current", get(routes::drones::current_order::<S>))
        .route("/drone/orders/{id}/pickup", post(routes::drones::pickup::<S>))
        .route("/drone/orders/{id}/deliver", post(routes::drones::deliver::<S>))
        .route("/drone/orders/{id}/fail", post(routes::drones::fail::<S>))
        .route("/drone/broken", post(routes::drones::broken::<S>))
        .route("/drone/heartbeat", post(routes::drones::heartbeat::<S>))
        // Admins
        .route("/admin/orders", get(routes::admin::list_orders::<S>))
        .route("/admin/orders/{id}", patch(routes::admin::update_order::<S>))
        .route("/admin/drones", get(routes::admin::list_drones::<S>))
        .route(
            "/admin/drones/{id}/broken",
            post(routes::admin::mark_drone_broken::<S>),
        )
        .route(
            "/admin/drones/{id}/fixed",
            post(routes::admin::mark_drone_fixed::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wraps a store in the dispatch service and shared state.
pub fn create_state<S: Store>(store: S, speed_mps: f64) -> Arc<AppState<S>> {
    Arc::new(AppState::new(DispatchService::new(store, speed_mps)))
}
