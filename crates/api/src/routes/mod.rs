//! HTTP route handlers grouped by caller role.

pub mod admin;
pub mod drones;
pub mod health;
pub mod metrics;
pub mod orders;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use common::{DroneId, OrderId};
use dispatch::DispatchService;
use store::Store;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub service: DispatchService<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(service: DispatchService<S>) -> Self {
        Self { service }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}

pub(crate) fn parse_drone_id(id: &str) -> Result<DroneId, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("drone ID must not be empty".to_string()));
    }
    Ok(DroneId::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_must_be_a_uuid() {
        let id = OrderId::new();
        assert_eq!(parse_order_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_order_id("not-a-uuid"),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn drone_id_must_not_be_blank() {
        assert_eq!(parse_drone_id(" d-1 ").unwrap(), DroneId::from("d-1"));
        assert!(parse_drone_id("   ").is_err());
    }
}
