//! Caller identity supplied by the upstream authenticator.
//!
//! Token verification happens before requests reach this service; the
//! authenticator forwards the verified subject and role as headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{DroneId, UserId};
use domain::Role;

use crate::error::ApiError;

/// Header carrying the verified subject.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Header carrying the verified role.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The verified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    /// Fails with 403 unless the actor holds one of `allowed`.
    pub fn require(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "role {} may not access this resource",
                self.role
            )))
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId::new(self.id.as_str())
    }

    pub fn drone_id(&self) -> DroneId {
        DroneId::new(self.id.as_str())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing caller identity".to_string()))?;
        let role = header(parts, ACTOR_ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing caller role".to_string()))?
            .parse::<Role>()
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

        Ok(Actor {
            id: id.to_string(),
            role,
        })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};

    use super::*;

    async fn extract(headers: &[(&str, &str)]) -> Result<Actor, ApiError> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_id_and_role() {
        let actor = extract(&[(ACTOR_ID_HEADER, "drone-7"), (ACTOR_ROLE_HEADER, "drone")])
            .await
            .unwrap();
        assert_eq!(actor.role, Role::Drone);
        assert_eq!(actor.drone_id(), DroneId::from("drone-7"));
    }

    #[tokio::test]
    async fn missing_or_unknown_identity_is_unauthorized() {
        for headers in [
            vec![],
            vec![(ACTOR_ROLE_HEADER, "admin")],
            vec![(ACTOR_ID_HEADER, "  "), (ACTOR_ROLE_HEADER, "admin")],
            vec![(ACTOR_ID_HEADER, "u1")],
            vec![(ACTOR_ID_HEADER, "u1"), (ACTOR_ROLE_HEADER, "pilot")],
        ] {
            let err = extract(&headers).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn require_rejects_other_roles() {
        let actor = Actor {
            id: "u1".to_string(),
            role: Role::EndUser,
        };
        assert!(actor.require(&[Role::EndUser, Role::Admin]).is_ok());
        assert_eq!(
            actor.require(&[Role::Drone]).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
    }
}
