//! Caller identity seam.
//!
//! Authentication and permission checks happen in the gateway that
//! fronts this service. By the time a request lands here it has been
//! authorized; the gateway forwards the acting user in `x-user-id` and
//! `x-user-role` headers, which the [`CallerIdentity`] extractor reads.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::Role;
use crate::errors::ServiceError;

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_ROLE: &str = "x-user-role";

/// The already-authorized acting user, attached to every mutation and
/// recorded in order history and stock movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub role: Role,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(HEADER_USER_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("missing or invalid {} header", HEADER_USER_ID))
            })?;

        let role = parts
            .headers
            .get(HEADER_USER_ROLE)
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "missing or invalid {} header",
                    HEADER_USER_ROLE
                ))
            })?;

        Ok(CallerIdentity { user_id, role })
    }
}
