//! Caller identity extraction.
//!
//! Authentication happens upstream at the hospital's API gateway, which
//! forwards the verified identity in `x-user-id` and `x-user-role`
//! headers. Here we only turn those headers into a typed [`Actor`];
//! requests without them are rejected as unauthenticated.

use axum::http::{HeaderMap, StatusCode};
use examflow_types::{Actor, Role};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Resolve the authenticated caller from gateway headers.
///
/// # Errors
/// Returns `401 Unauthorized` when either header is missing, the id is
/// not a UUID, or the role is unknown.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, (StatusCode, &'static str)> {
    let id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "missing x-user-id header"))?;
    let id = Uuid::parse_str(id).map_err(|_| (StatusCode::UNAUTHORIZED, "invalid x-user-id"))?;

    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "missing x-user-role header"))?;
    let role: Role = role
        .parse()
        .map_err(|_| (StatusCode::UNAUTHORIZED, "unknown x-user-role"))?;

    Ok(Actor::new(id, role))
}
