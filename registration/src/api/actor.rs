//! Caller identity extractor.
//!
//! Authentication happens upstream; the gateway forwards the caller as
//! `X-User-Id` (UUID) and `X-User-Role` (`PARTICIPANT`, `ORGANIZER` or
//! `ADMIN`, default `PARTICIPANT`).

use super::error::AppError;
use crate::types::{Actor, Role, UserId};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Header carrying the caller's role
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("missing {USER_ID_HEADER} header")))?
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(UserId::from_uuid)
            .ok_or_else(|| AppError::unauthorized(format!("malformed {USER_ID_HEADER} header")))?;

        let role = match parts.headers.get(USER_ROLE_HEADER) {
            None => Role::Participant,
            Some(value) => value
                .to_str()
                .map_err(|_| AppError::bad_request(format!("malformed {USER_ROLE_HEADER} header")))?
                .parse::<Role>()
                .map_err(|error| AppError::bad_request(error.to_string()))?,
        };

        Ok(Self::new(user_id, role))
    }
}
