//! Registration API endpoints.
//!
//! - POST /api/events/:id/registrations - Register the caller
//! - GET /api/events/:id/registrations - List an event's registrations (organizer or admin)
//! - GET /api/events/:id/registrations/export - The same list as a CSV attachment
//! - GET /api/registrations/me - The caller's registrations
//! - GET /api/registrations/:id - One registration (owner, organizer or admin)
//! - POST /api/registrations/:id/cancel - Cancel (owner or admin)

use super::error::AppError;
use crate::export;
use crate::server::state::AppState;
use crate::types::{Actor, EventId, ParticipantDetails, Registration, RegistrationId};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// Result of a cancellation.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// The registration, now CANCELLED
    pub registration: Registration,
    /// Whether this request gave a slot back
    pub released: bool,
}

/// Register the caller for an event.
///
/// Responds 201 with a CONFIRMED registration, or a WAITING_LIST one when
/// the event is full.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/registrations \
///   -H "X-User-Id: 550e8400-e29b-41d4-a716-446655440000" \
///   -H "Content-Type: application/json" \
///   -d '{"name": "Ada Lovelace", "email": "ada@example.com"}'
/// ```
pub async fn register(
    actor: Actor,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(details): Json<ParticipantDetails>,
) -> Result<(StatusCode, Json<Registration>), AppError> {
    let registration = state
        .registrations
        .register(actor.user_id, EventId::from_uuid(event_id), details)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// List an event's registrations, oldest first.
pub async fn list_for_event(
    actor: Actor,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<Registration>>, AppError> {
    let registrations = state
        .registrations
        .list_event_registrations(&actor, EventId::from_uuid(event_id))
        .await?;
    Ok(Json(registrations))
}

/// Download an event's registrations as CSV.
///
/// ```bash
/// curl -OJ http://localhost:8080/api/events/<event_id>/registrations/export \
///   -H "X-User-Id: <organizer_id>" \
///   -H "X-User-Role: ORGANIZER"
/// ```
pub async fn export_for_event(
    actor: Actor,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let event_id = EventId::from_uuid(event_id);
    let csv = state
        .registrations
        .export_event_registrations(&actor, event_id)
        .await?;
    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", export::filename(event_id)),
        ),
    ];
    Ok((headers, csv))
}

/// The caller's registrations, oldest first.
pub async fn list_mine(
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<Vec<Registration>>, AppError> {
    let registrations = state
        .registrations
        .list_user_registrations(actor.user_id)
        .await?;
    Ok(Json(registrations))
}

/// Get one registration.
pub async fn get_registration(
    actor: Actor,
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<Registration>, AppError> {
    let registration = state
        .registrations
        .get_registration(&actor, RegistrationId::from_uuid(registration_id))
        .await?;
    Ok(Json(registration))
}

/// Cancel a registration. Repeating the call succeeds with `released: false`.
pub async fn cancel(
    actor: Actor,
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancellation = state
        .registrations
        .cancel(actor, RegistrationId::from_uuid(registration_id))
        .await?;
    Ok(Json(CancelResponse {
        registration: cancellation.registration,
        released: cancellation.released,
    }))
}
