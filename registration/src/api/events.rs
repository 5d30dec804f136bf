//! Event API endpoints.
//!
//! - POST /api/events - Create an event (organizer or admin)
//! - GET /api/events - List events by organizer (the caller, or any organizer for an admin)
//! - GET /api/events/:id - Get event details
//! - DELETE /api/events/:id - Deactivate an event (its organizer or admin)
//! - GET /api/events/:id/stats - Registration counts by status
//! - GET /api/events/:id/available-slots - Remaining capacity
//! - GET /api/organizers/:id/stats - Totals across an organizer's events (that organizer or admin)

use super::error::AppError;
use crate::server::state::AppState;
use crate::types::{
    Actor, AvailableSlots, Event, EventId, EventStats, NewEvent, OrganizerStats, UserId,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing events.
#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    /// Organizer to list for; the caller when absent
    pub organizer_id: Option<Uuid>,
}

/// Remaining capacity of one event.
#[derive(Debug, Serialize)]
pub struct AvailableSlotsResponse {
    /// Event ID
    pub event_id: EventId,
    /// Free slots, or `"unlimited"`
    pub available_slots: AvailableSlots,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new event organized by the caller.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events \
///   -H "X-User-Id: 550e8400-e29b-41d4-a716-446655440000" \
///   -H "X-User-Role: ORGANIZER" \
///   -H "Content-Type: application/json" \
///   -d '{"title": "Rust Workshop", "max_participants": 10}'
/// ```
pub async fn create_event(
    actor: Actor,
    State(state): State<AppState>,
    Json(request): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let event = state.events.create_event(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// List events by organizer. Other organizers' events need the admin role.
pub async fn list_events(
    actor: Actor,
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let organizer_id = query.organizer_id.map_or(actor.user_id, UserId::from_uuid);
    let events = state.events.list_events_by_organizer(&actor, organizer_id).await?;
    Ok(Json(events))
}

/// Get event details by ID.
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Event>, AppError> {
    let event = state.events.get_event(EventId::from_uuid(event_id)).await?;
    Ok(Json(event))
}

/// Deactivate an event. Registrations are kept; new ones are refused.
pub async fn delete_event(
    actor: Actor,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Event>, AppError> {
    let event = state
        .events
        .deactivate_event(&actor, EventId::from_uuid(event_id))
        .await?;
    Ok(Json(event))
}

/// Registration counts by status and remaining capacity.
pub async fn event_stats(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventStats>, AppError> {
    let stats = state
        .registrations
        .event_stats(EventId::from_uuid(event_id))
        .await?;
    Ok(Json(stats))
}

/// Remaining capacity.
pub async fn available_slots(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<AvailableSlotsResponse>, AppError> {
    let event_id = EventId::from_uuid(event_id);
    let available_slots = state.registrations.available_slots(event_id).await?;
    Ok(Json(AvailableSlotsResponse {
        event_id,
        available_slots,
    }))
}

/// Totals across an organizer's events.
///
/// ```bash
/// curl http://localhost:8080/api/organizers/<organizer_id>/stats \
///   -H "X-User-Id: <organizer_id>" \
///   -H "X-User-Role: ORGANIZER"
/// ```
pub async fn organizer_stats(
    actor: Actor,
    State(state): State<AppState>,
    Path(organizer_id): Path<Uuid>,
) -> Result<Json<OrganizerStats>, AppError> {
    let stats = state
        .events
        .organizer_stats(&actor, UserId::from_uuid(organizer_id))
        .await?;
    Ok(Json(stats))
}
