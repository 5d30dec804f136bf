//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{events, registrations};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the complete router.
///
/// Health checks live at the root; everything else under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Events
        .route("/events", post(events::create_event).get(events::list_events))
        .route(
            "/events/:id",
            get(events::get_event).delete(events::delete_event),
        )
        .route("/events/:id/stats", get(events::event_stats))
        .route("/events/:id/available-slots", get(events::available_slots))
        .route("/organizers/:id/stats", get(events::organizer_stats))
        // Registrations
        .route(
            "/events/:id/registrations",
            post(registrations::register).get(registrations::list_for_event),
        )
        .route(
            "/events/:id/registrations/export",
            get(registrations::export_for_event),
        )
        .route("/registrations/me", get(registrations::list_mine))
        .route("/registrations/:id", get(registrations::get_registration))
        .route("/registrations/:id/cancel", post(registrations::cancel));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
