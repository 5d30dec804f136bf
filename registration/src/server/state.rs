//! Application state for the HTTP server.

use crate::app::{EventService, RegistrationService};

/// State shared by every handler. Cloned per request; services are cheap
/// to clone.
#[derive(Clone)]
pub struct AppState {
    /// Registration ledger operations
    pub registrations: RegistrationService,
    /// Event administration
    pub events: EventService,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(registrations: RegistrationService, events: EventService) -> Self {
        Self {
            registrations,
            events,
        }
    }
}
