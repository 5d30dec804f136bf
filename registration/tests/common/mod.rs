//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration;
use registration::config::Config;
use registration::notifications::LoggingNotifier;
use registration::types::{Actor, CapacityPolicy, Event, NewEvent, ParticipantDetails, Role, UserId};
use registration::{Backend, RegistrationApp};
use rollcall_core::environment::Clock;
use rollcall_testing::{test_clock, SteppingClock};
use std::sync::Arc;

/// In-memory application with the given capacity policy.
///
/// Timestamps advance by one second per read so listings have a stable order.
pub fn app_with(backend: Backend, policy: CapacityPolicy) -> RegistrationApp {
    let mut config = Config::in_memory();
    config.registration.capacity_policy = policy;
    RegistrationApp::new(
        config,
        backend,
        Arc::new(LoggingNotifier::new()),
        Arc::new(SteppingClock::new(test_clock().now(), Duration::seconds(1))),
    )
}

/// In-memory application with the waitlist policy.
pub fn app() -> RegistrationApp {
    app_with(Backend::memory(), CapacityPolicy::Waitlist)
}

/// An organizer actor with a fresh id.
pub fn organizer() -> Actor {
    Actor::new(UserId::new(), Role::Organizer)
}

/// Create an event with capacity `max`, returning it and its organizer.
pub async fn event(app: &RegistrationApp, max: Option<u32>) -> (Actor, Event) {
    let organizer = organizer();
    let event = app
        .events()
        .create_event(
            &organizer,
            NewEvent {
                title: "Integration event".into(),
                max_participants: max,
            },
        )
        .await
        .expect("create event");
    (organizer, event)
}

/// Valid participant details.
pub fn details(n: usize) -> ParticipantDetails {
    ParticipantDetails::new(format!("Participant {n}"), format!("p{n}@example.com"))
}
