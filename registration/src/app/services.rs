//! Application services - the operations the HTTP layer calls.
//!
//! Writes to the ledger go through the [`LedgerStore`]: the service sends a
//! command and waits for the outcome carrying the same `RequestId`. Reads go
//! straight to storage.

use crate::aggregates::{LedgerAction, LedgerEnvironment, LedgerReducer, LedgerState};
use crate::capacity::CapacityStore;
use crate::coordination::{Cancellation, Withdrawal};
use crate::error::{RegistrationError, Result};
use crate::export;
use crate::storage::RegistrationRepository;
use crate::types::{
    Actor, AvailableSlots, CapacityPolicy, Event, EventId, EventStats, NewEvent, OrganizerStats,
    ParticipantDetails, Registration, RegistrationId, RequestId, UserId,
};
use rollcall_core::environment::Clock;
use rollcall_runtime::{HealthCheck, HealthStatus, Store};
use std::sync::Arc;
use std::time::Duration;

/// Store running the ledger reducer
pub type LedgerStore = Store<LedgerState, LedgerAction, LedgerEnvironment, LedgerReducer>;

/// Registration ledger operations
#[derive(Clone)]
pub struct RegistrationService {
    ledger: Arc<LedgerStore>,
    capacity: Arc<dyn CapacityStore>,
    registrations: Arc<dyn RegistrationRepository>,
    policy: CapacityPolicy,
    timeout: Duration,
}

impl RegistrationService {
    /// Create a new registration service
    #[must_use]
    pub fn new(
        ledger: Arc<LedgerStore>,
        capacity: Arc<dyn CapacityStore>,
        registrations: Arc<dyn RegistrationRepository>,
        policy: CapacityPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            capacity,
            registrations,
            policy,
            timeout,
        }
    }

    /// Capacity policy applied to new registrations
    #[must_use]
    pub const fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    async fn dispatch(&self, action: LedgerAction) -> Result<LedgerAction> {
        let request_id = action.request_id();
        let outcome = self
            .ledger
            .send_and_wait_for(action, move |a| a.is_outcome_of(request_id), self.timeout)
            .await?;
        match outcome {
            LedgerAction::Rejected { error, .. } => Err(error),
            other => Ok(other),
        }
    }

    /// Register `user_id` for `event_id`.
    ///
    /// Returns a CONFIRMED registration when a slot was free, otherwise a
    /// WAITING_LIST one (or `CapacityExceeded` under the strict policy).
    ///
    /// # Errors
    ///
    /// `Validation`, `NotFound`, `DuplicateRegistration`,
    /// `CapacityExceeded`, `Storage`, or `Unavailable` on timeout.
    #[tracing::instrument(skip(self, details))]
    pub async fn register(
        &self,
        user_id: UserId,
        event_id: EventId,
        details: ParticipantDetails,
    ) -> Result<Registration> {
        let outcome = self
            .dispatch(LedgerAction::Register {
                request_id: RequestId::new(),
                registration_id: RegistrationId::new(),
                event_id,
                user_id,
                details,
                policy: self.policy,
            })
            .await?;

        match outcome {
            LedgerAction::Registered { registration, .. } => {
                tracing::info!(
                    registration_id = %registration.id,
                    status = %registration.status,
                    "Registration recorded"
                );
                Ok(registration)
            },
            other => Err(unexpected(&other)),
        }
    }

    /// Cancel a registration on behalf of `actor`.
    ///
    /// Cancelling an already-cancelled registration succeeds and releases
    /// nothing.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, `Storage`, or `Unavailable` on timeout.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        actor: Actor,
        registration_id: RegistrationId,
    ) -> Result<Cancellation> {
        let outcome = self
            .dispatch(LedgerAction::Cancel {
                request_id: RequestId::new(),
                withdrawal: Withdrawal {
                    registration_id,
                    actor,
                },
            })
            .await?;

        match outcome {
            LedgerAction::Cancelled { cancellation, .. } => Ok(cancellation),
            other => Err(unexpected(&other)),
        }
    }

    /// Status counts and remaining capacity for an event.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event does not exist, or a storage error.
    pub async fn event_stats(&self, event_id: EventId) -> Result<EventStats> {
        let event = self
            .capacity
            .get_event(event_id)
            .await?
            .ok_or_else(|| RegistrationError::event_not_found(event_id))?;
        let counts = self.registrations.count_by_status(event_id).await?;
        Ok(EventStats::new(&event, counts))
    }

    /// Remaining capacity for an event.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event does not exist, or a storage error.
    pub async fn available_slots(&self, event_id: EventId) -> Result<AvailableSlots> {
        self.capacity.available_slots(event_id).await
    }

    /// A user's registrations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub async fn list_user_registrations(&self, user_id: UserId) -> Result<Vec<Registration>> {
        self.registrations.list_by_user(user_id).await
    }

    /// An event's registrations, for its organizer or an admin.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, or a storage error.
    pub async fn list_event_registrations(
        &self,
        actor: &Actor,
        event_id: EventId,
    ) -> Result<Vec<Registration>> {
        let event = self
            .capacity
            .get_event(event_id)
            .await?
            .ok_or_else(|| RegistrationError::event_not_found(event_id))?;
        if !event.managed_by(actor) {
            return Err(RegistrationError::Forbidden(format!(
                "user {} does not organize event {event_id}",
                actor.user_id
            )));
        }
        self.registrations.list_by_event(event_id).await
    }

    /// An event's registrations as CSV, for its organizer or an admin.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, or a storage error.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn export_event_registrations(
        &self,
        actor: &Actor,
        event_id: EventId,
    ) -> Result<Vec<u8>> {
        let registrations = self.list_event_registrations(actor, event_id).await?;
        let csv = export::registrations_csv(&registrations)?;
        tracing::info!(rows = registrations.len(), "Registrations exported");
        Ok(csv)
    }

    /// One registration, visible to its owner, the event's organizer, or an
    /// admin.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, or a storage error.
    pub async fn get_registration(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
    ) -> Result<Registration> {
        let registration = self
            .registrations
            .find(registration_id)
            .await?
            .ok_or_else(|| RegistrationError::registration_not_found(registration_id))?;

        if actor.owns_or_admin(registration.user_id) {
            return Ok(registration);
        }
        let organizes = self
            .capacity
            .get_event(registration.event_id)
            .await?
            .is_some_and(|event| event.managed_by(actor));
        if organizes {
            Ok(registration)
        } else {
            Err(RegistrationError::Forbidden(format!(
                "user {} may not view registration {registration_id}",
                actor.user_id
            )))
        }
    }

    /// Ledger health plus a storage ping
    pub async fn readiness(&self) -> HealthCheck {
        let ledger = self.ledger.health();
        if ledger.status == HealthStatus::Unhealthy {
            return ledger;
        }
        match self.capacity.ping().await {
            Ok(()) => {
                let in_flight = self.ledger.state(LedgerState::in_flight_count).await;
                ledger.with_metadata("in_flight_requests", in_flight.to_string())
            },
            Err(error) => HealthCheck::unhealthy("storage", error.to_string()),
        }
    }
}

fn unexpected(action: &LedgerAction) -> RegistrationError {
    tracing::error!(?action, "Ledger answered with an unexpected outcome");
    RegistrationError::Storage("unexpected ledger outcome".into())
}

/// Event administration
#[derive(Clone)]
pub struct EventService {
    capacity: Arc<dyn CapacityStore>,
    clock: Arc<dyn Clock>,
}

impl EventService {
    /// Create a new event service
    #[must_use]
    pub fn new(capacity: Arc<dyn CapacityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { capacity, clock }
    }

    /// Create an event organized by `actor`.
    ///
    /// # Errors
    ///
    /// `Forbidden` for participants, `Validation` for a bad draft, or a
    /// storage error.
    #[tracing::instrument(skip(self, draft), fields(user_id = %actor.user_id))]
    pub async fn create_event(&self, actor: &Actor, draft: NewEvent) -> Result<Event> {
        if !actor.role.can_organize() {
            return Err(RegistrationError::Forbidden(format!(
                "role {} may not create events",
                actor.role
            )));
        }
        draft.validate()?;

        let event = self
            .capacity
            .create_event(Event::new(draft, actor.user_id, self.clock.now()))
            .await?;
        tracing::info!(event_id = %event.id, max = ?event.max_participants, "Event created");
        Ok(event)
    }

    /// Load an event.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event does not exist, or a storage error.
    pub async fn get_event(&self, event_id: EventId) -> Result<Event> {
        self.capacity
            .get_event(event_id)
            .await?
            .ok_or_else(|| RegistrationError::event_not_found(event_id))
    }

    /// Deactivate an event. Existing registrations are kept.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden` unless `actor` organizes the event or is an
    /// admin, or a storage error.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn deactivate_event(&self, actor: &Actor, event_id: EventId) -> Result<Event> {
        let event = self.get_event(event_id).await?;
        if !event.managed_by(actor) {
            return Err(RegistrationError::Forbidden(format!(
                "user {} does not organize event {event_id}",
                actor.user_id
            )));
        }
        self.capacity.deactivate_event(event_id).await
    }

    /// Events organized by `organizer_id`, for that organizer or an admin.
    ///
    /// # Errors
    ///
    /// `Forbidden` for any other caller, or a storage error.
    pub async fn list_events_by_organizer(
        &self,
        actor: &Actor,
        organizer_id: UserId,
    ) -> Result<Vec<Event>> {
        if !actor.owns_or_admin(organizer_id) {
            return Err(RegistrationError::Forbidden(format!(
                "user {} may not list events of organizer {organizer_id}",
                actor.user_id
            )));
        }
        self.capacity.list_events_by_organizer(organizer_id).await
    }

    /// Totals across `organizer_id`'s events, for that organizer or an admin.
    ///
    /// # Errors
    ///
    /// `Forbidden` for any other caller, or a storage error.
    pub async fn organizer_stats(
        &self,
        actor: &Actor,
        organizer_id: UserId,
    ) -> Result<OrganizerStats> {
        let events = self.list_events_by_organizer(actor, organizer_id).await?;
        Ok(OrganizerStats::from_events(organizer_id, &events))
    }
}
