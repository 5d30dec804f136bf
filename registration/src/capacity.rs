//! Event capacity store.
//!
//! Owns each event's `max_participants` / `current_participants` counters.
//! `reserve` and `release` are single atomic read-modify-writes per event:
//! same-event calls serialize, different events never block each other.
//!
//! Note: methods return `BoxFuture` instead of being `async fn` so the trait
//! stays dyn-compatible.

use crate::error::Result;
use crate::types::{AvailableSlots, Event, EventId, Reservation, UserId};
use futures::future::BoxFuture;

/// Capacity side of the registration protocol.
pub trait CapacityStore: Send + Sync {
    /// Persist a new event.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    fn create_event(&self, event: Event) -> BoxFuture<'_, Result<Event>>;

    /// Load an event, active or not.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn get_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<Event>>>;

    /// Events organized by `organizer_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn list_events_by_organizer(&self, organizer_id: UserId) -> BoxFuture<'_, Result<Vec<Event>>>;

    /// Every event, used by reconciliation.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn list_events(&self) -> BoxFuture<'_, Result<Vec<Event>>>;

    /// Soft-delete an event. Deactivating twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the event does not exist.
    fn deactivate_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Event>>;

    /// Atomically take a slot if one is free.
    ///
    /// Returns [`Reservation::Granted`] after incrementing, or
    /// [`Reservation::Waitlisted`] without mutating when the event is full.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the event does not exist or is inactive.
    fn reserve(&self, event_id: EventId) -> BoxFuture<'_, Result<Reservation>>;

    /// Atomically give a slot back, floored at zero. Never fails at zero.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the event does not exist, or a storage error.
    fn release(&self, event_id: EventId) -> BoxFuture<'_, Result<()>>;

    /// Free capacity of an event.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the event does not exist.
    fn available_slots(&self, event_id: EventId) -> BoxFuture<'_, Result<AvailableSlots>> {
        Box::pin(async move {
            self.get_event(event_id)
                .await?
                .map(|event| event.available_slots())
                .ok_or_else(|| crate::error::RegistrationError::event_not_found(event_id))
        })
    }

    /// Overwrite `current_participants` with `actual`, but only if it still
    /// equals `expected`. Returns whether the counter was changed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the event does not exist, or a storage error.
    fn correct_participants(
        &self,
        event_id: EventId,
        expected: u32,
        actual: u32,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Connectivity check for readiness.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend is unreachable.
    fn ping(&self) -> BoxFuture<'_, Result<()>>;
}
