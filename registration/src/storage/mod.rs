//! Storage backends.
//!
//! - [`memory::InMemoryStore`]: single-process backend for development and tests
//! - [`postgres::PostgresStore`]: `PostgreSQL` backend with a transactional coordinator

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use crate::error::Result;
use crate::types::{
    EventId, Registration, RegistrationId, RegistrationStatus, StatusCounts, UserId,
};
use futures::future::BoxFuture;

/// Ledger side of the registration protocol.
///
/// The store enforces at most one active (CONFIRMED or PENDING) registration
/// per `(event_id, user_id)`. Insertion is the serialization point for that
/// guarantee.
pub trait RegistrationRepository: Send + Sync {
    /// Insert a new registration.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRegistration` when `registration` is active and the
    /// pair already holds an active registration.
    fn insert(&self, registration: Registration) -> BoxFuture<'_, Result<Registration>>;

    /// Load a registration by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn find(&self, id: RegistrationId) -> BoxFuture<'_, Result<Option<Registration>>>;

    /// The active registration for a pair, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn find_active(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Option<Registration>>>;

    /// Flip a registration to CANCELLED.
    ///
    /// Returns the prior status when this call performed the flip, `None`
    /// when it was already cancelled. Concurrent callers see exactly one
    /// `Some`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the registration does not exist.
    fn cancel(&self, id: RegistrationId) -> BoxFuture<'_, Result<Option<RegistrationStatus>>>;

    /// A user's registrations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn list_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Registration>>>;

    /// An event's registrations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn list_by_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Vec<Registration>>>;

    /// Registration counts for an event, by status.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn count_by_status(&self, event_id: EventId) -> BoxFuture<'_, Result<StatusCounts>>;
}
