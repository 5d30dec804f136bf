//! Coordination between the capacity store and the registration ledger.
//!
//! A registration must never exist without a reserved slot, and a slot must
//! never stay reserved without a registration. [`Coordinator`] is the
//! boundary that keeps the two in step:
//!
//! - [`SagaCoordinator`] composes any [`CapacityStore`] and
//!   [`RegistrationRepository`]: reserve, then insert, and release again if
//!   the insert is rejected. Cancellation flips the status first and
//!   releases only if this call performed the flip. Each event has a gate:
//!   admissions and cancellations share it, reconciliation takes it alone.
//! - [`PostgresStore`](crate::storage::PostgresStore) runs both mutations in
//!   one database transaction, serialized on the event row.

use crate::capacity::CapacityStore;
use crate::error::{RegistrationError, Result};
use crate::storage::RegistrationRepository;
use crate::types::{
    Actor, CapacityPolicy, EventId, ParticipantDetails, Registration, RegistrationId,
    RegistrationStatus, Reservation, UserId,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rollcall_runtime::metrics::CoordinationMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A request to admit a user to an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Id the new registration will carry
    pub registration_id: RegistrationId,
    /// Event to join
    pub event_id: EventId,
    /// Registering user
    pub user_id: UserId,
    /// Participant snapshot
    pub details: ParticipantDetails,
    /// What to do when the event is full
    pub policy: CapacityPolicy,
    /// Registration timestamp
    pub requested_at: DateTime<Utc>,
}

impl Admission {
    /// Registration to persist for a given reservation outcome
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when the event is full under the strict policy.
    pub fn registration_for(&self, reservation: Reservation) -> Result<Registration> {
        let status = match (reservation, self.policy) {
            (Reservation::Granted, _) => RegistrationStatus::Confirmed,
            (Reservation::Waitlisted, CapacityPolicy::Waitlist) => RegistrationStatus::WaitingList,
            (Reservation::Waitlisted, CapacityPolicy::Strict) => {
                return Err(RegistrationError::CapacityExceeded {
                    event_id: self.event_id,
                });
            },
        };
        Ok(Registration::new(
            self.registration_id,
            self.event_id,
            self.user_id,
            self.details.clone(),
            status,
            self.requested_at,
        ))
    }

    /// Error for a pair that already holds an active registration
    #[must_use]
    pub const fn duplicate(&self) -> RegistrationError {
        RegistrationError::DuplicateRegistration {
            event_id: self.event_id,
            user_id: self.user_id,
        }
    }
}

/// A request to cancel a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Withdrawal {
    /// Registration to cancel
    pub registration_id: RegistrationId,
    /// Caller
    pub actor: Actor,
}

/// Outcome of a withdrawal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cancellation {
    /// The registration, now CANCELLED
    pub registration: Registration,
    /// Whether this call gave a slot back
    pub released: bool,
}

/// Only the owner or an administrator may cancel.
///
/// # Errors
///
/// Returns `Forbidden` otherwise.
pub fn authorize_cancel(actor: &Actor, registration: &Registration) -> Result<()> {
    if actor.owns_or_admin(registration.user_id) {
        Ok(())
    } else {
        Err(RegistrationError::Forbidden(format!(
            "user {} may not cancel registration {}",
            actor.user_id, registration.id
        )))
    }
}

/// A participant counter rewritten by reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Correction {
    /// Event whose counter moved
    pub event_id: EventId,
    /// Counter before
    pub from: u32,
    /// Counter after
    pub to: u32,
}

/// The counter value `confirmed` CONFIRMED registrations call for.
///
/// Capped at `max`; exceeding it means rows were written past capacity,
/// which is logged and left for an operator.
#[must_use]
pub fn settled_count(event_id: EventId, max: Option<u32>, confirmed: u32) -> u32 {
    match max {
        Some(max) if confirmed > max => {
            tracing::error!(
                %event_id,
                confirmed,
                max,
                "More CONFIRMED registrations than capacity"
            );
            max
        },
        _ => confirmed,
    }
}

/// Keeps capacity reservations and registration records in agreement.
pub trait Coordinator: Send + Sync {
    /// Reserve a slot and record the registration, or do neither.
    ///
    /// # Errors
    ///
    /// `DuplicateRegistration`, `NotFound`, `CapacityExceeded` (strict
    /// policy), or a storage error.
    fn admit(&self, admission: Admission) -> BoxFuture<'_, Result<Registration>>;

    /// Cancel a registration and release its slot exactly once.
    ///
    /// Cancelling an already-cancelled registration succeeds without
    /// releasing anything.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, or a storage error.
    fn withdraw(&self, withdrawal: Withdrawal) -> BoxFuture<'_, Result<Cancellation>>;

    /// Recompute an event's participant counter from its CONFIRMED count.
    ///
    /// No admission or cancellation for the event is part-way through while
    /// the count is taken and written. Returns the correction, or `None`
    /// when the counter already agreed.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event does not exist, or a storage error.
    fn reconcile(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<Correction>>>;
}

/// Reserve-then-insert coordination with compensating release.
///
/// A crash between the two steps can leave a slot reserved without a
/// record; [`Reconciler`](crate::reconcile::Reconciler) repairs that drift.
#[derive(Clone)]
pub struct SagaCoordinator {
    capacity: Arc<dyn CapacityStore>,
    registrations: Arc<dyn RegistrationRepository>,
    gates: Arc<Mutex<HashMap<EventId, Arc<RwLock<()>>>>>,
}

impl SagaCoordinator {
    /// Compose a capacity store and a registration repository
    #[must_use]
    pub fn new(
        capacity: Arc<dyn CapacityStore>,
        registrations: Arc<dyn RegistrationRepository>,
    ) -> Self {
        Self {
            capacity,
            registrations,
            gates: Arc::default(),
        }
    }

    async fn gate(&self, event_id: EventId) -> Arc<RwLock<()>> {
        Arc::clone(self.gates.lock().await.entry(event_id).or_default())
    }

    async fn compensate(&self, event_id: EventId, cause: &RegistrationError) {
        CoordinationMetrics::record_compensation();
        match self.capacity.release(event_id).await {
            Ok(()) => tracing::info!(
                %event_id,
                cause = %cause,
                "Released reservation after rejected insert"
            ),
            Err(error) => tracing::error!(
                %event_id,
                cause = %cause,
                error = %error,
                "Compensating release failed; reconciliation will correct the counter"
            ),
        }
    }
}

impl Coordinator for SagaCoordinator {
    fn admit(&self, admission: Admission) -> BoxFuture<'_, Result<Registration>> {
        Box::pin(async move {
            let gate = self.gate(admission.event_id).await;
            let _in_flight = gate.read().await;

            if self
                .registrations
                .find_active(admission.event_id, admission.user_id)
                .await?
                .is_some()
            {
                return Err(admission.duplicate());
            }

            let reservation = self.capacity.reserve(admission.event_id).await?;
            // Only a waitlisted reservation can fail here, and it mutated nothing
            let registration = admission.registration_for(reservation)?;

            match self.registrations.insert(registration).await {
                Ok(registration) => Ok(registration),
                Err(error) => {
                    if reservation == Reservation::Granted {
                        self.compensate(admission.event_id, &error).await;
                    }
                    Err(error)
                },
            }
        })
    }

    fn withdraw(&self, withdrawal: Withdrawal) -> BoxFuture<'_, Result<Cancellation>> {
        Box::pin(async move {
            let mut registration = self
                .registrations
                .find(withdrawal.registration_id)
                .await?
                .ok_or_else(|| RegistrationError::registration_not_found(withdrawal.registration_id))?;

            authorize_cancel(&withdrawal.actor, &registration)?;

            let gate = self.gate(registration.event_id).await;
            let _in_flight = gate.read().await;

            let prior = self.registrations.cancel(registration.id).await?;
            registration.status = RegistrationStatus::Cancelled;

            let released = match prior {
                Some(status) if status.holds_slot() => {
                    match self.capacity.release(registration.event_id).await {
                        Ok(()) => true,
                        Err(error) => {
                            tracing::error!(
                                registration_id = %registration.id,
                                event_id = %registration.event_id,
                                error = %error,
                                "Release after cancellation failed; reconciliation will correct the counter"
                            );
                            false
                        },
                    }
                },
                Some(_) => false,
                None => {
                    tracing::debug!(registration_id = %registration.id, "Registration already cancelled");
                    false
                },
            };

            Ok(Cancellation {
                registration,
                released,
            })
        })
    }

    fn reconcile(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<Correction>>> {
        Box::pin(async move {
            let gate = self.gate(event_id).await;
            let _exclusive = gate.write().await;

            let event = self
                .capacity
                .get_event(event_id)
                .await?
                .ok_or_else(|| RegistrationError::event_not_found(event_id))?;
            let counts = self.registrations.count_by_status(event_id).await?;
            let target = settled_count(event_id, event.max_participants, counts.confirmed);
            if target == event.current_participants {
                return Ok(None);
            }

            // Only writers outside this coordinator can move the counter now
            let corrected = self
                .capacity
                .correct_participants(event_id, event.current_participants, target)
                .await?;
            Ok(corrected.then_some(Correction {
                event_id,
                from: event.current_participants,
                to: target,
            }))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::{Event, NewEvent, Role};
    use rollcall_core::environment::Clock;
    use rollcall_testing::test_clock;

    async fn setup(max: Option<u32>) -> (Arc<InMemoryStore>, SagaCoordinator, EventId) {
        let store = Arc::new(InMemoryStore::new());
        let event = Event::new(
            NewEvent {
                title: "Workshop".into(),
                max_participants: max,
            },
            UserId::new(),
            test_clock().now(),
        );
        let event_id = event.id;
        store.create_event(event).await.unwrap();
        let coordinator = SagaCoordinator::new(store.clone(), store.clone());
        (store, coordinator, event_id)
    }

    fn admission(event_id: EventId, user_id: UserId, policy: CapacityPolicy) -> Admission {
        Admission {
            registration_id: RegistrationId::new(),
            event_id,
            user_id,
            details: ParticipantDetails::new("Linus", "linus@example.com"),
            policy,
            requested_at: test_clock().now(),
        }
    }

    #[test]
    fn strict_policy_rejects_when_full() {
        let a = admission(EventId::new(), UserId::new(), CapacityPolicy::Strict);
        assert!(matches!(
            a.registration_for(Reservation::Waitlisted),
            Err(RegistrationError::CapacityExceeded { .. })
        ));
        assert_eq!(
            a.registration_for(Reservation::Granted).unwrap().status,
            RegistrationStatus::Confirmed
        );
    }

    #[test]
    fn registration_carries_request_timestamp() {
        let a = admission(EventId::new(), UserId::new(), CapacityPolicy::Waitlist);
        let registration = a.registration_for(Reservation::Waitlisted).unwrap();
        assert_eq!(registration.status, RegistrationStatus::WaitingList);
        assert_eq!(registration.registration_date, test_clock().now());
        assert_eq!(registration.id, a.registration_id);
    }

    #[tokio::test]
    async fn admit_then_duplicate() {
        let (store, coordinator, event_id) = setup(Some(3)).await;
        let user = UserId::new();

        coordinator
            .admit(admission(event_id, user, CapacityPolicy::Waitlist))
            .await
            .unwrap();
        let again = coordinator
            .admit(admission(event_id, user, CapacityPolicy::Waitlist))
            .await;

        assert!(matches!(again, Err(RegistrationError::DuplicateRegistration { .. })));
        let event = store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(event.current_participants, 1);
    }

    #[tokio::test]
    async fn strict_full_event_mutates_nothing() {
        let (store, coordinator, event_id) = setup(Some(1)).await;

        coordinator
            .admit(admission(event_id, UserId::new(), CapacityPolicy::Strict))
            .await
            .unwrap();
        let rejected = coordinator
            .admit(admission(event_id, UserId::new(), CapacityPolicy::Strict))
            .await;

        assert!(matches!(rejected, Err(RegistrationError::CapacityExceeded { .. })));
        let counts = store.count_by_status(event_id).await.unwrap();
        assert_eq!(counts.confirmed, 1);
        assert_eq!(counts.waiting_list, 0);
    }

    #[tokio::test]
    async fn withdraw_requires_owner_or_admin() {
        let (_store, coordinator, event_id) = setup(None).await;
        let owner = UserId::new();
        let registration = coordinator
            .admit(admission(event_id, owner, CapacityPolicy::Waitlist))
            .await
            .unwrap();

        let stranger = coordinator
            .withdraw(Withdrawal {
                registration_id: registration.id,
                actor: Actor::new(UserId::new(), Role::Organizer),
            })
            .await;
        assert!(matches!(stranger, Err(RegistrationError::Forbidden(_))));

        let admin = coordinator
            .withdraw(Withdrawal {
                registration_id: registration.id,
                actor: Actor::new(UserId::new(), Role::Admin),
            })
            .await
            .unwrap();
        assert!(admin.released);
        assert_eq!(admin.registration.status, RegistrationStatus::Cancelled);
    }

    #[tokio::test]
    async fn withdraw_twice_releases_once() {
        let (store, coordinator, event_id) = setup(Some(2)).await;
        let owner = UserId::new();
        let registration = coordinator
            .admit(admission(event_id, owner, CapacityPolicy::Waitlist))
            .await
            .unwrap();
        let withdrawal = Withdrawal {
            registration_id: registration.id,
            actor: Actor::participant(owner),
        };

        assert!(coordinator.withdraw(withdrawal).await.unwrap().released);
        assert!(!coordinator.withdraw(withdrawal).await.unwrap().released);

        let event = store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(event.current_participants, 0);
    }

    #[tokio::test]
    async fn withdrawing_waitlisted_keeps_counter() {
        let (store, coordinator, event_id) = setup(Some(1)).await;
        coordinator
            .admit(admission(event_id, UserId::new(), CapacityPolicy::Waitlist))
            .await
            .unwrap();
        let waiting_user = UserId::new();
        let waiting = coordinator
            .admit(admission(event_id, waiting_user, CapacityPolicy::Waitlist))
            .await
            .unwrap();
        assert_eq!(waiting.status, RegistrationStatus::WaitingList);

        let outcome = coordinator
            .withdraw(Withdrawal {
                registration_id: waiting.id,
                actor: Actor::participant(waiting_user),
            })
            .await
            .unwrap();

        assert!(!outcome.released);
        let event = store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(event.current_participants, 1);
    }

    #[tokio::test]
    async fn withdraw_unknown_registration_is_not_found() {
        let (_store, coordinator, _event_id) = setup(None).await;
        let result = coordinator
            .withdraw(Withdrawal {
                registration_id: RegistrationId::new(),
                actor: Actor::participant(UserId::new()),
            })
            .await;
        assert!(matches!(result, Err(RegistrationError::NotFound { .. })));
    }

    #[test]
    fn settled_count_caps_at_capacity() {
        assert_eq!(settled_count(EventId::new(), Some(2), 3), 2);
        assert_eq!(settled_count(EventId::new(), Some(2), 1), 1);
        assert_eq!(settled_count(EventId::new(), None, 7), 7);
    }

    #[tokio::test]
    async fn reconcile_reports_the_correction() {
        let (store, coordinator, event_id) = setup(Some(3)).await;
        store.reserve(event_id).await.unwrap();

        assert_eq!(
            coordinator.reconcile(event_id).await.unwrap(),
            Some(Correction {
                event_id,
                from: 1,
                to: 0
            })
        );
        assert_eq!(coordinator.reconcile(event_id).await.unwrap(), None);
        assert!(matches!(
            coordinator.reconcile(EventId::new()).await,
            Err(RegistrationError::NotFound { .. })
        ));
    }
}
