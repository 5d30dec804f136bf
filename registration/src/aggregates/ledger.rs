//! Registration ledger aggregate.
//!
//! Commands (`Register`, `Cancel`) become effects that run the coordination
//! protocol against storage. Each effect feeds back exactly one outcome
//! (`Registered`, `Cancelled` or `Rejected`) carrying the command's
//! [`RequestId`], which is how callers waiting on the store pick out their
//! own answer among concurrent requests.
//!
//! The reducer itself never touches storage and never blocks: the capacity
//! decision is made atomically by the [`Coordinator`], not by this state.

use crate::coordination::{Admission, Cancellation, Coordinator, Withdrawal};
use crate::error::RegistrationError;
use crate::notifications::Notifier;
use crate::types::{
    CapacityPolicy, EventId, ParticipantDetails, Registration, RegistrationId, RequestId, UserId,
};
use rollcall_core::{
    async_effect, effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec,
};
use rollcall_runtime::metrics::RegistrationMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the registration ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerAction {
    // Commands
    /// Register a user for an event
    Register {
        /// Correlation id for the outcome
        request_id: RequestId,
        /// Id the registration will carry if recorded
        registration_id: RegistrationId,
        /// Event to join
        event_id: EventId,
        /// Registering user
        user_id: UserId,
        /// Participant snapshot
        details: ParticipantDetails,
        /// What to do when the event is full
        policy: CapacityPolicy,
    },

    /// Cancel a registration
    Cancel {
        /// Correlation id for the outcome
        request_id: RequestId,
        /// Registration and caller
        withdrawal: Withdrawal,
    },

    // Events
    /// A registration was recorded, CONFIRMED or WAITING_LIST
    Registered {
        /// Correlation id of the `Register` command
        request_id: RequestId,
        /// The stored registration
        registration: Registration,
    },

    /// A registration is now CANCELLED
    Cancelled {
        /// Correlation id of the `Cancel` command
        request_id: RequestId,
        /// Cancelled registration and whether a slot was released
        cancellation: Cancellation,
    },

    /// A command failed; nothing was changed
    Rejected {
        /// Correlation id of the failed command
        request_id: RequestId,
        /// Why
        error: RegistrationError,
    },
}

impl LedgerAction {
    /// Correlation id carried by every variant
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::Register { request_id, .. }
            | Self::Cancel { request_id, .. }
            | Self::Registered { request_id, .. }
            | Self::Cancelled { request_id, .. }
            | Self::Rejected { request_id, .. } => *request_id,
        }
    }

    /// Whether this action is the outcome of `request_id`
    #[must_use]
    pub fn is_outcome_of(&self, request_id: RequestId) -> bool {
        matches!(
            self,
            Self::Registered { .. } | Self::Cancelled { .. } | Self::Rejected { .. }
        ) && self.request_id() == request_id
    }
}

// ============================================================================
// State
// ============================================================================

/// A command whose outcome has not come back yet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InFlight {
    /// `Register` for a pair
    Register {
        /// Event
        event_id: EventId,
        /// User
        user_id: UserId,
    },
    /// `Cancel` of a registration
    Cancel {
        /// Registration
        registration_id: RegistrationId,
    },
}

/// Ledger state: commands awaiting an outcome.
///
/// Registrations themselves live in storage.
#[derive(Clone, Debug, Default)]
pub struct LedgerState {
    in_flight: HashMap<RequestId, InFlight>,
}

impl LedgerState {
    /// Creates an empty `LedgerState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commands awaiting an outcome
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// The pending command for `request_id`, if any
    #[must_use]
    pub fn in_flight(&self, request_id: RequestId) -> Option<InFlight> {
        self.in_flight.get(&request_id).copied()
    }

    fn begin(&mut self, request_id: RequestId, command: InFlight) {
        self.in_flight.insert(request_id, command);
        RegistrationMetrics::record_in_flight(self.in_flight.len());
    }

    fn finish(&mut self, request_id: RequestId) {
        if self.in_flight.remove(&request_id).is_none() {
            tracing::debug!(%request_id, "Outcome for unknown request");
        }
        RegistrationMetrics::record_in_flight(self.in_flight.len());
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the ledger
#[derive(Clone)]
pub struct LedgerEnvironment {
    /// Keeps capacity and registrations in step
    pub coordinator: Arc<dyn Coordinator>,
    /// Participant notifications
    pub notifier: Arc<dyn Notifier>,
    /// Clock for registration timestamps
    pub clock: Arc<dyn Clock>,
}

impl LedgerEnvironment {
    /// Creates a new `LedgerEnvironment`
    #[must_use]
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            coordinator,
            notifier,
            clock,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the registration ledger
#[derive(Clone, Copy, Debug, Default)]
pub struct LedgerReducer;

impl LedgerReducer {
    /// Creates a new `LedgerReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn rejected(request_id: RequestId, error: RegistrationError) -> Effect<LedgerAction> {
        async_effect! {
            RegistrationMetrics::record_rejected(error.code());
            Some(LedgerAction::Rejected { request_id, error })
        }
    }

    fn admit(
        request_id: RequestId,
        admission: Admission,
        env: &LedgerEnvironment,
    ) -> Effect<LedgerAction> {
        let coordinator = Arc::clone(&env.coordinator);
        async_effect! {
            let started = Instant::now();
            match coordinator.admit(admission).await {
                Ok(registration) => {
                    RegistrationMetrics::record_registered(
                        registration.status.as_str(),
                        started.elapsed(),
                    );
                    Some(LedgerAction::Registered { request_id, registration })
                },
                Err(error) => {
                    RegistrationMetrics::record_rejected(error.code());
                    Some(LedgerAction::Rejected { request_id, error })
                },
            }
        }
    }

    fn withdraw(
        request_id: RequestId,
        withdrawal: Withdrawal,
        env: &LedgerEnvironment,
    ) -> Effect<LedgerAction> {
        let coordinator = Arc::clone(&env.coordinator);
        async_effect! {
            match coordinator.withdraw(withdrawal).await {
                Ok(cancellation) => {
                    if cancellation.released {
                        RegistrationMetrics::record_cancelled();
                    }
                    Some(LedgerAction::Cancelled { request_id, cancellation })
                },
                Err(error) => {
                    RegistrationMetrics::record_rejected(error.code());
                    Some(LedgerAction::Rejected { request_id, error })
                },
            }
        }
    }

    fn notify(registration: &Registration, env: &LedgerEnvironment) -> Effect<LedgerAction> {
        let delivery = env.notifier.registration_recorded(registration);
        let registration_id = registration.id;
        async_effect! {
            if let Err(error) = delivery.await {
                tracing::warn!(%registration_id, error = %error, "Notification failed");
            }
            None
        }
    }
}

impl Reducer for LedgerReducer {
    type State = LedgerState;
    type Action = LedgerAction;
    type Environment = LedgerEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            LedgerAction::Register {
                request_id,
                registration_id,
                event_id,
                user_id,
                details,
                policy,
            } => {
                state.begin(request_id, InFlight::Register { event_id, user_id });

                if let Err(error) = details.validate() {
                    return smallvec![Self::rejected(request_id, error)];
                }

                let admission = Admission {
                    registration_id,
                    event_id,
                    user_id,
                    details,
                    policy,
                    requested_at: env.clock.now(),
                };
                smallvec![Self::admit(request_id, admission, env)]
            },

            LedgerAction::Cancel {
                request_id,
                withdrawal,
            } => {
                state.begin(
                    request_id,
                    InFlight::Cancel {
                        registration_id: withdrawal.registration_id,
                    },
                );
                smallvec![Self::withdraw(request_id, withdrawal, env)]
            },

            // ========== Events ==========
            LedgerAction::Registered {
                request_id,
                registration,
            } => {
                state.finish(request_id);
                smallvec![Self::notify(&registration, env)]
            },

            LedgerAction::Cancelled { request_id, .. } => {
                state.finish(request_id);
                SmallVec::new()
            },

            LedgerAction::Rejected { request_id, error } => {
                state.finish(request_id);
                tracing::debug!(%request_id, code = error.code(), "Ledger command rejected");
                SmallVec::new()
            },
        }
    }
}
