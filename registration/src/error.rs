//! Error types for the registration service.

use crate::types::{EventId, UserId};
use thiserror::Error;

/// Errors produced by registration and capacity operations.
///
/// The first four are user-correctable and never retried. Every variant has a
/// stable machine code (see [`RegistrationError::code`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Event or registration does not exist (or the event is inactive)
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of record
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The user already holds an active registration for the event
    #[error("user {user_id} already has an active registration for event {event_id}")]
    DuplicateRegistration {
        /// Event
        event_id: EventId,
        /// User
        user_id: UserId,
    },

    /// The actor may not perform the operation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The event is full and the strict capacity policy is in force
    #[error("event {event_id} is at capacity")]
    CapacityExceeded {
        /// Event
        event_id: EventId,
    },

    /// Input failed validation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// The ledger could not answer in time or is shutting down
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl RegistrationError {
    /// Shorthand for a missing event
    #[must_use]
    pub fn event_not_found(id: EventId) -> Self {
        Self::NotFound {
            resource: "event",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing registration
    #[must_use]
    pub fn registration_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: "registration",
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::DuplicateRegistration { .. } => "DUPLICATE_REGISTRATION",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl From<sqlx::Error> for RegistrationError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<rollcall_runtime::StoreError> for RegistrationError {
    fn from(err: rollcall_runtime::StoreError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Result alias for registration operations
pub type Result<T> = std::result::Result<T, RegistrationError>;

/// Errors raised while starting the application.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Database connection failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Metrics recorder could not be installed
    #[error("Metrics error: {0}")]
    Metrics(#[from] rollcall_runtime::metrics::MetricsError),

    /// Binding or serving HTTP failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}
