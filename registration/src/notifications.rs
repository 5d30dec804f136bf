//! Registration notifications.
//!
//! Delivery is fire-and-forget: the ledger hands a confirmed registration to
//! a [`Notifier`] after the outcome is final, and a failed delivery is logged
//! without touching the ledger.

use crate::types::{Registration, RegistrationStatus};
use futures::future::BoxFuture;
use thiserror::Error;

/// Notification delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The channel refused or dropped the message
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Sends a message to the participant once a registration is recorded.
///
/// This trait abstracts over delivery channels (email, SMS, push).
pub trait Notifier: Send + Sync {
    /// Tell the participant about their new registration.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Delivery`] if the channel rejects the message.
    fn registration_recorded(
        &self,
        registration: &Registration,
    ) -> BoxFuture<'static, Result<(), NotifyError>>;
}

/// Notifier that writes the message to the log instead of sending it.
///
/// Useful for development and tests where nothing should leave the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    /// Create a new logging notifier
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Subject line for a registration in `status`
#[must_use]
pub const fn subject_for(status: RegistrationStatus) -> &'static str {
    match status {
        RegistrationStatus::Confirmed => "Your registration is confirmed",
        RegistrationStatus::WaitingList => "You are on the waiting list",
        RegistrationStatus::Pending => "Your registration is pending",
        RegistrationStatus::Cancelled => "Your registration was cancelled",
    }
}

impl Notifier for LoggingNotifier {
    fn registration_recorded(
        &self,
        registration: &Registration,
    ) -> BoxFuture<'static, Result<(), NotifyError>> {
        let to = registration.participant_email.clone();
        let registration_id = registration.id;
        let event_id = registration.event_id;
        let subject = subject_for(registration.status);

        Box::pin(async move {
            tracing::info!(
                to = %to,
                %registration_id,
                %event_id,
                subject,
                "Registration notification (logged, not sent)"
            );
            Ok(())
        })
    }
}
