//! CSV export of an event's registrations.
//!
//! One row per registration, oldest first, with every field quoted.

use crate::error::{RegistrationError, Result};
use crate::types::{EventId, Registration};
use csv::{QuoteStyle, WriterBuilder};

/// Column headers, in row order
pub const HEADERS: [&str; 5] = ["Name", "Email", "Phone", "Registration date", "Status"];

/// Attachment filename for an event's export
#[must_use]
pub fn filename(event_id: EventId) -> String {
    format!("inscriptions-evenement-{event_id}.csv")
}

/// Render registrations as UTF-8 CSV.
///
/// # Errors
///
/// Returns [`RegistrationError::Storage`] if a row cannot be encoded.
pub fn registrations_csv(registrations: &[Registration]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(HEADERS).map_err(encode_failed)?;
    for registration in registrations {
        writer
            .write_record([
                registration.participant_name.as_str(),
                registration.participant_email.as_str(),
                registration.participant_phone.as_deref().unwrap_or_default(),
                registration.registration_date.to_rfc3339().as_str(),
                registration.status.as_str(),
            ])
            .map_err(encode_failed)?;
    }

    writer
        .into_inner()
        .map_err(|error| RegistrationError::Storage(format!("CSV export failed: {error}")))
}

fn encode_failed(error: csv::Error) -> RegistrationError {
    RegistrationError::Storage(format!("CSV export failed: {error}"))
}
