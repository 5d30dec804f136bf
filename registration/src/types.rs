//! Domain types for event registration.
//!
//! Identifiers, the event and registration records, the participant role
//! taxonomy, and the small value types exchanged between the capacity store
//! and the registration ledger.

use crate::error::RegistrationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Unique identifier for a user, asserted by the upstream identity boundary
    UserId
);
uuid_id!(
    /// Unique identifier for a registration
    RegistrationId
);
uuid_id!(
    /// Correlates a ledger command with the outcome it produces
    RequestId
);

// ============================================================================
// Roles
// ============================================================================

/// Role asserted for the calling user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Registers for events
    Participant,
    /// Creates and manages their own events
    Organizer,
    /// Full access
    Admin,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Participant => "PARTICIPANT",
            Self::Organizer => "ORGANIZER",
            Self::Admin => "ADMIN",
        }
    }

    /// Whether this role may create events
    #[must_use]
    pub const fn can_organize(self) -> bool {
        match self {
            Self::Organizer | Self::Admin => true,
            Self::Participant => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PARTICIPANT" => Ok(Self::Participant),
            "ORGANIZER" => Ok(Self::Organizer),
            "ADMIN" => Ok(Self::Admin),
            other => Err(RegistrationError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Authenticated caller: a user id and the role asserted for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Calling user
    pub user_id: UserId,
    /// Role of the calling user
    pub role: Role,
}

impl Actor {
    /// Create an actor
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Shorthand for a participant actor
    #[must_use]
    pub const fn participant(user_id: UserId) -> Self {
        Self::new(user_id, Role::Participant)
    }

    /// Whether the actor is an administrator
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Owner of the record, or an administrator
    #[must_use]
    pub fn owns_or_admin(&self, owner: UserId) -> bool {
        self.user_id == owner || self.is_admin()
    }
}

// ============================================================================
// Events (capacity side)
// ============================================================================

/// A capacity-limited event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Display title
    pub title: String,
    /// User who organizes the event
    pub organizer_id: UserId,
    /// Capacity; `None` means unlimited
    pub max_participants: Option<u32>,
    /// Slots currently held by confirmed registrations
    pub current_participants: u32,
    /// Soft-delete flag
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Build a fresh, active event with no participants
    #[must_use]
    pub fn new(draft: NewEvent, organizer_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            title: draft.title,
            organizer_id,
            max_participants: draft.max_participants,
            current_participants: 0,
            is_active: true,
            created_at,
        }
    }

    /// Whether another slot can be taken
    #[must_use]
    pub fn has_free_slot(&self) -> bool {
        self.max_participants
            .is_none_or(|max| self.current_participants < max)
    }

    /// Remaining capacity
    #[must_use]
    pub fn available_slots(&self) -> AvailableSlots {
        match self.max_participants {
            Some(max) => AvailableSlots::Limited(max.saturating_sub(self.current_participants)),
            None => AvailableSlots::Unlimited,
        }
    }

    /// Organizer of this event, or an administrator
    #[must_use]
    pub fn managed_by(&self, actor: &Actor) -> bool {
        actor.owns_or_admin(self.organizer_id)
    }
}

/// Fields supplied when creating an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Display title
    pub title: String,
    /// Capacity; `None` means unlimited
    #[serde(default)]
    pub max_participants: Option<u32>,
}

impl NewEvent {
    /// Largest capacity an event may declare; counters are stored as `INTEGER`
    pub const MAX_CAPACITY: u32 = i32::MAX.unsigned_abs();

    /// Check the draft before it reaches storage
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Validation`] for a blank title, or a
    /// capacity of zero or above [`NewEvent::MAX_CAPACITY`].
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.title.trim().is_empty() {
            return Err(RegistrationError::Validation("title is required".into()));
        }
        match self.max_participants {
            Some(0) => Err(RegistrationError::Validation(
                "max_participants must be at least 1".into(),
            )),
            Some(max) if max > Self::MAX_CAPACITY => Err(RegistrationError::Validation(format!(
                "max_participants must be at most {}",
                Self::MAX_CAPACITY
            ))),
            _ => Ok(()),
        }
    }
}

/// Result of an atomic capacity check-and-increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reservation {
    /// A slot was taken
    Granted,
    /// The event is full; nothing was mutated
    Waitlisted,
}

/// Remaining capacity of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AvailableSlots {
    /// Bounded capacity with this many free slots
    Limited(u32),
    /// No capacity limit
    Unlimited,
}

impl Serialize for AvailableSlots {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Limited(n) => serializer.serialize_u32(*n),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

// ============================================================================
// Registrations (ledger side)
// ============================================================================

/// Lifecycle status of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    /// Holds a slot
    Confirmed,
    /// Awaiting confirmation; counts as active
    Pending,
    /// Terminal
    Cancelled,
    /// Accepted without a slot
    WaitingList,
}

impl RegistrationStatus {
    /// Storage and wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Pending => "PENDING",
            Self::Cancelled => "CANCELLED",
            Self::WaitingList => "WAITING_LIST",
        }
    }

    /// Parse the storage name
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Storage`] for an unknown status string.
    pub fn parse(s: &str) -> Result<Self, RegistrationError> {
        match s {
            "CONFIRMED" => Ok(Self::Confirmed),
            "PENDING" => Ok(Self::Pending),
            "CANCELLED" => Ok(Self::Cancelled),
            "WAITING_LIST" => Ok(Self::WaitingList),
            other => Err(RegistrationError::Storage(format!(
                "unknown registration status '{other}'"
            ))),
        }
    }

    /// CONFIRMED and PENDING block a second registration for the same user
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Confirmed | Self::Pending)
    }

    /// Only CONFIRMED registrations hold a capacity slot
    #[must_use]
    pub const fn holds_slot(self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Participant details captured at registration time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDetails {
    /// Full name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Optional phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl ParticipantDetails {
    /// Details with just a name and email
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
            notes: None,
        }
    }

    /// Check required fields
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Validation`] when the name is blank or the
    /// email is blank or lacks an `@`.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.name.trim().is_empty() {
            return Err(RegistrationError::Validation("participant name is required".into()));
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err(RegistrationError::Validation("participant email is required".into()));
        }
        if !email.contains('@') {
            return Err(RegistrationError::Validation(format!(
                "'{email}' is not a valid email address"
            )));
        }
        Ok(())
    }
}

/// A user's registration for an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration ID
    pub id: RegistrationId,
    /// Event registered for
    pub event_id: EventId,
    /// Registered user
    pub user_id: UserId,
    /// Name snapshot
    pub participant_name: String,
    /// Email snapshot
    pub participant_email: String,
    /// Phone snapshot
    pub participant_phone: Option<String>,
    /// Lifecycle status
    pub status: RegistrationStatus,
    /// When the registration was created; never changes
    pub registration_date: DateTime<Utc>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl Registration {
    /// Build a registration from an admission decision
    #[must_use]
    pub fn new(
        id: RegistrationId,
        event_id: EventId,
        user_id: UserId,
        details: ParticipantDetails,
        status: RegistrationStatus,
        registration_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_id,
            user_id,
            participant_name: details.name.trim().to_string(),
            participant_email: details.email.trim().to_string(),
            participant_phone: details.phone,
            status,
            registration_date,
            notes: details.notes,
        }
    }
}

/// Registration counts for one event, by status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// CONFIRMED rows
    pub confirmed: u32,
    /// PENDING rows
    pub pending: u32,
    /// CANCELLED rows
    pub cancelled: u32,
    /// WAITING_LIST rows
    pub waiting_list: u32,
}

impl StatusCounts {
    /// Count one more registration with `status`
    pub fn record(&mut self, status: RegistrationStatus) {
        self.add(status, 1);
    }

    /// Count `n` registrations with `status`
    pub fn add(&mut self, status: RegistrationStatus, n: u32) {
        let slot = match status {
            RegistrationStatus::Confirmed => &mut self.confirmed,
            RegistrationStatus::Pending => &mut self.pending,
            RegistrationStatus::Cancelled => &mut self.cancelled,
            RegistrationStatus::WaitingList => &mut self.waiting_list,
        };
        *slot += n;
    }
}

/// Read-only statistics for one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EventStats {
    /// Event the stats describe
    pub event_id: EventId,
    /// CONFIRMED registrations
    pub confirmed: u32,
    /// PENDING registrations
    pub pending: u32,
    /// CANCELLED registrations
    pub cancelled: u32,
    /// WAITING_LIST registrations
    pub waiting_list: u32,
    /// Remaining capacity
    pub available_slots: AvailableSlots,
}

impl EventStats {
    /// Combine ledger counts with the event's capacity
    #[must_use]
    pub fn new(event: &Event, counts: StatusCounts) -> Self {
        Self {
            event_id: event.id,
            confirmed: counts.confirmed,
            pending: counts.pending,
            cancelled: counts.cancelled,
            waiting_list: counts.waiting_list,
            available_slots: event.available_slots(),
        }
    }
}

/// Totals across every event of one organizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OrganizerStats {
    /// Organizer the totals describe
    pub organizer_id: UserId,
    /// Events organized
    pub total_events: usize,
    /// Sum of `current_participants`
    pub total_participants: u64,
    /// Mean fill rate of capacity-limited events, as a rounded percentage
    pub average_attendance: u32,
}

impl OrganizerStats {
    /// Summarize `events`. Unlimited events count towards the totals but not
    /// towards the attendance average, which is 0 when no event has a limit.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn from_events(organizer_id: UserId, events: &[Event]) -> Self {
        let total_participants = events
            .iter()
            .map(|event| u64::from(event.current_participants))
            .sum();

        let fill_rates: Vec<f64> = events
            .iter()
            .filter_map(|event| {
                event
                    .max_participants
                    .filter(|max| *max > 0)
                    .map(|max| f64::from(event.current_participants) / f64::from(max) * 100.0)
            })
            .collect();
        let average_attendance = if fill_rates.is_empty() {
            0
        } else {
            (fill_rates.iter().sum::<f64>() / fill_rates.len() as f64).round() as u32
        };

        Self {
            organizer_id,
            total_events: events.len(),
            total_participants,
            average_attendance,
        }
    }
}

/// What to do when an event is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    /// Record the registration as WAITING_LIST
    #[default]
    Waitlist,
    /// Reject with `CapacityExceeded`
    Strict,
}

impl FromStr for CapacityPolicy {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waitlist" => Ok(Self::Waitlist),
            "strict" => Ok(Self::Strict),
            other => Err(RegistrationError::Validation(format!(
                "unknown capacity policy '{other}'"
            ))),
        }
    }
}
