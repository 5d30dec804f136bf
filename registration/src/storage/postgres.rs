//! `PostgreSQL` storage backend.
//!
//! - `reserve` is one conditional `UPDATE … RETURNING`, so the capacity check
//!   and the increment cannot interleave with another reserve.
//! - `release` is `GREATEST(current - 1, 0)`.
//! - The one-active-registration rule is a partial unique index on
//!   `(event_id, user_id) WHERE status IN ('CONFIRMED', 'PENDING')`.
//! - [`Coordinator`] runs reserve + insert (and cancel + release) inside a
//!   single transaction, so both happen or neither does.

use crate::capacity::CapacityStore;
use crate::config::DatabaseConfig;
use crate::coordination::{
    authorize_cancel, settled_count, Admission, Cancellation, Coordinator, Correction, Withdrawal,
};
use crate::error::{RegistrationError, Result, StartupError};
use crate::storage::RegistrationRepository;
use crate::types::{
    Event, EventId, Registration, RegistrationId, RegistrationStatus, Reservation, StatusCounts,
    UserId,
};
use futures::future::BoxFuture;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

const EVENT_COLUMNS: &str =
    "id, title, organizer_id, max_participants, current_participants, is_active, created_at";

const REGISTRATION_COLUMNS: &str = "id, event_id, user_id, participant_name, participant_email, \
     participant_phone, status, registration_date, notes";

/// `PostgreSQL`-backed capacity store, registration repository and coordinator.
///
/// # Example
///
/// ```no_run
/// use registration::storage::PostgresStore;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresStore::new(pool);
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool using the configured limits
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::Database`] if the database is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> std::result::Result<Self, StartupError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled migrations
    ///
    /// # Errors
    ///
    /// Returns the migration error if any migration fails.
    pub async fn migrate(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn reserve_on(conn: &mut PgConnection, event_id: EventId) -> Result<Reservation> {
        let granted: Option<(i32,)> = sqlx::query_as(
            r"
            UPDATE events
            SET current_participants = current_participants + 1
            WHERE id = $1
              AND is_active
              AND (max_participants IS NULL OR current_participants < max_participants)
            RETURNING current_participants
            ",
        )
        .bind(*event_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        if granted.is_some() {
            return Ok(Reservation::Granted);
        }

        let active: Option<(bool,)> = sqlx::query_as("SELECT is_active FROM events WHERE id = $1")
            .bind(*event_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;

        match active {
            Some((true,)) => Ok(Reservation::Waitlisted),
            Some((false,)) | None => Err(RegistrationError::event_not_found(event_id)),
        }
    }

    async fn release_on(conn: &mut PgConnection, event_id: EventId) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE events
            SET current_participants = GREATEST(current_participants - 1, 0)
            WHERE id = $1
            ",
        )
        .bind(*event_id.as_uuid())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistrationError::event_not_found(event_id));
        }
        Ok(())
    }

    async fn insert_on(conn: &mut PgConnection, registration: &Registration) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO registrations (
                id, event_id, user_id, participant_name, participant_email,
                participant_phone, status, registration_date, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(*registration.id.as_uuid())
        .bind(*registration.event_id.as_uuid())
        .bind(*registration.user_id.as_uuid())
        .bind(&registration.participant_name)
        .bind(&registration.participant_email)
        .bind(&registration.participant_phone)
        .bind(registration.status.as_str())
        .bind(registration.registration_date)
        .bind(&registration.notes)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return RegistrationError::DuplicateRegistration {
                        event_id: registration.event_id,
                        user_id: registration.user_id,
                    };
                }
            }
            RegistrationError::from(e)
        })?;
        Ok(())
    }

    async fn find_for_update(
        conn: &mut PgConnection,
        id: RegistrationId,
    ) -> Result<Option<Registration>> {
        let row = sqlx::query(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1 FOR UPDATE"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(row_to_registration).transpose()
    }

    async fn mark_cancelled(conn: &mut PgConnection, id: RegistrationId) -> Result<()> {
        sqlx::query("UPDATE registrations SET status = 'CANCELLED' WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn query_registrations(&self, filter: &str, id: Uuid) -> Result<Vec<Registration>> {
        let rows = sqlx::query(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE {filter} = $1 \
             ORDER BY registration_date ASC, id ASC"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_registration).collect()
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| RegistrationError::Storage(format!("negative value {value} in {column}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| RegistrationError::Storage(format!("value {value} for {column} is too large")))
}

fn row_to_event(row: &PgRow) -> Result<Event> {
    let max: Option<i32> = row.try_get("max_participants")?;
    Ok(Event {
        id: EventId::from_uuid(row.try_get("id")?),
        title: row.try_get("title")?,
        organizer_id: UserId::from_uuid(row.try_get("organizer_id")?),
        max_participants: max.map(|m| to_u32(m, "max_participants")).transpose()?,
        current_participants: to_u32(row.try_get("current_participants")?, "current_participants")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_registration(row: &PgRow) -> Result<Registration> {
    let status: String = row.try_get("status")?;
    Ok(Registration {
        id: RegistrationId::from_uuid(row.try_get("id")?),
        event_id: EventId::from_uuid(row.try_get("event_id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        participant_name: row.try_get("participant_name")?,
        participant_email: row.try_get("participant_email")?,
        participant_phone: row.try_get("participant_phone")?,
        status: RegistrationStatus::parse(&status)?,
        registration_date: row.try_get("registration_date")?,
        notes: row.try_get("notes")?,
    })
}

impl CapacityStore for PostgresStore {
    fn create_event(&self, event: Event) -> BoxFuture<'_, Result<Event>> {
        Box::pin(async move {
            let max = event
                .max_participants
                .map(|m| to_i32(m, "max_participants"))
                .transpose()?;

            sqlx::query(
                r"
                INSERT INTO events (
                    id, title, organizer_id, max_participants,
                    current_participants, is_active, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(*event.id.as_uuid())
            .bind(&event.title)
            .bind(*event.organizer_id.as_uuid())
            .bind(max)
            .bind(to_i32(event.current_participants, "current_participants")?)
            .bind(event.is_active)
            .bind(event.created_at)
            .execute(&self.pool)
            .await?;

            Ok(event)
        })
    }

    fn get_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<Event>>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(*event_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(row_to_event).transpose()
        })
    }

    fn list_events_by_organizer(&self, organizer_id: UserId) -> BoxFuture<'_, Result<Vec<Event>>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE organizer_id = $1 ORDER BY created_at DESC"
            ))
            .bind(*organizer_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(row_to_event).collect()
        })
    }

    fn list_events(&self) -> BoxFuture<'_, Result<Vec<Event>>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at"))
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(row_to_event).collect()
        })
    }

    fn deactivate_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Event>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "UPDATE events SET is_active = FALSE WHERE id = $1 RETURNING {EVENT_COLUMNS}"
            ))
            .bind(*event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref()
                .map(row_to_event)
                .transpose()?
                .ok_or_else(|| RegistrationError::event_not_found(event_id))
        })
    }

    fn reserve(&self, event_id: EventId) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            Self::reserve_on(&mut conn, event_id).await
        })
    }

    fn release(&self, event_id: EventId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            Self::release_on(&mut conn, event_id).await
        })
    }

    fn correct_participants(
        &self,
        event_id: EventId,
        expected: u32,
        actual: u32,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE events
                SET current_participants = $3
                WHERE id = $1 AND current_participants = $2
                ",
            )
            .bind(*event_id.as_uuid())
            .bind(to_i32(expected, "current_participants")?)
            .bind(to_i32(actual, "current_participants")?)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return match self.get_event(event_id).await? {
                    Some(_) => Ok(false),
                    None => Err(RegistrationError::event_not_found(event_id)),
                };
            }
            Ok(expected != actual)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }
}

impl RegistrationRepository for PostgresStore {
    fn insert(&self, registration: Registration) -> BoxFuture<'_, Result<Registration>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            Self::insert_on(&mut conn, &registration).await?;
            Ok(registration)
        })
    }

    fn find(&self, id: RegistrationId) -> BoxFuture<'_, Result<Option<Registration>>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(row_to_registration).transpose()
        })
    }

    fn find_active(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Option<Registration>>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations \
                 WHERE event_id = $1 AND user_id = $2 AND status IN ('CONFIRMED', 'PENDING')"
            ))
            .bind(*event_id.as_uuid())
            .bind(*user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(row_to_registration).transpose()
        })
    }

    fn cancel(&self, id: RegistrationId) -> BoxFuture<'_, Result<Option<RegistrationStatus>>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let registration = Self::find_for_update(&mut tx, id)
                .await?
                .ok_or_else(|| RegistrationError::registration_not_found(id))?;

            if registration.status == RegistrationStatus::Cancelled {
                tx.commit().await?;
                return Ok(None);
            }

            Self::mark_cancelled(&mut tx, id).await?;
            tx.commit().await?;
            Ok(Some(registration.status))
        })
    }

    fn list_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Registration>>> {
        Box::pin(async move { self.query_registrations("user_id", *user_id.as_uuid()).await })
    }

    fn list_by_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Vec<Registration>>> {
        Box::pin(async move { self.query_registrations("event_id", *event_id.as_uuid()).await })
    }

    fn count_by_status(&self, event_id: EventId) -> BoxFuture<'_, Result<StatusCounts>> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT status, COUNT(*) FROM registrations WHERE event_id = $1 GROUP BY status",
            )
            .bind(*event_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

            let mut counts = StatusCounts::default();
            for (status, count) in rows {
                let count = u32::try_from(count).map_err(|_| {
                    RegistrationError::Storage(format!("registration count {count} out of range"))
                })?;
                counts.add(RegistrationStatus::parse(&status)?, count);
            }
            Ok(counts)
        })
    }
}

impl Coordinator for PostgresStore {
    fn admit(&self, admission: Admission) -> BoxFuture<'_, Result<Registration>> {
        Box::pin(async move {
            // Dropping `tx` on any early return rolls the reservation back
            let mut tx = self.pool.begin().await?;

            let existing: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM registrations \
                 WHERE event_id = $1 AND user_id = $2 AND status IN ('CONFIRMED', 'PENDING')",
            )
            .bind(*admission.event_id.as_uuid())
            .bind(*admission.user_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
            if existing.is_some() {
                return Err(admission.duplicate());
            }

            let reservation = Self::reserve_on(&mut tx, admission.event_id).await?;
            let registration = admission.registration_for(reservation)?;
            Self::insert_on(&mut tx, &registration).await?;

            tx.commit().await?;
            Ok(registration)
        })
    }

    fn withdraw(&self, withdrawal: Withdrawal) -> BoxFuture<'_, Result<Cancellation>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let mut registration = Self::find_for_update(&mut tx, withdrawal.registration_id)
                .await?
                .ok_or_else(|| {
                    RegistrationError::registration_not_found(withdrawal.registration_id)
                })?;

            authorize_cancel(&withdrawal.actor, &registration)?;

            let prior = registration.status;
            if prior == RegistrationStatus::Cancelled {
                tx.commit().await?;
                return Ok(Cancellation {
                    registration,
                    released: false,
                });
            }

            Self::mark_cancelled(&mut tx, registration.id).await?;
            let released = prior.holds_slot();
            if released {
                Self::release_on(&mut tx, registration.event_id).await?;
            }
            tx.commit().await?;

            registration.status = RegistrationStatus::Cancelled;
            Ok(Cancellation {
                registration,
                released,
            })
        })
    }

    fn reconcile(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<Correction>>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            // Admissions and releases hold this row lock until they commit
            let row: Option<(Option<i32>, i32)> = sqlx::query_as(
                "SELECT max_participants, current_participants FROM events WHERE id = $1 FOR UPDATE",
            )
            .bind(*event_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
            let (max, current) = row.ok_or_else(|| RegistrationError::event_not_found(event_id))?;
            let max = max.map(|m| to_u32(m, "max_participants")).transpose()?;
            let current = to_u32(current, "current_participants")?;

            let (confirmed,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status = 'CONFIRMED'",
            )
            .bind(*event_id.as_uuid())
            .fetch_one(&mut *tx)
            .await?;
            let confirmed = u32::try_from(confirmed).map_err(|_| {
                RegistrationError::Storage(format!("registration count {confirmed} out of range"))
            })?;

            let target = settled_count(event_id, max, confirmed);
            if target == current {
                tx.commit().await?;
                return Ok(None);
            }

            sqlx::query("UPDATE events SET current_participants = $2 WHERE id = $1")
                .bind(*event_id.as_uuid())
                .bind(to_i32(target, "current_participants")?)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(Some(Correction {
                event_id,
                from: current,
                to: target,
            }))
        })
    }
}
