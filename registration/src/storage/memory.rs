//! In-memory storage backend.
//!
//! Each event lives behind its own `Mutex`, held only for the
//! check-and-increment, so reserves on one event serialize while other
//! events proceed. The event map itself is behind a `RwLock` that is taken
//! for writing only when an event is created.
//!
//! Registrations sit in one table with an index of active `(event, user)`
//! pairs; inserting under the table's write lock is what makes the
//! one-active-registration rule hold under concurrency.

use crate::capacity::CapacityStore;
use crate::error::{RegistrationError, Result};
use crate::storage::RegistrationRepository;
use crate::types::{
    AvailableSlots, Event, EventId, Registration, RegistrationId, RegistrationStatus, Reservation,
    StatusCounts, UserId,
};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct RegistrationTable {
    rows: HashMap<RegistrationId, Registration>,
    active: HashMap<(EventId, UserId), RegistrationId>,
}

/// In-memory implementation of [`CapacityStore`] and [`RegistrationRepository`].
#[derive(Default)]
pub struct InMemoryStore {
    events: RwLock<HashMap<EventId, Arc<Mutex<Event>>>>,
    registrations: RwLock<RegistrationTable>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn event_slot(&self, event_id: EventId) -> Result<Arc<Mutex<Event>>> {
        self.events
            .read()
            .await
            .get(&event_id)
            .cloned()
            .ok_or_else(|| RegistrationError::event_not_found(event_id))
    }

    async fn snapshot_events(&self) -> Vec<Event> {
        let slots: Vec<_> = self.events.read().await.values().cloned().collect();
        let mut events = Vec::with_capacity(slots.len());
        for slot in slots {
            events.push(slot.lock().await.clone());
        }
        events
    }

    async fn select<F>(&self, filter: F) -> Vec<Registration>
    where
        F: Fn(&Registration) -> bool + Send,
    {
        let table = self.registrations.read().await;
        let mut rows: Vec<_> = table.rows.values().filter(|r| filter(r)).cloned().collect();
        rows.sort_by_key(|r| (r.registration_date, r.id));
        rows
    }
}

impl CapacityStore for InMemoryStore {
    fn create_event(&self, event: Event) -> BoxFuture<'_, Result<Event>> {
        Box::pin(async move {
            let mut events = self.events.write().await;
            if events.contains_key(&event.id) {
                return Err(RegistrationError::Storage(format!(
                    "event {} already exists",
                    event.id
                )));
            }
            events.insert(event.id, Arc::new(Mutex::new(event.clone())));
            Ok(event)
        })
    }

    fn get_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<Event>>> {
        Box::pin(async move {
            let slot = self.events.read().await.get(&event_id).cloned();
            match slot {
                Some(slot) => Ok(Some(slot.lock().await.clone())),
                None => Ok(None),
            }
        })
    }

    fn list_events_by_organizer(&self, organizer_id: UserId) -> BoxFuture<'_, Result<Vec<Event>>> {
        Box::pin(async move {
            let mut events: Vec<_> = self
                .snapshot_events()
                .await
                .into_iter()
                .filter(|e| e.organizer_id == organizer_id)
                .collect();
            events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(events)
        })
    }

    fn list_events(&self) -> BoxFuture<'_, Result<Vec<Event>>> {
        Box::pin(async move { Ok(self.snapshot_events().await) })
    }

    fn deactivate_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Event>> {
        Box::pin(async move {
            let slot = self.event_slot(event_id).await?;
            let mut event = slot.lock().await;
            event.is_active = false;
            Ok(event.clone())
        })
    }

    fn reserve(&self, event_id: EventId) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(async move {
            let slot = self.event_slot(event_id).await?;
            let mut event = slot.lock().await;

            if !event.is_active {
                return Err(RegistrationError::event_not_found(event_id));
            }
            if !event.has_free_slot() {
                return Ok(Reservation::Waitlisted);
            }
            event.current_participants =
                event.current_participants.checked_add(1).ok_or_else(|| {
                    RegistrationError::Storage(format!(
                        "participant counter overflow on event {event_id}"
                    ))
                })?;
            Ok(Reservation::Granted)
        })
    }

    fn release(&self, event_id: EventId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let slot = self.event_slot(event_id).await?;
            let mut event = slot.lock().await;
            event.current_participants = event.current_participants.saturating_sub(1);
            Ok(())
        })
    }

    fn available_slots(&self, event_id: EventId) -> BoxFuture<'_, Result<AvailableSlots>> {
        Box::pin(async move {
            let slot = self.event_slot(event_id).await?;
            let event = slot.lock().await;
            Ok(event.available_slots())
        })
    }

    fn correct_participants(
        &self,
        event_id: EventId,
        expected: u32,
        actual: u32,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let slot = self.event_slot(event_id).await?;
            let mut event = slot.lock().await;
            if event.current_participants != expected {
                return Ok(false);
            }
            event.current_participants = actual;
            Ok(expected != actual)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl RegistrationRepository for InMemoryStore {
    fn insert(&self, registration: Registration) -> BoxFuture<'_, Result<Registration>> {
        Box::pin(async move {
            let mut table = self.registrations.write().await;
            let pair = (registration.event_id, registration.user_id);

            if registration.status.is_active() {
                if table.active.contains_key(&pair) {
                    return Err(RegistrationError::DuplicateRegistration {
                        event_id: pair.0,
                        user_id: pair.1,
                    });
                }
                table.active.insert(pair, registration.id);
            }
            table.rows.insert(registration.id, registration.clone());
            Ok(registration)
        })
    }

    fn find(&self, id: RegistrationId) -> BoxFuture<'_, Result<Option<Registration>>> {
        Box::pin(async move { Ok(self.registrations.read().await.rows.get(&id).cloned()) })
    }

    fn find_active(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Option<Registration>>> {
        Box::pin(async move {
            let table = self.registrations.read().await;
            Ok(table
                .active
                .get(&(event_id, user_id))
                .and_then(|id| table.rows.get(id))
                .cloned())
        })
    }

    fn cancel(&self, id: RegistrationId) -> BoxFuture<'_, Result<Option<RegistrationStatus>>> {
        Box::pin(async move {
            let mut table = self.registrations.write().await;
            let row = table
                .rows
                .get_mut(&id)
                .ok_or_else(|| RegistrationError::registration_not_found(id))?;

            let prior = row.status;
            if prior == RegistrationStatus::Cancelled {
                return Ok(None);
            }
            row.status = RegistrationStatus::Cancelled;
            let pair = (row.event_id, row.user_id);

            if prior.is_active() {
                table.active.remove(&pair);
            }
            Ok(Some(prior))
        })
    }

    fn list_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Registration>>> {
        Box::pin(async move { Ok(self.select(|r| r.user_id == user_id).await) })
    }

    fn list_by_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Vec<Registration>>> {
        Box::pin(async move { Ok(self.select(|r| r.event_id == event_id).await) })
    }

    fn count_by_status(&self, event_id: EventId) -> BoxFuture<'_, Result<StatusCounts>> {
        Box::pin(async move {
            let table = self.registrations.read().await;
            let mut counts = StatusCounts::default();
            for row in table.rows.values().filter(|r| r.event_id == event_id) {
                counts.record(row.status);
            }
            Ok(counts)
        })
    }
}
