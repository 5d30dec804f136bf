//! Capacity counter reconciliation.
//!
//! `current_participants` is a cached count of CONFIRMED registrations. A
//! crash between reserve and insert, or a failed compensating release, can
//! leave it drifted. The [`Reconciler`] walks every event and asks the
//! [`Coordinator`] to recount it. The coordinator takes the count and writes
//! the counter while no admission or cancellation for that event is
//! part-way through, so a reservation whose registration is still being
//! written is never mistaken for drift.

use crate::capacity::CapacityStore;
use crate::coordination::Coordinator;
use crate::error::Result;
use crate::types::Event;
use rollcall_runtime::metrics::CoordinationMetrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Result of one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Events inspected
    pub events_checked: usize,
    /// Counters overwritten
    pub corrected: usize,
}

/// Recomputes capacity counters from CONFIRMED registrations.
#[derive(Clone)]
pub struct Reconciler {
    capacity: Arc<dyn CapacityStore>,
    coordinator: Arc<dyn Coordinator>,
}

impl Reconciler {
    /// Creates a new `Reconciler`.
    ///
    /// `coordinator` must be the instance that admits and cancels for the
    /// same events.
    #[must_use]
    pub fn new(capacity: Arc<dyn CapacityStore>, coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            capacity,
            coordinator,
        }
    }

    /// Run a single pass over every event.
    ///
    /// # Errors
    ///
    /// Returns a storage error if events cannot be listed. Failures on a
    /// single event are logged and skipped.
    #[tracing::instrument(skip(self), name = "reconcile")]
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let events = self.capacity.list_events().await?;
        let mut report = ReconcileReport {
            events_checked: events.len(),
            corrected: 0,
        };

        for event in &events {
            match self.reconcile_event(event).await {
                Ok(true) => report.corrected += 1,
                Ok(false) => {},
                Err(error) => {
                    tracing::warn!(event_id = %event.id, error = %error, "Skipping event");
                },
            }
        }

        CoordinationMetrics::record_reconciled(report.corrected);
        if report.corrected > 0 {
            tracing::warn!(
                events_checked = report.events_checked,
                corrected = report.corrected,
                "Corrected drifted participant counters"
            );
        } else {
            tracing::debug!(events_checked = report.events_checked, "Counters consistent");
        }
        Ok(report)
    }

    async fn reconcile_event(&self, event: &Event) -> Result<bool> {
        match self.coordinator.reconcile(event.id).await? {
            Some(correction) => {
                tracing::info!(
                    event_id = %correction.event_id,
                    from = correction.from,
                    to = correction.to,
                    "Participant counter corrected"
                );
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Run a pass every `every` until `shutdown` turns `true`.
    ///
    /// The first pass runs after one full interval.
    #[must_use]
    pub fn spawn(self, every: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_secs = every.as_secs(), "Reconciler started");
            while !*shutdown.borrow() {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = self.run_once().await {
                            tracing::error!(error = %error, "Reconciliation pass failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Reconciler stopped");
        })
    }
}
