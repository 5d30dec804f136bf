//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for:
//! - Store command and effect execution
//! - Registration outcomes (admitted, rejected, cancelled)
//! - Coordination compensations and capacity reconciliation
//!
//! # Example
//!
//! ```rust,no_run
//! use rollcall_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` from the scrape endpoint
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder plus the address its scrape endpoint binds to.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint binds to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should bind to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe all metrics and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// A recorder that is already installed (common in tests) is not an error;
    /// the server then has no handle and [`MetricsServer::render`] returns `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - scrape at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store
    describe_counter!("store.commands.total", "Total number of actions sent to stores");
    describe_counter!("store.effects.executed", "Total number of effects executed, by type");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside reducers"
    );
    describe_counter!("store.shutdown.initiated", "Graceful shutdowns started");
    describe_counter!("store.shutdown.completed", "Graceful shutdowns that drained all effects");
    describe_counter!("store.shutdown.timeout", "Graceful shutdowns that timed out");
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );

    // Registration
    describe_counter!(
        "registration.registered",
        "Registrations recorded, by resulting status"
    );
    describe_counter!(
        "registration.rejected",
        "Registration attempts rejected, by error code"
    );
    describe_counter!("registration.cancelled", "Registrations cancelled");
    describe_histogram!(
        "registration.admission.duration_seconds",
        "Time taken to reserve capacity and record a registration"
    );

    // Coordination
    describe_counter!(
        "registration.compensations",
        "Capacity reservations released after a failed ledger write"
    );
    describe_counter!(
        "registration.reconciled",
        "Events whose participant count was corrected by reconciliation"
    );
    describe_gauge!(
        "registration.in_flight",
        "Registration commands awaiting their outcome"
    );
}

/// Registration metrics recorder.
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    /// Record a registration written to the ledger.
    pub fn record_registered(status: &'static str, duration: Duration) {
        counter!("registration.registered", "status" => status).increment(1);
        histogram!("registration.admission.duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a rejected registration attempt.
    pub fn record_rejected(code: &'static str) {
        counter!("registration.rejected", "code" => code).increment(1);
    }

    /// Record a cancellation.
    pub fn record_cancelled() {
        counter!("registration.cancelled").increment(1);
    }

    /// Record the number of commands currently awaiting an outcome.
    #[allow(clippy::cast_precision_loss)] // in-flight counts stay far below 2^52
    pub fn record_in_flight(count: usize) {
        gauge!("registration.in_flight").set(count as f64);
    }
}

/// Coordination metrics recorder.
pub struct CoordinationMetrics;

impl CoordinationMetrics {
    /// Record a compensating capacity release.
    pub fn record_compensation() {
        counter!("registration.compensations").increment(1);
    }

    /// Record events corrected by a reconciliation pass.
    pub fn record_reconciled(corrected: usize) {
        counter!("registration.reconciled").increment(corrected as u64);
    }
}
