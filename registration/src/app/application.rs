//! Application wiring and lifecycle.
//!
//! On shutdown (Ctrl+C or SIGTERM):
//! 1. The HTTP server stops accepting connections and drains
//! 2. The reconciler is told to stop
//! 3. The ledger store waits for in-flight effects

use super::backend::Backend;
use super::services::{EventService, LedgerStore, RegistrationService};
use crate::aggregates::{LedgerEnvironment, LedgerReducer, LedgerState};
use crate::config::Config;
use crate::error::StartupError;
use crate::notifications::{LoggingNotifier, Notifier};
use crate::reconcile::Reconciler;
use crate::server::{build_router, AppState};
use axum::Router;
use rollcall_core::environment::{Clock, SystemClock};
use rollcall_runtime::StoreConfig;
use std::sync::Arc;
use tokio::sync::watch;

/// The registration service with its storage, ledger, and background jobs.
pub struct RegistrationApp {
    config: Config,
    ledger: Arc<LedgerStore>,
    registrations: RegistrationService,
    events: EventService,
    reconciler: Reconciler,
}

impl RegistrationApp {
    /// Connect the configured backend and build the application.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupError`] if the backend cannot be reached.
    pub async fn from_config(config: Config) -> Result<Self, StartupError> {
        let backend = Backend::connect(&config.storage).await?;
        Ok(Self::new(
            config,
            backend,
            Arc::new(LoggingNotifier::new()),
            Arc::new(SystemClock),
        ))
    }

    /// Build the application on an already connected backend.
    #[must_use]
    pub fn new(
        config: Config,
        backend: Backend,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let capacity = backend.capacity();
        let registrations = backend.registrations();
        let coordinator = backend.coordinator();

        let ledger = Arc::new(LedgerStore::with_config(
            LedgerState::new(),
            LedgerReducer::new(),
            LedgerEnvironment::new(Arc::clone(&coordinator), notifier, Arc::clone(&clock)),
            StoreConfig::default()
                .with_broadcast_capacity(config.registration.action_broadcast_capacity)
                .with_shutdown_timeout(config.server.shutdown_timeout()),
        ));

        let registration_service = RegistrationService::new(
            Arc::clone(&ledger),
            Arc::clone(&capacity),
            Arc::clone(&registrations),
            config.registration.capacity_policy,
            config.registration.request_timeout(),
        );
        let events = EventService::new(Arc::clone(&capacity), clock);
        let reconciler = Reconciler::new(capacity, coordinator);

        Self {
            config,
            ledger,
            registrations: registration_service,
            events,
            reconciler,
        }
    }

    /// HTTP router for this application
    pub fn router(&self) -> Router {
        build_router(AppState::new(
            self.registrations.clone(),
            self.events.clone(),
        ))
    }

    /// Registration operations
    #[must_use]
    pub const fn registrations(&self) -> &RegistrationService {
        &self.registrations
    }

    /// Event administration
    #[must_use]
    pub const fn events(&self) -> &EventService {
        &self.events
    }

    /// Counter reconciliation
    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// The ledger store
    #[must_use]
    pub const fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    /// Configuration in effect
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Serve HTTP until a shutdown signal arrives, then shut down in order.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::Io`] if the listener cannot bind or serving fails.
    pub async fn run(self) -> Result<(), StartupError> {
        let listener = tokio::net::TcpListener::bind(self.config.server.bind_addr()).await?;
        tracing::info!(addr = %listener.local_addr()?, "Registration server listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconciler = self.config.reconciliation.enabled.then(|| {
            self.reconciler
                .clone()
                .spawn(self.config.reconciliation.interval(), shutdown_rx)
        });

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("HTTP server stopped, shutting down");

        // Receivers may already be gone if the reconciler is disabled
        let _ = shutdown_tx.send(true);
        if let Some(handle) = reconciler {
            if let Err(error) = handle.await {
                tracing::warn!(error = %error, "Reconciler task ended abnormally");
            }
        }

        match self.ledger.shutdown_default().await {
            Ok(()) => tracing::info!("Ledger drained"),
            Err(error) => tracing::warn!(error = %error, "Ledger shutdown incomplete"),
        }
        Ok(())
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(error = %error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(error) => {
                tracing::error!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
