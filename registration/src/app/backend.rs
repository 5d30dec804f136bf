//! Storage backend selection.

use crate::capacity::CapacityStore;
use crate::config::{StorageBackend, StorageConfig};
use crate::coordination::{Coordinator, SagaCoordinator};
use crate::error::StartupError;
use crate::storage::{InMemoryStore, PostgresStore, RegistrationRepository};
use std::sync::Arc;

/// A connected storage backend
#[derive(Clone)]
pub enum Backend {
    /// Single-process maps, coordinated by one shared saga
    Memory {
        /// Events and registrations
        store: Arc<InMemoryStore>,
        /// Admissions, cancellations and recounts go through this instance
        saga: Arc<SagaCoordinator>,
    },
    /// `PostgreSQL`, coordinated by one transaction per operation
    Postgres(Arc<PostgresStore>),
}

impl Backend {
    /// Fresh in-memory backend
    #[must_use]
    pub fn memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let saga = Arc::new(SagaCoordinator::new(store.clone(), store.clone()));
        Self::Memory { store, saga }
    }

    /// Connect the configured backend, running migrations for `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupError`] if the database is unreachable or a
    /// migration fails.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StartupError> {
        match config.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Ok(Self::memory())
            },
            StorageBackend::Postgres => {
                let store = PostgresStore::connect(&config.database).await?;
                store.migrate().await?;
                tracing::info!("Database migrations applied");
                Ok(Self::Postgres(Arc::new(store)))
            },
        }
    }

    /// Capacity side
    #[must_use]
    pub fn capacity(&self) -> Arc<dyn CapacityStore> {
        match self {
            Self::Memory { store, .. } => store.clone(),
            Self::Postgres(store) => store.clone(),
        }
    }

    /// Ledger side
    #[must_use]
    pub fn registrations(&self) -> Arc<dyn RegistrationRepository> {
        match self {
            Self::Memory { store, .. } => store.clone(),
            Self::Postgres(store) => store.clone(),
        }
    }

    /// Coordination boundary for this backend
    #[must_use]
    pub fn coordinator(&self) -> Arc<dyn Coordinator> {
        match self {
            Self::Memory { saga, .. } => saga.clone(),
            Self::Postgres(store) => store.clone(),
        }
    }
}
