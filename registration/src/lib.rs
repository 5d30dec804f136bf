//! # Registration
//!
//! Capacity-bounded event registration.
//!
//! Events own their capacity (`max_participants`, `current_participants`);
//! registrations own attendance records. The two are kept in agreement:
//! a CONFIRMED registration always holds exactly one reserved slot, and a
//! reserved slot always belongs to a CONFIRMED registration.
//!
//! ## Layout
//!
//! - [`types`] / [`error`]: domain records and the error taxonomy
//! - [`capacity`] / [`storage`]: the capacity store and registration ledger
//!   traits, with in-memory and `PostgreSQL` backends
//! - [`coordination`]: reserve-and-record as one logical operation
//! - [`aggregates`]: the ledger reducer run by the `rollcall` store
//! - [`reconcile`]: periodic counter repair
//! - [`export`]: CSV rendering of an event's registrations
//! - [`app`], [`api`], [`server`]: services, HTTP handlers and routing

pub mod aggregates;
pub mod api;
pub mod app;
pub mod capacity;
pub mod config;
pub mod coordination;
pub mod error;
pub mod export;
pub mod notifications;
pub mod reconcile;
pub mod server;
pub mod storage;
pub mod types;

pub use app::{Backend, EventService, RegistrationApp, RegistrationService};
pub use capacity::CapacityStore;
pub use config::Config;
pub use coordination::{Coordinator, SagaCoordinator};
pub use error::{RegistrationError, Result, StartupError};
pub use storage::{InMemoryStore, PostgresStore, RegistrationRepository};
