//! Application layer - wires storage, the ledger store, and services.
//!
//! - Backend: storage selection and the coordination boundary it provides
//! - Services: registration and event operations called by the HTTP layer
//! - Application: construction, serving, and ordered shutdown

mod application;
mod backend;
mod services;

pub use application::RegistrationApp;
pub use backend::Backend;
pub use services::{EventService, LedgerStore, RegistrationService};
