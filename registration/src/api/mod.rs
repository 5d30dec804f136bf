//! HTTP API handlers.

pub mod actor;
pub mod error;
pub mod events;
pub mod registrations;

pub use error::AppError;
