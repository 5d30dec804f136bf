//! Aggregate reducers for event registration.
//!
//! - Ledger: registration and cancellation commands, correlated outcomes

pub mod ledger;

pub use ledger::{LedgerAction, LedgerEnvironment, LedgerReducer, LedgerState};
