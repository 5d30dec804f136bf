//! # Rollcall Testing
//!
//! Testing utilities and helpers for Rollcall reducers.
//!
//! This crate provides:
//! - Deterministic clocks for the `Clock` environment trait
//! - A Given-When-Then harness for reducers
//! - Effect assertions and a helper that resolves effects into the actions they produce
//!
//! ## Example
//!
//! ```ignore
//! use rollcall_testing::{test_clock, ReducerTest};
//!
//! ReducerTest::new(LedgerReducer)
//!     .with_env(test_environment())
//!     .given_state(LedgerState::default())
//!     .when_action(LedgerAction::Register { .. })
//!     .then_state(|s| assert_eq!(s.in_flight_count(), 1))
//!     .run();
//! ```

use chrono::{DateTime, Duration, Utc};
use rollcall_core::environment::Clock;
use std::sync::Mutex;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Mutex, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use rollcall_testing::mocks::FixedClock;
    /// use rollcall_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every read.
    ///
    /// Registrations taken through it get strictly increasing timestamps, so
    /// ordering by registration date is deterministic.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` after each read
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = match self.next.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which never happens.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Given-When-Then harness for reducers
pub mod reducer_test;

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock, SteppingClock};
pub use reducer_test::{assertions, resolve_effects, ReducerTest};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_stepping_clock_advances() {
        let start = test_clock().now();
        let clock = SteppingClock::new(start, Duration::seconds(1));

        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start + Duration::seconds(1));
        assert!(clock.now() > start + Duration::seconds(1));
    }
}
