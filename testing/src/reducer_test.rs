//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use rollcall_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use rollcall_testing::ReducerTest;
///
/// ReducerTest::new(LedgerReducer)
///     .with_env(test_environment())
///     .given_state(LedgerState::default())
///     .when_action(LedgerAction::Cancel { .. })
///     .then_state(|state| assert_eq!(state.in_flight_count(), 1))
///     .then_effects(assertions::assert_has_future_effect)
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to apply (When)
    ///
    /// Actions are applied in order. Effect assertions see only the effects
    /// of the last action.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, actions, or environment are not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Run effects to completion and collect the actions they feed back.
///
/// Futures are awaited one at a time in declaration order, so the result is
/// deterministic.
pub async fn resolve_effects<A, I>(effects: I) -> Vec<A>
where
    I: IntoIterator<Item = Effect<A>>,
{
    let mut actions = Vec::new();
    for effect in effects {
        if let Effect::Future(fut) = effect {
            if let Some(action) = fut.await {
                actions.push(action);
            }
        }
    }
    actions
}

/// Helper assertions for effects
pub mod assertions {
    use rollcall_core::effect::Effect;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(|e| matches!(e, Effect::None)),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{async_effect, smallvec, SmallVec};

    #[derive(Clone, Debug)]
    struct SeatState {
        taken: u32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum SeatAction {
        Take,
        Release,
        Confirm { seat: u32 },
        Expire,
    }

    struct SeatReducer;

    struct SeatEnv;

    impl Reducer for SeatReducer {
        type State = SeatState;
        type Action = SeatAction;
        type Environment = SeatEnv;

        fn reduce(
            &self,
            state: &mut SeatState,
            action: SeatAction,
            _env: &SeatEnv,
        ) -> SmallVec<[Effect<SeatAction>; 4]> {
            match action {
                SeatAction::Take => {
                    state.taken += 1;
                    let seat = state.taken;
                    smallvec![
                        async_effect! { Some(SeatAction::Confirm { seat }) },
                        async_effect! { Some(SeatAction::Expire) }
                    ]
                },
                SeatAction::Release => {
                    state.taken = state.taken.saturating_sub(1);
                    smallvec![Effect::None]
                },
                SeatAction::Confirm { .. } | SeatAction::Expire => SmallVec::new(),
            }
        }
    }

    #[test]
    fn test_take_then_release() {
        ReducerTest::new(SeatReducer)
            .with_env(SeatEnv)
            .given_state(SeatState { taken: 0 })
            .when_action(SeatAction::Take)
            .when_action(SeatAction::Release)
            .then_state(|state| assert_eq!(state.taken, 0))
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn test_take_schedules_confirmation_and_expiry() {
        ReducerTest::new(SeatReducer)
            .with_env(SeatEnv)
            .given_state(SeatState { taken: 2 })
            .when_action(SeatAction::Take)
            .then_state(|state| assert_eq!(state.taken, 3))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_release_never_underflows() {
        ReducerTest::new(SeatReducer)
            .with_env(SeatEnv)
            .given_state(SeatState { taken: 0 })
            .when_action(SeatAction::Release)
            .then_state(|state| assert_eq!(state.taken, 0))
            .run();
    }

    #[test]
    fn test_resolve_effects_preserves_order() {
        let mut state = SeatState { taken: 0 };
        let effects = SeatReducer.reduce(&mut state, SeatAction::Take, &SeatEnv);

        let actions = tokio_test::block_on(resolve_effects(effects));
        assert_eq!(actions, vec![SeatAction::Confirm { seat: 1 }, SeatAction::Expire]);
    }

    #[tokio::test]
    async fn test_resolve_skips_silent_effects() {
        let effects = vec![
            Effect::None,
            async_effect! { Some(SeatAction::Release) },
            async_effect! { None },
        ];

        assert_eq!(resolve_effects(effects).await, vec![SeatAction::Release]);
    }
}
