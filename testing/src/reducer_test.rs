//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use oracle_relay_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Type alias for rejection assertion functions
type RejectionAssertion<Err> = Box<dyn FnOnce(&Err)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// State assertions run whether or not the action was accepted, so a rejection test
/// can also check that nothing changed.
///
/// # Example
///
/// ```ignore
/// use oracle_relay_testing::ReducerTest;
///
/// ReducerTest::new(OracleReducer::default())
///     .with_env(test_environment())
///     .given_state(OracleState::default())
///     .when_action(OracleAction::Fulfill { request_id, response, err })
///     .then_rejected(|error| {
///         assert_eq!(error, &OracleError::UnknownRequest(request_id));
///     })
///     .then_state(|state| {
///         assert!(state.registry.is_empty());
///     })
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    effect_assertions: Vec<EffectAssertion<R::Action>>,
    rejection_assertion: Option<RejectionAssertion<R::Error>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::Error: std::fmt::Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
            rejection_assertion: None,
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<R::Action>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the action to be rejected, and check the error (Then)
    #[must_use]
    pub fn then_rejected<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Error) + 'static,
    {
        self.rejection_assertion = Some(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set, if the action is
    /// rejected without `then_rejected` (or accepted with it), or if any assertion
    /// fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let result = self.reducer.reduce(&mut state, action, &env);

        match (result, self.rejection_assertion) {
            (Ok(effects), None) => {
                for assertion in self.effect_assertions {
                    assertion(&effects);
                }
            },
            (Err(error), Some(assertion)) => assertion(&error),
            (Ok(_), Some(_)) => panic!("Expected the action to be rejected, but it was accepted"),
            (Err(error), None) => panic!("Action was rejected unexpectedly: {error:?}"),
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use oracle_relay_core::effect::Effect;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert that effects contain at least one Delay effect
    ///
    /// # Panics
    ///
    /// Panics if no Delay effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_delay_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Delay { .. })),
            "Expected at least one Delay effect, but none found"
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
    use oracle_relay_core::effect::Effects;
    use oracle_relay_core::smallvec;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum GateAction {
        Open,
        Close,
    }

    #[derive(Debug, PartialEq)]
    struct AlreadyOpen;

    struct GateReducer;

    impl Reducer for GateReducer {
        type State = bool;
        type Action = GateAction;
        type Environment = ();
        type Error = AlreadyOpen;

        fn reduce(
            &self,
            open: &mut bool,
            action: GateAction,
            _env: &(),
        ) -> Result<Effects<GateAction>, AlreadyOpen> {
            match action {
                GateAction::Open if *open => Err(AlreadyOpen),
                GateAction::Open => {
                    *open = true;
                    Ok(smallvec![Effect::Delay {
                        duration: Duration::from_secs(5),
                        action: Box::new(GateAction::Close),
                    }])
                },
                GateAction::Close => {
                    *open = false;
                    Ok(smallvec![Effect::None])
                },
            }
        }
    }

    #[test]
    fn test_accepted_action() {
        ReducerTest::new(GateReducer)
            .with_env(())
            .given_state(false)
            .when_action(GateAction::Open)
            .then_state(|open| assert!(*open))
            .then_effects(assertions::assert_has_delay_effect)
            .run();
    }

    #[test]
    fn test_rejected_action_keeps_state() {
        ReducerTest::new(GateReducer)
            .with_env(())
            .given_state(true)
            .when_action(GateAction::Open)
            .then_rejected(|error| assert_eq!(error, &AlreadyOpen))
            .then_state(|open| assert!(*open))
            .run();
    }

    #[test]
    fn test_no_effects_assertion() {
        ReducerTest::new(GateReducer)
            .with_env(())
            .given_state(true)
            .when_action(GateAction::Close)
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
