//! Reducer for the oracle request lifecycle.

use crate::actions::OracleAction;
use crate::config::LifecycleSettings;
use crate::environment::OracleEnvironment;
use crate::state::OracleState;
use oracle_relay_core::effect::{Effect, Effects};
use oracle_relay_core::history::ArchivedRequest;
use oracle_relay_core::reducer::Reducer;
use oracle_relay_core::types::{HistoryEntry, LifecycleState};
use oracle_relay_core::{OracleError, smallvec};

/// Reducer tracking requests from send through fulfillment.
///
/// Every action is validated completely before the first mutation, so a rejected
/// action never leaves the registry, history, index and correlation table out of
/// step with each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleReducer {
    lifecycle: LifecycleSettings,
}

impl OracleReducer {
    /// Create a reducer with the given lifecycle policies.
    #[must_use]
    pub const fn new(lifecycle: LifecycleSettings) -> Self {
        Self { lifecycle }
    }

    /// Lifecycle policies in effect.
    #[must_use]
    pub const fn lifecycle(&self) -> &LifecycleSettings {
        &self.lifecycle
    }
}

impl Reducer for OracleReducer {
    type State = OracleState;
    type Action = OracleAction;
    type Environment = OracleEnvironment;
    type Error = OracleError;

    #[allow(clippy::too_many_lines)] // One arm per action, each short
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<Effects<Self::Action>, Self::Error> {
        match action {
            OracleAction::RequestSent {
                request_id,
                originator,
                lookup_key,
                secondary_key,
            } => {
                if lookup_key.is_empty() {
                    return Err(OracleError::EmptyKey);
                }

                let sent_at = env.clock().now();
                state.registry.create(request_id, sent_at)?;

                let position = state.history.append(HistoryEntry::pending(
                    request_id,
                    originator,
                    sent_at,
                    lookup_key.clone(),
                    secondary_key,
                ));
                state.index.index_new(lookup_key.clone(), position);
                state.correlations.correlate(request_id, lookup_key, position);

                match self.lifecycle.stale_after {
                    Some(duration) => Ok(smallvec![Effect::Delay {
                        duration,
                        action: Box::new(OracleAction::MarkStale { request_id }),
                    }]),
                    None => Ok(smallvec![Effect::None]),
                }
            },

            OracleAction::Fulfill {
                request_id,
                response,
                err,
            } => {
                // Both lookups are guarded: the registry and the correlation table are
                // queried independently and must agree.
                let position = state.correlations.resolve(&request_id)?.position;
                state
                    .registry
                    .check_fulfillable(&request_id, self.lifecycle.duplicate_fulfillment)?;
                if state.history.get(position).is_none() {
                    let error = OracleError::IndexOutOfRange {
                        position,
                        len: state.history.len(),
                    };
                    tracing::error!(%request_id, %error, "Correlation points outside history");
                    return Err(error);
                }

                let fulfilled_at = env.clock().now();
                let data = String::from_utf8_lossy(&response).into_owned();
                state.registry.fulfill(
                    &request_id,
                    response,
                    err,
                    fulfilled_at,
                    self.lifecycle.duplicate_fulfillment,
                )?;
                state.history.update(position, data, fulfilled_at)?;

                Ok(smallvec![Effect::None])
            },

            OracleAction::MarkStale { request_id } => {
                if state.registry.mark_stale(&request_id) {
                    tracing::debug!(%request_id, "Request marked stale");
                }
                Ok(smallvec![Effect::None])
            },

            OracleAction::SweepStale { max_age } => {
                let cutoff = chrono::Duration::from_std(max_age)
                    .ok()
                    .and_then(|age| env.clock().now().checked_sub_signed(age));

                if let Some(cutoff) = cutoff {
                    for request_id in state.registry.sent_before(cutoff) {
                        state.registry.mark_stale(&request_id);
                    }
                }
                Ok(smallvec![Effect::None])
            },

            OracleAction::Archive { older_than } => {
                let registry = &state.registry;
                let drained = state.history.drain_front_while(|_, entry| {
                    entry.timestamp < older_than
                        && registry
                            .lifecycle(&entry.request_id)
                            .is_some_and(LifecycleState::is_archivable)
                });

                if drained.is_empty() {
                    return Ok(smallvec![Effect::None]);
                }

                let mut batch = Vec::with_capacity(drained.len());
                for (position, entry) in drained {
                    let request_id = entry.request_id;
                    let status = state.registry.remove(&request_id).unwrap_or_default();
                    state.correlations.remove(&request_id);
                    state.index.remove_if_points_to(&entry.lookup_key, position);
                    batch.push(ArchivedRequest {
                        position,
                        entry,
                        status,
                    });
                }

                let sink = env.archive_sink();
                Ok(smallvec![Effect::Future(Box::pin(async move {
                    sink.archive(batch);
                    None::<OracleAction>
                }))])
            },

            OracleAction::UpdateSettings { settings } => {
                settings.validate()?;
                state.settings = settings;
                Ok(smallvec![Effect::None])
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use crate::config::RequestSettings;
    use chrono::{DateTime, Utc};
    use oracle_relay_core::environment::Clock;
    use oracle_relay_core::types::{DuplicateFulfillment, Originator, RequestId};
    use oracle_relay_testing::{FixedClock, MockTransport, ReducerTest, test_clock};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_env() -> OracleEnvironment {
        OracleEnvironment::new(Arc::new(test_clock()), Arc::new(MockTransport::new()))
    }

    fn env_at(time: DateTime<Utc>) -> OracleEnvironment {
        OracleEnvironment::new(Arc::new(FixedClock::new(time)), Arc::new(MockTransport::new()))
    }

    fn sent(request_id: RequestId, key: &str) -> OracleAction {
        OracleAction::RequestSent {
            request_id,
            originator: Originator::new("consumer"),
            lookup_key: key.to_string(),
            secondary_key: String::new(),
        }
    }

    fn fulfill(request_id: RequestId, response: &str) -> OracleAction {
        OracleAction::Fulfill {
            request_id,
            response: response.as_bytes().to_vec(),
            err: Vec::new(),
        }
    }

    fn state_with(requests: &[(RequestId, &str)]) -> OracleState {
        let reducer = OracleReducer::default();
        let env = test_env();
        let mut state = OracleState::default();
        for (id, key) in requests {
            reducer.reduce(&mut state, sent(*id, key), &env).unwrap();
        }
        state
    }

    #[test]
    fn test_request_sent_records_everywhere() {
        let id = RequestId::new();

        ReducerTest::new(OracleReducer::default())
            .with_env(test_env())
            .given_state(OracleState::default())
            .when_action(sent(id, "2025-01-19"))
            .then_state(move |state| {
                let status = state.status(&id);
                assert!(status.exists);
                assert!(!status.fulfilled);
                assert_eq!(status.sent_at, Some(test_clock().now()));

                let entry = state.entry_by_key("2025-01-19").unwrap();
                assert_eq!(entry.request_id, id);
                assert!(entry.data.is_empty());
                assert_eq!(state.correlations.resolve(&id).unwrap().position, 0);
            })
            .then_effects(|effects| {
                assert_eq!(effects.len(), 1);
                assert!(effects[0].is_none());
            })
            .run();
    }

    #[test]
    fn test_request_sent_rejects_empty_key() {
        ReducerTest::new(OracleReducer::default())
            .with_env(test_env())
            .given_state(OracleState::default())
            .when_action(sent(RequestId::new(), ""))
            .then_rejected(|error| assert_eq!(error, &OracleError::EmptyKey))
            .then_state(|state| {
                assert!(state.registry.is_empty());
                assert!(state.history.is_empty());
            })
            .run();
    }

    #[test]
    fn test_reused_identifier_changes_nothing() {
        let id = RequestId::new();
        let before = state_with(&[(id, "a")]);

        ReducerTest::new(OracleReducer::default())
            .with_env(test_env())
            .given_state(before.clone())
            .when_action(sent(id, "b"))
            .then_rejected(move |error| assert_eq!(error, &OracleError::DuplicateRequest(id)))
            .then_state(move |state| assert_eq!(state, &before))
            .run();
    }

    #[test]
    fn test_stale_timer_scheduled_when_configured() {
        let id = RequestId::new();
        let reducer = OracleReducer::new(LifecycleSettings {
            stale_after: Some(Duration::from_secs(300)),
            ..LifecycleSettings::default()
        });

        ReducerTest::new(reducer)
            .with_env(test_env())
            .given_state(OracleState::default())
            .when_action(sent(id, "k"))
            .then_effects(move |effects| match &effects[0] {
                Effect::Delay { duration, action } => {
                    assert_eq!(*duration, Duration::from_secs(300));
                    assert_eq!(**action, OracleAction::MarkStale { request_id: id });
                },
                other => panic!("expected delay, got {other:?}"),
            })
            .run();
    }

    #[test]
    fn test_fulfill_updates_registry_and_history() {
        let id = RequestId::new();
        let reducer = OracleReducer::default();
        let mut state = state_with(&[(id, "2025-01-19")]);

        let later = test_clock().now() + chrono::Duration::seconds(30);
        reducer
            .reduce(&mut state, fulfill(id, "4.123"), &env_at(later))
            .unwrap();

        let status = state.status(&id);
        assert!(status.fulfilled);
        assert_eq!(status.response, b"4.123");
        assert!(status.err.is_empty());

        let entry = state.entry_by_key("2025-01-19").unwrap();
        assert_eq!(entry.data, "4.123");
        assert_eq!(entry.timestamp, later);
        assert_eq!(state.last_fulfilled().unwrap().request_id, id);
    }

    #[test]
    fn test_fulfill_unknown_request_mutates_nothing() {
        let known = RequestId::new();
        let unknown = RequestId::new();
        let before = state_with(&[(known, "k")]);

        ReducerTest::new(OracleReducer::default())
            .with_env(test_env())
            .given_state(before.clone())
            .when_action(fulfill(unknown, "x"))
            .then_rejected(move |error| {
                assert_eq!(error, &OracleError::UnknownRequest(unknown));
            })
            .then_state(move |state| assert_eq!(state, &before))
            .run();
    }

    #[test]
    fn test_fulfill_requires_correlation_as_well_as_registry() {
        let id = RequestId::new();
        let mut state = OracleState::default();
        state.registry.create(id, test_clock().now()).unwrap();

        let result = OracleReducer::default().reduce(&mut state, fulfill(id, "x"), &test_env());

        assert!(matches!(result, Err(OracleError::UnknownRequest(_))));
        assert!(!state.status(&id).fulfilled);
    }

    #[test]
    fn test_fulfill_with_dangling_position_is_invariant_breach() {
        let id = RequestId::new();
        let mut state = OracleState::default();
        state.registry.create(id, test_clock().now()).unwrap();
        state.correlations.correlate(id, "k", 9);

        let error = OracleReducer::default()
            .reduce(&mut state, fulfill(id, "x"), &test_env())
            .unwrap_err();

        assert_eq!(error, OracleError::IndexOutOfRange { position: 9, len: 0 });
        assert!(error.is_invariant_breach());
        assert!(!state.status(&id).fulfilled);
    }

    #[test]
    fn test_duplicate_fulfillment_rejected_by_default() {
        let id = RequestId::new();
        let reducer = OracleReducer::default();
        let env = test_env();
        let mut state = state_with(&[(id, "k")]);
        reducer.reduce(&mut state, fulfill(id, "first"), &env).unwrap();

        let error = reducer
            .reduce(&mut state, fulfill(id, "second"), &env)
            .unwrap_err();

        assert_eq!(error, OracleError::AlreadyFulfilled(id));
        assert_eq!(state.status(&id).response, b"first");
        assert_eq!(state.entry_by_key("k").unwrap().data, "first");
    }

    #[test]
    fn test_duplicate_fulfillment_overwrites_when_allowed() {
        let id = RequestId::new();
        let reducer = OracleReducer::new(LifecycleSettings {
            duplicate_fulfillment: DuplicateFulfillment::Overwrite,
            ..LifecycleSettings::default()
        });
        let env = test_env();
        let mut state = state_with(&[(id, "k")]);
        reducer.reduce(&mut state, fulfill(id, "first"), &env).unwrap();
        reducer.reduce(&mut state, fulfill(id, "second"), &env).unwrap();

        assert_eq!(state.status(&id).response, b"second");
        assert_eq!(state.entry_by_key("k").unwrap().data, "second");
    }

    #[test]
    fn test_resubmitted_key_fulfills_its_own_entry() {
        let first = RequestId::new();
        let second = RequestId::new();
        let reducer = OracleReducer::default();
        let env = test_env();
        let mut state = state_with(&[(first, "2025-01-19"), (second, "2025-01-19")]);

        reducer.reduce(&mut state, fulfill(first, "old"), &env).unwrap();

        assert_eq!(state.history.get(0).unwrap().data, "old");
        assert!(state.history.get(1).unwrap().data.is_empty());
        assert_eq!(state.entry_by_key("2025-01-19").unwrap().request_id, second);
    }

    #[test]
    fn test_sweep_stale_uses_age_threshold() {
        let old = RequestId::new();
        let reducer = OracleReducer::default();
        let mut state = state_with(&[(old, "old")]);

        let later = test_clock().now() + chrono::Duration::seconds(600);
        let fresh = RequestId::new();
        reducer.reduce(&mut state, sent(fresh, "fresh"), &env_at(later)).unwrap();

        reducer
            .reduce(
                &mut state,
                OracleAction::SweepStale { max_age: Duration::from_secs(300) },
                &env_at(later),
            )
            .unwrap();

        assert_eq!(state.status(&old).lifecycle, Some(LifecycleState::Stale));
        assert!(!state.status(&old).fulfilled);
        assert_eq!(state.status(&fresh).lifecycle, Some(LifecycleState::Sent));
    }

    #[test]
    fn test_mark_stale_ignores_fulfilled_and_unknown() {
        let id = RequestId::new();
        let reducer = OracleReducer::default();
        let env = test_env();
        let mut state = state_with(&[(id, "k")]);
        reducer.reduce(&mut state, fulfill(id, "v"), &env).unwrap();

        reducer
            .reduce(&mut state, OracleAction::MarkStale { request_id: id }, &env)
            .unwrap();
        reducer
            .reduce(&mut state, OracleAction::MarkStale { request_id: RequestId::new() }, &env)
            .unwrap();

        assert_eq!(state.status(&id).lifecycle, Some(LifecycleState::Fulfilled));
    }

    #[test]
    fn test_archive_stops_at_pending_entry() {
        let done = RequestId::new();
        let pending = RequestId::new();
        let done_later = RequestId::new();
        let reducer = OracleReducer::default();
        let env = test_env();
        let mut state = state_with(&[(done, "a"), (pending, "b"), (done_later, "c")]);
        reducer.reduce(&mut state, fulfill(done, "1"), &env).unwrap();
        reducer.reduce(&mut state, fulfill(done_later, "3"), &env).unwrap();

        let cutoff = test_clock().now() + chrono::Duration::seconds(1);
        let effects = reducer
            .reduce(&mut state, OracleAction::Archive { older_than: cutoff }, &env)
            .unwrap();

        assert!(matches!(effects[0], Effect::Future(_)));
        assert_eq!(state.history.first_position(), 1);
        assert!(!state.status(&done).exists);
        assert!(state.correlations.resolve(&done).is_err());
        assert_eq!(
            state.entry_by_key("a"),
            Err(OracleError::UnknownKey("a".to_string()))
        );
        assert!(state.status(&pending).exists);
        assert!(state.status(&done_later).exists);
        assert_eq!(state.last_fulfilled().unwrap().request_id, done_later);
    }

    #[test]
    fn test_last_fulfilled_falls_back_to_retained_request_after_archive() {
        let first = RequestId::new();
        let pending = RequestId::new();
        let third = RequestId::new();
        let reducer = OracleReducer::default();
        let start = test_clock().now();
        let mut state = state_with(&[(first, "a"), (pending, "b"), (third, "c")]);

        reducer.reduce(&mut state, fulfill(third, "3"), &env_at(start)).unwrap();
        let later = start + chrono::Duration::seconds(10);
        reducer.reduce(&mut state, fulfill(first, "1"), &env_at(later)).unwrap();
        assert_eq!(state.last_fulfilled().unwrap().request_id, first);

        // Only the head entry goes; the pending one blocks the rest.
        let cutoff = later + chrono::Duration::seconds(1);
        reducer
            .reduce(&mut state, OracleAction::Archive { older_than: cutoff }, &env_at(later))
            .unwrap();
        assert!(!state.status(&first).exists);

        let view = state.last_fulfilled().unwrap();
        assert_eq!(view.request_id, third);
        assert_eq!(view.entry.data, "3");
        assert_eq!(view.position, 2);
    }

    #[test]
    fn test_archive_with_nothing_eligible_is_noop() {
        let id = RequestId::new();
        let before = state_with(&[(id, "k")]);

        ReducerTest::new(OracleReducer::default())
            .with_env(test_env())
            .given_state(before.clone())
            .when_action(OracleAction::Archive {
                older_than: test_clock().now() + chrono::Duration::days(1),
            })
            .then_state(move |state| assert_eq!(state, &before))
            .then_effects(|effects| assert!(effects[0].is_none()))
            .run();
    }

    #[test]
    fn test_update_settings_validates() {
        let invalid = RequestSettings {
            endpoint_id: String::new(),
            ..RequestSettings::default()
        };

        ReducerTest::new(OracleReducer::default())
            .with_env(test_env())
            .given_state(OracleState::default())
            .when_action(OracleAction::UpdateSettings { settings: invalid })
            .then_rejected(|error| assert!(matches!(error, OracleError::InvalidSettings(_))))
            .then_state(|state| assert_eq!(state.settings, RequestSettings::default()))
            .run();
    }
}
