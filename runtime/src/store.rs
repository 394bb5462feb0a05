//! The oracle store: shared state, the reducer, and effect execution.
//!
//! Every command goes through [`OracleReducer`] while the store holds the state's
//! write lock. Effects returned by the reducer run on the tokio runtime after the
//! lock is released; actions they produce are fed back into the store.

use crate::actions::OracleAction;
use crate::builder::{RequestBuilder, SubmitRequest};
use crate::config::{Config, HistorySettings, RequestSettings, RetentionSettings};
use crate::environment::OracleEnvironment;
use crate::error::StoreError;
use crate::metrics::StoreMetrics;
use crate::reducer::OracleReducer;
use crate::state::{OracleState, RequestView};
use chrono::{DateTime, Utc};
use oracle_relay_core::OracleError;
use oracle_relay_core::effect::{Effect, Effects};
use oracle_relay_core::reducer::Reducer;
use oracle_relay_core::types::{
    Fulfillment, HistoryEntry, LifecycleState, Originator, RequestId, RequestStatus,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;

/// Decrements the pending-effect counter when an effect task ends, even by panic.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolves once shutdown has been signalled.
async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

/// Thread-safe handle to the relay.
///
/// Cheap to clone; clones share state. Safe to call from many tasks at once:
/// callbacks may race submissions, and the single write lock orders them.
///
/// # Example
///
/// ```ignore
/// let store = OracleStore::new(&Config::from_env(), OracleEnvironment::production(transport))?;
///
/// let request_id = store.submit("2025-01-19").await?;
/// // ... later, from the callback handler
/// store.fulfill(request_id, b"4.123".to_vec(), Vec::new()).await?;
///
/// assert_eq!(store.entry_by_key("2025-01-19").await?.data, "4.123");
/// ```
#[derive(Clone)]
pub struct OracleStore {
    state: Arc<RwLock<OracleState>>,
    reducer: OracleReducer,
    environment: OracleEnvironment,
    history: HistorySettings,
    retention: RetentionSettings,
    shutdown: Arc<watch::Sender<bool>>,
    pending_effects: Arc<AtomicUsize>,
}

impl OracleStore {
    /// Create an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::InvalidSettings`] if the request settings are unusable.
    pub fn new(config: &Config, environment: OracleEnvironment) -> Result<Self, StoreError> {
        Self::from_snapshot(config, environment, OracleState::new(config.request.clone()))
    }

    /// Resume from a previously taken [`snapshot`](Self::snapshot).
    ///
    /// Request settings come from the snapshot; lifecycle, history and retention
    /// settings come from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::InvalidSettings`] if the snapshot's request settings are
    /// unusable.
    pub fn from_snapshot(
        config: &Config,
        environment: OracleEnvironment,
        state: OracleState,
    ) -> Result<Self, StoreError> {
        state.settings.validate()?;
        StoreMetrics::record_retained(state.history.retained());

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            reducer: OracleReducer::new(config.lifecycle),
            environment,
            history: config.history,
            retention: config.retention,
            shutdown: Arc::new(shutdown),
            pending_effects: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Submit a request for `lookup_key` under the configured default originator.
    ///
    /// # Errors
    ///
    /// See [`submit_as`](Self::submit_as).
    pub async fn submit(&self, lookup_key: impl Into<String>) -> Result<RequestId, StoreError> {
        let originator = Originator::new(self.state.read().await.settings.default_originator.clone());
        self.submit_as(SubmitRequest::new(originator, lookup_key)).await
    }

    /// Build, send and record a request.
    ///
    /// The write lock is held from encoding until the request is recorded, so a
    /// callback for the returned identifier can never be processed before the
    /// correlation exists.
    ///
    /// # Errors
    ///
    /// - [`OracleError::EmptyKey`] for an empty lookup key (nothing is sent)
    /// - [`OracleError::Encoding`] if the payload cannot be encoded (nothing is sent)
    /// - [`OracleError::DuplicateRequest`] if the transport reused an identifier
    /// - [`StoreError::ShutdownInProgress`] once shutdown has started
    #[tracing::instrument(
        skip(self, request),
        fields(lookup_key = %request.lookup_key, originator = %request.originator)
    )]
    pub async fn submit_as(&self, request: SubmitRequest) -> Result<RequestId, StoreError> {
        self.ensure_running()?;

        if request.lookup_key.is_empty() {
            let error = OracleError::EmptyKey;
            StoreMetrics::record_rejection(error.kind());
            tracing::warn!(%error, "Submission rejected");
            return Err(error.into());
        }

        let (request_id, effects) = {
            let mut state = self.state.write().await;
            let encoded = RequestBuilder::build(&state.settings, request.args())?;
            let request_id = self.environment.transport().send(encoded);

            let effects = self.reduce_locked(
                &mut state,
                OracleAction::RequestSent {
                    request_id,
                    originator: request.originator,
                    lookup_key: request.lookup_key,
                    secondary_key: request.secondary_key,
                },
            )?;
            (request_id, effects)
        };

        StoreMetrics::record_submitted();
        tracing::debug!(%request_id, "Request submitted");
        self.execute_effects(effects);
        Ok(request_id)
    }

    /// Callback entry point: record the service's result for `request_id`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::UnknownRequest`] if the identifier was never sent or
    ///   correlated
    /// - [`OracleError::AlreadyFulfilled`] for a second callback under the `Reject`
    ///   policy
    /// - [`OracleError::IndexOutOfRange`] if the correlated position is gone
    /// - [`StoreError::ShutdownInProgress`] once shutdown has started
    ///
    /// State is unchanged whenever an error is returned.
    #[tracing::instrument(skip(self, response, err), fields(response_len = response.len(), err_len = err.len()))]
    pub async fn fulfill(
        &self,
        request_id: RequestId,
        response: Vec<u8>,
        err: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.ensure_running()?;
        self.dispatch(OracleAction::Fulfill {
            request_id,
            response,
            err,
        })
        .await?;

        StoreMetrics::record_fulfilled();
        tracing::debug!(%request_id, "Request fulfilled");
        Ok(())
    }

    /// [`fulfill`](Self::fulfill) taking the callback as one value.
    ///
    /// # Errors
    ///
    /// See [`fulfill`](Self::fulfill).
    pub async fn deliver(&self, fulfillment: Fulfillment) -> Result<(), StoreError> {
        self.fulfill(fulfillment.request_id, fulfillment.response, fulfillment.err)
            .await
    }

    /// Apply callbacks from `fulfillments` until the channel closes or shutdown starts.
    ///
    /// Rejected callbacks are logged and skipped. Returns how many were applied.
    pub async fn consume_fulfillments(&self, mut fulfillments: mpsc::Receiver<Fulfillment>) -> usize {
        let mut applied = 0;

        while let Some(fulfillment) = fulfillments.recv().await {
            let request_id = fulfillment.request_id;
            match self.deliver(fulfillment).await {
                Ok(()) => applied += 1,
                Err(StoreError::ShutdownInProgress) => {
                    tracing::info!("Stopped consuming fulfillments for shutdown");
                    break;
                },
                Err(error) => {
                    tracing::warn!(%request_id, %error, "Skipping rejected fulfillment");
                },
            }
        }

        applied
    }

    /// Status of a request; `exists == false` for unknown identifiers.
    pub async fn status(&self, request_id: &RequestId) -> RequestStatus {
        self.state.read().await.status(request_id)
    }

    /// Latest entry recorded for `lookup_key`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::UnknownKey`] if the key was never submitted (or its
    /// entry was archived).
    pub async fn entry_by_key(&self, lookup_key: &str) -> Result<HistoryEntry, StoreError> {
        let state = self.state.read().await;
        state.entry_by_key(lookup_key).cloned().map_err(|error| {
            StoreMetrics::record_rejection(error.kind());
            error.into()
        })
    }

    /// History entries at positions `start..=end`, in send order.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::InvalidRange`] unless
    /// `first retained position <= start <= end < history_len()`.
    pub async fn history(&self, start: usize, end: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.read().await;
        state.history.range(start, end).map_err(|error| {
            StoreMetrics::record_rejection(error.kind());
            error.into()
        })
    }

    /// Every retained history entry, in send order.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::ListingTooLarge`] when the retained history exceeds
    /// the configured `list_all_limit`; use [`history`](Self::history) instead.
    pub async fn history_all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.read().await;
        state
            .history
            .list_all(self.history.list_all_limit)
            .map_err(|error| {
                StoreMetrics::record_rejection(error.kind());
                error.into()
            })
    }

    /// One past the last history position.
    pub async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }

    /// The most recently sent request.
    pub async fn last_request(&self) -> Option<RequestView> {
        self.state.read().await.last_request()
    }

    /// The most recently fulfilled request, if still retained.
    pub async fn last_fulfilled(&self) -> Option<RequestView> {
        self.state.read().await.last_fulfilled()
    }

    /// Settings attached to outgoing requests.
    pub async fn request_settings(&self) -> RequestSettings {
        self.state.read().await.settings.clone()
    }

    /// Replace the settings attached to outgoing requests.
    ///
    /// Requests already sent are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::InvalidSettings`] (keeping the old settings) if the new
    /// ones are unusable.
    #[tracing::instrument(skip(self, settings))]
    pub async fn update_request_settings(&self, settings: RequestSettings) -> Result<(), StoreError> {
        self.ensure_running()?;
        self.dispatch(OracleAction::UpdateSettings { settings }).await?;
        tracing::info!("Request settings updated");
        Ok(())
    }

    /// Mark every request waiting at least `max_age` as stale.
    ///
    /// Returns how many requests became stale.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has started.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<usize, StoreError> {
        self.ensure_running()?;

        let (marked, effects) = {
            let mut state = self.state.write().await;
            let before = state.registry.count(LifecycleState::Stale);
            let effects = self.reduce_locked(&mut state, OracleAction::SweepStale { max_age })?;
            (state.registry.count(LifecycleState::Stale).saturating_sub(before), effects)
        };

        if marked > 0 {
            tracing::info!(marked, "Marked requests stale");
        }
        self.execute_effects(effects);
        Ok(marked)
    }

    /// Archive the oldest terminal history entries sent before `older_than`.
    ///
    /// Stops at the first entry that is still pending or too recent, so retained
    /// positions never move. Returns how many entries were archived.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has started.
    #[tracing::instrument(skip(self))]
    pub async fn archive(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        self.ensure_running()?;

        let (archived, effects) = {
            let mut state = self.state.write().await;
            let before = state.history.retained();
            let effects = self.reduce_locked(&mut state, OracleAction::Archive { older_than })?;
            (before.saturating_sub(state.history.retained()), effects)
        };

        StoreMetrics::record_archived(archived);
        if archived > 0 {
            tracing::info!(archived, "Archived history entries");
        }
        self.execute_effects(effects);
        Ok(archived)
    }

    /// Copy of the full state, for persistence.
    pub async fn snapshot(&self) -> OracleState {
        self.state.read().await.clone()
    }

    /// Periodically sweep stale requests and archive old history.
    ///
    /// Does nothing (returns `None`) unless `retention.max_age` is configured. Each
    /// tick first marks requests older than `lifecycle.stale_after` stale, then
    /// archives terminal entries older than `max_age`. Stops at shutdown.
    #[must_use]
    pub fn spawn_retention_watchdog(&self, interval: Duration) -> Option<JoinHandle<()>> {
        let max_age = self.retention.max_age?;
        if interval.is_zero() {
            tracing::warn!("Retention watchdog not started: interval is zero");
            return None;
        }
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            tracing::warn!(?max_age, "Retention watchdog not started: max_age out of range");
            return None;
        };

        let store = self.clone();
        let shutdown = self.shutdown.subscribe();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let stop = stopped(shutdown);
            tokio::pin!(stop);

            loop {
                tokio::select! {
                    () = &mut stop => break,
                    _ = ticker.tick() => store.run_retention(max_age).await,
                }
            }

            tracing::debug!("Retention watchdog stopped");
        }))
    }

    async fn run_retention(&self, max_age: chrono::Duration) {
        if let Some(stale_after) = self.reducer.lifecycle().stale_after {
            if let Err(error) = self.sweep_stale(stale_after).await {
                tracing::warn!(%error, "Retention sweep failed");
                return;
            }
        }

        let Some(cutoff) = self.environment.clock().now().checked_sub_signed(max_age) else {
            return;
        };
        if let Err(error) = self.archive(cutoff).await {
            tracing::warn!(%error, "Retention archive failed");
        }
    }

    /// Stop accepting commands and wait for running effects.
    ///
    /// Pending staleness timers are cancelled; archive hand-offs already started run
    /// to completion.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] with the number of effects still
    /// running if they do not finish within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        tracing::info!("Initiating graceful shutdown");
        self.shutdown.send_replace(true);

        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);

        loop {
            let pending = self.pending_effects.load(Ordering::Acquire);
            if pending == 0 {
                tracing::info!("All effects completed, shutdown successful");
                return Ok(());
            }

            if start.elapsed() >= timeout {
                tracing::error!(pending_effects = pending, "Shutdown timed out");
                return Err(StoreError::ShutdownTimeout(pending));
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Effects spawned and not yet finished.
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.pending_effects.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), StoreError> {
        if self.is_shutting_down() {
            return Err(StoreError::ShutdownInProgress);
        }
        Ok(())
    }

    async fn dispatch(&self, action: OracleAction) -> Result<(), OracleError> {
        let effects = {
            let mut state = self.state.write().await;
            self.reduce_locked(&mut state, action)?
        };
        self.execute_effects(effects);
        Ok(())
    }

    fn reduce_locked(
        &self,
        state: &mut OracleState,
        action: OracleAction,
    ) -> Result<Effects<OracleAction>, OracleError> {
        let name = action.name();
        let stale_before = matches!(
            action,
            OracleAction::MarkStale { .. } | OracleAction::SweepStale { .. }
        )
        .then(|| state.registry.count(LifecycleState::Stale));

        let start = Instant::now();
        let result = self.reducer.reduce(state, action, &self.environment);
        StoreMetrics::record_reduce(name, start.elapsed());

        match &result {
            Ok(_) => {
                if let Some(before) = stale_before {
                    StoreMetrics::record_stale(
                        state.registry.count(LifecycleState::Stale).saturating_sub(before),
                    );
                }
                StoreMetrics::record_retained(state.history.retained());
            },
            Err(error) if error.is_invariant_breach() => {
                StoreMetrics::record_rejection(error.kind());
                tracing::error!(action = name, %error, "Invariant breach");
            },
            Err(error) => {
                StoreMetrics::record_rejection(error.kind());
                tracing::warn!(action = name, %error, "Action rejected");
            },
        }

        result
    }

    fn execute_effects(&self, effects: Effects<OracleAction>) {
        for effect in effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&self, effect: Effect<OracleAction>) {
        match effect {
            Effect::None => {},
            Effect::Delay { duration, action } => {
                let guard = PendingGuard::enter(&self.pending_effects);
                let shutdown = self.shutdown.subscribe();
                let store = self.clone();

                tokio::spawn(async move {
                    let _guard = guard;
                    let fired = tokio::select! {
                        () = tokio::time::sleep(duration) => true,
                        () = stopped(shutdown) => false,
                    };

                    if !fired {
                        tracing::trace!("Delayed action cancelled by shutdown");
                        return;
                    }
                    if let Err(error) = store.dispatch(*action).await {
                        tracing::debug!(%error, "Delayed action rejected");
                    }
                });
            },
            Effect::Future(future) => {
                let guard = PendingGuard::enter(&self.pending_effects);
                let store = self.clone();

                tokio::spawn(async move {
                    let _guard = guard;
                    if let Some(action) = future.await {
                        if let Err(error) = store.dispatch(action).await {
                            tracing::debug!(%error, "Effect action rejected");
                        }
                    }
                });
            },
        }
    }
}

impl std::fmt::Debug for OracleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleStore")
            .field("reducer", &self.reducer)
            .field("history", &self.history)
            .field("retention", &self.retention)
            .field("pending_effects", &self.pending_effects())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}
