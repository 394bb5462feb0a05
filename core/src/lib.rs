//! # Oracle Relay Core
//!
//! Core traits, types and data structures for correlating asynchronous oracle
//! requests with the callbacks that fulfill them.
//!
//! A request is sent to an external computation service through a [`Transport`],
//! recorded under the identifier the transport assigns, and fulfilled exactly once
//! when the service calls back with a response or an error. Every request is kept in
//! an append-only history that can be listed, paginated and looked up by key.
//!
//! ## Core Concepts
//!
//! - **Registry**: canonical status of every request ([`registry::RequestRegistry`])
//! - **History**: ordered request records ([`history::HistoryList`])
//! - **Index**: lookup key → history position ([`index::SecondaryIndex`])
//! - **Correlation**: request id → lookup key ([`index::CorrelationTable`])
//! - **Reducer**: `(State, Action, Environment) → Result<Effects, Error>`
//! - **Effect**: side effect descriptions executed by the runtime
//!
//! ## Example
//!
//! ```
//! use oracle_relay_core::history::HistoryList;
//! use oracle_relay_core::types::{HistoryEntry, Originator, RequestId};
//! use chrono::Utc;
//!
//! let mut history = HistoryList::new();
//! let position = history.append(HistoryEntry::pending(
//!     RequestId::new(),
//!     Originator::new("consumer"),
//!     Utc::now(),
//!     "2025-01-19",
//!     "",
//! ));
//!
//! assert_eq!(position, 0);
//! assert_eq!(history.range(0, 0).map(|page| page.len()), Ok(1));
//! ```
//!
//! [`Transport`]: environment::Transport

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod error;
pub mod history;
pub mod index;
pub mod registry;
pub mod types;

pub use error::OracleError;

/// Reducer module - the trait that holds request lifecycle logic
///
/// Reducers are deterministic functions: `(State, Action, Environment) → (State, Effects)`.
/// Unlike a fire-and-forget command handler, an oracle reducer may reject an action;
/// a rejected action must leave the state untouched.
pub mod reducer {
    use super::effect::Effects;

    /// The Reducer trait - core abstraction for request lifecycle logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Error`: Why an action was rejected
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for OracleReducer {
    ///     type State = OracleState;
    ///     type Action = OracleAction;
    ///     type Environment = OracleEnvironment;
    ///     type Error = OracleError;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut OracleState,
    ///         action: OracleAction,
    ///         env: &OracleEnvironment,
    ///     ) -> Result<Effects<OracleAction>, OracleError> {
    ///         match action {
    ///             OracleAction::MarkStale { request_id } => {
    ///                 state.mark_stale(&request_id, env.clock().now());
    ///                 Ok(smallvec![Effect::None])
    ///             }
    ///             _ => Ok(smallvec![Effect::None]),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// The error returned when an action is rejected
        type Error;

        /// Reduce an action into state changes and effects
        ///
        /// This is a deterministic function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place (only if validation passed)
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Errors
        ///
        /// Returns `Self::Error` when the action is rejected. The state must be
        /// unchanged in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<Effects<Self::Action>, Self::Error>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects are values returned by reducers. The runtime executes them after the state
/// lock has been released.
pub mod effect {
    use futures::future::BoxFuture;
    use smallvec::SmallVec;
    use std::time::Duration;

    /// Effects produced by a single reduction
    ///
    /// Most actions produce zero or one effect, so `SmallVec` avoids heap allocation.
    pub type Effects<Action> = SmallVec<[Effect<Action>; 4]>;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can feed back into the reducer
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Delayed action (staleness timers)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(BoxFuture<'static, Option<Action>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Returns `true` for [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - dependency injection traits
///
/// All collaborators outside the correlation core (time, the external computation
/// service, long-term archival) are abstracted behind traits and injected through the
/// environment.
pub mod environment {
    use crate::history::ArchivedRequest;
    use crate::types::{EncodedRequest, RequestId};
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Production uses [`SystemClock`]; tests use a fixed or manually advanced clock.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Transport to the external computation service
    ///
    /// `send` is synchronous: it accepts the request and assigns its identifier. The
    /// response arrives later, out of band, as a
    /// [`Fulfillment`](crate::types::Fulfillment) delivered to the store.
    ///
    /// Identifiers must never be reused. Subscription and budget validity are the
    /// transport's concern; from the core's perspective `send` always succeeds.
    pub trait Transport: Send + Sync {
        /// Hand a request to the service and return its identifier
        fn send(&self, request: EncodedRequest) -> RequestId;
    }

    /// Destination for history records removed by retention
    pub trait ArchiveSink: Send + Sync {
        /// Receive a batch of archived requests, oldest first
        fn archive(&self, batch: Vec<ArchivedRequest>);
    }

    /// Archive sink that drops everything it receives
    #[derive(Debug, Clone, Copy, Default)]
    pub struct DiscardArchive;

    impl ArchiveSink for DiscardArchive {
        fn archive(&self, batch: Vec<ArchivedRequest>) {
            tracing::debug!(count = batch.len(), "Discarding archived requests");
        }
    }
}
