//! # Oracle Relay Testing
//!
//! Testing utilities for the oracle relay.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - A recording transport with predictable identifiers ([`MockTransport`])
//! - An archive sink that keeps what it receives ([`RecordingArchive`])
//! - A Given-When-Then harness for reducers ([`ReducerTest`])
//!
//! ## Example
//!
//! ```ignore
//! use oracle_relay_testing::{MockTransport, test_clock};
//!
//! #[tokio::test]
//! async fn test_submit() {
//!     let transport = Arc::new(MockTransport::new());
//!     let env = OracleEnvironment::new(Arc::new(test_clock()), transport.clone());
//!     let store = OracleStore::new(&Config::default(), env)?;
//!
//!     let id = store.submit("2025-01-19").await?;
//!     assert_eq!(transport.sent_ids(), vec![id]);
//! }
//! ```

use chrono::{DateTime, Utc};
use oracle_relay_core::environment::{ArchiveSink, Clock, Transport};
use oracle_relay_core::history::ArchivedRequest;
use oracle_relay_core::types::{EncodedRequest, RequestId};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub mod reducer_test;

pub use reducer_test::ReducerTest;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{
        ArchiveSink, ArchivedRequest, AtomicU64, Clock, DateTime, EncodedRequest, Mutex,
        Ordering, RequestId, Transport, Utc, Uuid,
    };

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use oracle_relay_testing::mocks::FixedClock;
    /// use oracle_relay_core::environment::Clock;
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

    /// Clock that only moves when told to
    ///
    /// Used to age requests past staleness and retention thresholds.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-19 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// The instant [`test_clock`] is stopped at
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_737_244_800, 0).unwrap_or_default()
    }

    /// Transport that records every request and hands out sequential identifiers
    ///
    /// Identifiers are `Uuid::from_u128(1)`, `Uuid::from_u128(2)`, ... so tests can
    /// predict them with [`MockTransport::id_for`].
    #[derive(Debug, Default)]
    pub struct MockTransport {
        next: AtomicU64,
        sent: Mutex<Vec<(RequestId, EncodedRequest)>>,
    }

    impl MockTransport {
        /// Create a transport with nothing sent
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Identifier the `n`-th send (1-based) will receive
        #[must_use]
        pub fn id_for(n: u64) -> RequestId {
            RequestId::from_uuid(Uuid::from_u128(u128::from(n)))
        }

        /// Every request sent so far, in order
        #[must_use]
        pub fn sent(&self) -> Vec<(RequestId, EncodedRequest)> {
            self.sent
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }

        /// Identifiers handed out so far, in order
        #[must_use]
        pub fn sent_ids(&self) -> Vec<RequestId> {
            self.sent().into_iter().map(|(id, _)| id).collect()
        }

        /// Number of requests sent
        #[must_use]
        pub fn sent_count(&self) -> usize {
            self.sent
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .len()
        }
    }

    impl Transport for MockTransport {
        fn send(&self, request: EncodedRequest) -> RequestId {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            let request_id = Self::id_for(n);
            self.sent
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((request_id, request));
            request_id
        }
    }

    /// Transport that returns the same identifier every time
    ///
    /// Models a broken service that reuses identifiers.
    #[derive(Debug, Clone, Copy)]
    pub struct RepeatingTransport(pub RequestId);

    impl Transport for RepeatingTransport {
        fn send(&self, _request: EncodedRequest) -> RequestId {
            self.0
        }
    }

    /// Archive sink that keeps every batch it receives
    #[derive(Debug, Default)]
    pub struct RecordingArchive {
        archived: Mutex<Vec<ArchivedRequest>>,
    }

    impl RecordingArchive {
        /// Create an empty archive
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Everything archived so far, oldest first
        #[must_use]
        pub fn archived(&self) -> Vec<ArchivedRequest> {
            self.archived
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }
    }

    impl ArchiveSink for RecordingArchive {
        fn archive(&self, batch: Vec<ArchivedRequest>) {
            self.archived
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .extend(batch);
        }
    }
}

/// Install a `tracing` subscriber that writes to the test output
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oracle_relay_core=debug,oracle_relay_runtime=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{
    FixedClock, ManualClock, MockTransport, RecordingArchive, RepeatingTransport, test_clock,
    test_epoch,
};
