//! Injected dependencies of the oracle reducer and store.

use oracle_relay_core::environment::{ArchiveSink, Clock, DiscardArchive, SystemClock, Transport};
use std::sync::Arc;

/// Environment for the oracle relay.
///
/// Production wires a [`SystemClock`] and a real transport; tests inject a fixed
/// clock and a mock transport.
#[derive(Clone)]
pub struct OracleEnvironment {
    clock: Arc<dyn Clock>,
    transport: Arc<dyn Transport>,
    archive: Arc<dyn ArchiveSink>,
}

impl OracleEnvironment {
    /// Create an environment that discards archived history.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, transport: Arc<dyn Transport>) -> Self {
        Self {
            clock,
            transport,
            archive: Arc::new(DiscardArchive),
        }
    }

    /// Production environment on the system clock.
    #[must_use]
    pub fn production(transport: Arc<dyn Transport>) -> Self {
        Self::new(Arc::new(SystemClock), transport)
    }

    /// Send archived history to `archive` instead of discarding it.
    #[must_use]
    pub fn with_archive_sink(mut self, archive: Arc<dyn ArchiveSink>) -> Self {
        self.archive = archive;
        self
    }

    /// Clock for timestamps.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Transport to the computation service.
    #[must_use]
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Archive sink, shared so effects can outlive the reduction.
    #[must_use]
    pub fn archive_sink(&self) -> Arc<dyn ArchiveSink> {
        Arc::clone(&self.archive)
    }
}

impl std::fmt::Debug for OracleEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleEnvironment").finish_non_exhaustive()
    }
}
