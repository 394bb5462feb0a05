//! State owned by the oracle store.

use crate::config::RequestSettings;
use oracle_relay_core::OracleError;
use oracle_relay_core::history::HistoryList;
use oracle_relay_core::index::{CorrelationTable, SecondaryIndex};
use oracle_relay_core::registry::RequestRegistry;
use oracle_relay_core::types::{HistoryEntry, RequestId, RequestStatus};
use serde::{Deserialize, Serialize};

/// Request, history entry and status joined into one read-only view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestView {
    /// The request
    pub request_id: RequestId,
    /// History position of its entry
    pub position: usize,
    /// The history entry
    pub entry: HistoryEntry,
    /// Registry status
    pub status: RequestStatus,
}

/// Everything the relay knows.
///
/// Registry and history are authoritative; the index and correlation table are
/// kept in step with them by the reducer. Serializable so a host can persist
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleState {
    /// Constants attached to outgoing requests
    pub settings: RequestSettings,
    /// Request status by identifier
    pub registry: RequestRegistry,
    /// Ordered request records
    pub history: HistoryList,
    /// Lookup key → latest position
    pub index: SecondaryIndex,
    /// Request identifier → key and position
    pub correlations: CorrelationTable,
}

impl OracleState {
    /// Empty state with the given request settings.
    #[must_use]
    pub fn new(settings: RequestSettings) -> Self {
        Self {
            settings,
            registry: RequestRegistry::new(),
            history: HistoryList::new(),
            index: SecondaryIndex::new(),
            correlations: CorrelationTable::new(),
        }
    }

    /// Status of a request; `exists == false` for unknown identifiers.
    #[must_use]
    pub fn status(&self, request_id: &RequestId) -> RequestStatus {
        self.registry.get(request_id)
    }

    /// Latest entry recorded for `lookup_key`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::UnknownKey`] if the key was never indexed, and
    /// [`OracleError::IndexOutOfRange`] if the index points outside the history.
    pub fn entry_by_key(&self, lookup_key: &str) -> Result<&HistoryEntry, OracleError> {
        let position = self.index.position(lookup_key)?;
        self.history
            .get(position)
            .ok_or(OracleError::IndexOutOfRange {
                position,
                len: self.history.len(),
            })
    }

    /// The most recently sent request.
    #[must_use]
    pub fn last_request(&self) -> Option<RequestView> {
        self.history.latest().map(|(position, entry)| RequestView {
            request_id: entry.request_id,
            position,
            entry: entry.clone(),
            status: self.registry.get(&entry.request_id),
        })
    }

    /// The most recently fulfilled request among those still retained.
    #[must_use]
    pub fn last_fulfilled(&self) -> Option<RequestView> {
        let request_id = self.registry.last_fulfilled()?;
        let position = self.correlations.resolve(&request_id).ok()?.position;
        let entry = self.history.get(position)?;
        Some(RequestView {
            request_id,
            position,
            entry: entry.clone(),
            status: self.registry.get(&request_id),
        })
    }
}

impl Default for OracleState {
    fn default() -> Self {
        Self::new(RequestSettings::default())
    }
}
