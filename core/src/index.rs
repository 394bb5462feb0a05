//! Key-based lookup structures over the request history.
//!
//! - [`SecondaryIndex`]: lookup key → latest history position
//! - [`CorrelationTable`]: request id → the key (and position) it was sent with

use crate::error::OracleError;
use crate::types::RequestId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maps a lookup key to the history position of the most recent request sent for it.
///
/// Last write wins: indexing a key again replaces the mapping. Older entries stay in
/// the history and remain reachable by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndex {
    positions: HashMap<String, usize>,
}

impl SecondaryIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `lookup_key` at `position`, replacing any previous mapping.
    ///
    /// Returns the position previously mapped to the key.
    pub fn index_new(&mut self, lookup_key: impl Into<String>, position: usize) -> Option<usize> {
        self.positions.insert(lookup_key.into(), position)
    }

    /// Current position for `lookup_key`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::UnknownKey`] if the key was never indexed.
    pub fn position(&self, lookup_key: &str) -> Result<usize, OracleError> {
        self.positions
            .get(lookup_key)
            .copied()
            .ok_or_else(|| OracleError::UnknownKey(lookup_key.to_string()))
    }

    /// Drop the mapping for `lookup_key`, but only if it still points at `position`.
    ///
    /// Used by retention so that archiving an old entry never hides a newer one.
    pub fn remove_if_points_to(&mut self, lookup_key: &str, position: usize) -> bool {
        if self.positions.get(lookup_key) == Some(&position) {
            self.positions.remove(lookup_key);
            true
        } else {
            false
        }
    }

    /// Number of indexed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no key is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// What the correlation table remembers about a sent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    /// Key the request was built from
    pub lookup_key: String,
    /// History position created for the request
    ///
    /// Pinned at send time: if the same key is submitted again before this request
    /// is fulfilled, the index moves on but the callback still lands here.
    pub position: usize,
}

/// Maps each issued [`RequestId`] to the key that produced it.
///
/// 1:1 with requests. Entries are only removed by retention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationTable {
    correlations: HashMap<RequestId, Correlation>,
}

impl CorrelationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the key and history position used for `request_id`.
    pub fn correlate(
        &mut self,
        request_id: RequestId,
        lookup_key: impl Into<String>,
        position: usize,
    ) {
        self.correlations.insert(
            request_id,
            Correlation {
                lookup_key: lookup_key.into(),
                position,
            },
        );
    }

    /// Find what `request_id` was correlated with.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::UnknownRequest`] if `request_id` was never correlated.
    pub fn resolve(&self, request_id: &RequestId) -> Result<&Correlation, OracleError> {
        self.correlations
            .get(request_id)
            .ok_or(OracleError::UnknownRequest(*request_id))
    }

    /// Drop the correlation for `request_id` (retention only).
    pub fn remove(&mut self, request_id: &RequestId) -> Option<Correlation> {
        self.correlations.remove(request_id)
    }

    /// Number of correlated requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.correlations.len()
    }

    /// Whether nothing has been correlated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.correlations.is_empty()
    }
}
