//! Canonical store of every request and its status.

use crate::error::OracleError;
use crate::types::{DuplicateFulfillment, LifecycleState, RequestId, RequestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RequestRecord {
    lifecycle: LifecycleState,
    response: Vec<u8>,
    err: Vec<u8>,
    sent_at: DateTime<Utc>,
    fulfilled_at: Option<DateTime<Utc>>,
    /// Registry-wide fulfillment counter value at the latest fulfillment
    #[serde(default)]
    fulfillment_seq: Option<u64>,
}

impl RequestRecord {
    fn status(&self) -> RequestStatus {
        RequestStatus {
            exists: true,
            fulfilled: self.lifecycle == LifecycleState::Fulfilled,
            response: self.response.clone(),
            err: self.err.clone(),
            lifecycle: Some(self.lifecycle),
            sent_at: Some(self.sent_at),
            fulfilled_at: self.fulfilled_at,
        }
    }
}

/// Status of every request the relay has issued, keyed by [`RequestId`].
///
/// The registry is the only owner of request status. Each request goes through
/// `create` once and, unless a duplicate policy says otherwise, `fulfill` once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRegistry {
    requests: HashMap<RequestId, RequestRecord>,
    /// Fulfillments applied so far; orders them even when timestamps tie
    #[serde(default)]
    fulfillments: u64,
}

impl RequestRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly sent request in the `Sent` state.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::DuplicateRequest`] if `request_id` is already registered.
    pub fn create(
        &mut self,
        request_id: RequestId,
        sent_at: DateTime<Utc>,
    ) -> Result<(), OracleError> {
        if self.requests.contains_key(&request_id) {
            return Err(OracleError::DuplicateRequest(request_id));
        }

        self.requests.insert(
            request_id,
            RequestRecord {
                lifecycle: LifecycleState::Sent,
                response: Vec::new(),
                err: Vec::new(),
                sent_at,
                fulfilled_at: None,
                fulfillment_seq: None,
            },
        );
        Ok(())
    }

    /// Check whether `fulfill` would succeed, without touching anything.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::UnknownRequest`] for unregistered requests and
    /// [`OracleError::AlreadyFulfilled`] for repeated callbacks under
    /// [`DuplicateFulfillment::Reject`].
    pub fn check_fulfillable(
        &self,
        request_id: &RequestId,
        policy: DuplicateFulfillment,
    ) -> Result<(), OracleError> {
        let record = self
            .requests
            .get(request_id)
            .ok_or(OracleError::UnknownRequest(*request_id))?;

        if record.lifecycle == LifecycleState::Fulfilled && policy == DuplicateFulfillment::Reject
        {
            return Err(OracleError::AlreadyFulfilled(*request_id));
        }
        Ok(())
    }

    /// Store the service's result and move the request to `Fulfilled`.
    ///
    /// Payloads are stored verbatim; both may be non-empty when the service reports
    /// a partial failure.
    ///
    /// # Errors
    ///
    /// Same as [`check_fulfillable`](Self::check_fulfillable). Nothing is modified on
    /// error.
    pub fn fulfill(
        &mut self,
        request_id: &RequestId,
        response: Vec<u8>,
        err: Vec<u8>,
        fulfilled_at: DateTime<Utc>,
        policy: DuplicateFulfillment,
    ) -> Result<(), OracleError> {
        self.check_fulfillable(request_id, policy)?;

        let seq = self.fulfillments + 1;
        let record = self
            .requests
            .get_mut(request_id)
            .ok_or(OracleError::UnknownRequest(*request_id))?;
        record.lifecycle = LifecycleState::Fulfilled;
        record.response = response;
        record.err = err;
        record.fulfilled_at = Some(fulfilled_at);
        record.fulfillment_seq = Some(seq);
        self.fulfillments = seq;
        Ok(())
    }

    /// Status of a request; the zero value for unknown identifiers.
    #[must_use]
    pub fn get(&self, request_id: &RequestId) -> RequestStatus {
        self.requests
            .get(request_id)
            .map(RequestRecord::status)
            .unwrap_or_default()
    }

    /// Lifecycle state of a request, if registered.
    #[must_use]
    pub fn lifecycle(&self, request_id: &RequestId) -> Option<LifecycleState> {
        self.requests.get(request_id).map(|record| record.lifecycle)
    }

    /// The registered request whose fulfillment was applied last.
    ///
    /// Requests removed by retention are not considered.
    #[must_use]
    pub fn last_fulfilled(&self) -> Option<RequestId> {
        self.requests
            .iter()
            .filter_map(|(id, record)| record.fulfillment_seq.map(|seq| (seq, *id)))
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, id)| id)
    }

    /// Move a `Sent` request to `Stale`.
    ///
    /// Returns `false` if the request is unknown or no longer `Sent`.
    pub fn mark_stale(&mut self, request_id: &RequestId) -> bool {
        match self.requests.get_mut(request_id) {
            Some(record) if record.lifecycle == LifecycleState::Sent => {
                record.lifecycle = LifecycleState::Stale;
                true
            },
            _ => false,
        }
    }

    /// Requests still `Sent` that were sent at or before `cutoff`.
    #[must_use]
    pub fn sent_before(&self, cutoff: DateTime<Utc>) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(_, record)| {
                record.lifecycle == LifecycleState::Sent && record.sent_at <= cutoff
            })
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Remove a request (retention only), returning its final status.
    pub fn remove(&mut self, request_id: &RequestId) -> Option<RequestStatus> {
        self.requests
            .remove(request_id)
            .map(|record| record.status())
    }

    /// Number of requests in the given lifecycle state.
    #[must_use]
    pub fn count(&self, lifecycle: LifecycleState) -> usize {
        self.requests
            .values()
            .filter(|record| record.lifecycle == lifecycle)
            .count()
    }

    /// Number of registered requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no request is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
