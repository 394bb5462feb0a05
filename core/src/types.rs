//! Domain types shared by every layer of the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier assigned by the [`Transport`](crate::environment::Transport)
/// when a request is sent.
///
/// Identifiers are never reused and are the only thing a fulfillment callback
/// carries to find its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of whoever submitted a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Originator(String);

impl Originator {
    /// Create an originator from any string-like identity.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Borrow the identity.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Originator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a request is in its lifecycle.
///
/// `Sent → Fulfilled` is the base contract. `Stale` marks a request that has waited
/// longer than the configured threshold; a late callback still moves it to
/// `Fulfilled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Sent to the service, waiting for the callback
    Sent,
    /// Waited past the staleness threshold without a callback
    Stale,
    /// Callback received (terminal)
    Fulfilled,
}

impl LifecycleState {
    /// Whether the request may be removed by retention.
    #[must_use]
    pub const fn is_archivable(self) -> bool {
        matches!(self, Self::Stale | Self::Fulfilled)
    }
}

/// What to do when a second callback arrives for an already fulfilled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicateFulfillment {
    /// Fail with `AlreadyFulfilled` and keep the first payload
    #[default]
    Reject,
    /// Replace the stored payload (last write wins)
    Overwrite,
}

/// Externally visible status of a request.
///
/// Unknown identifiers yield [`RequestStatus::default`], whose `exists` is `false`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestStatus {
    /// Whether the request was ever created
    pub exists: bool,
    /// Whether the callback has been received
    pub fulfilled: bool,
    /// Response bytes delivered by the service
    pub response: Vec<u8>,
    /// Error bytes delivered by the service
    pub err: Vec<u8>,
    /// Lifecycle state (`None` for unknown requests)
    pub lifecycle: Option<LifecycleState>,
    /// When the request was sent
    pub sent_at: Option<DateTime<Utc>>,
    /// When the callback was received
    pub fulfilled_at: Option<DateTime<Utc>>,
}

/// One record of the request history.
///
/// Only `data` and `timestamp` change after creation, at fulfillment time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Request this entry was created for
    pub request_id: RequestId,
    /// Who submitted the request
    pub originator: Originator,
    /// Send time, replaced by the fulfillment time once the callback arrives
    pub timestamp: DateTime<Utc>,
    /// Key the request was built from
    pub lookup_key: String,
    /// Optional second argument of the request
    pub secondary_key: String,
    /// Response text, empty until fulfilled
    pub data: String,
}

impl HistoryEntry {
    /// Create the provisional entry recorded at send time.
    #[must_use]
    pub fn pending(
        request_id: RequestId,
        originator: Originator,
        sent_at: DateTime<Utc>,
        lookup_key: impl Into<String>,
        secondary_key: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            originator,
            timestamp: sent_at,
            lookup_key: lookup_key.into(),
            secondary_key: secondary_key.into(),
            data: String::new(),
        }
    }
}

/// A request ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedRequest {
    /// Encoded program and arguments
    pub payload: Vec<u8>,
    /// Billing subscription of the caller
    pub subscription_id: u64,
    /// Resource ceiling for processing the request
    pub compute_budget: u32,
    /// Service endpoint ("DON") the request is routed to
    pub endpoint_id: String,
}

/// The out-of-band callback for a previously sent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    /// Identifier returned by `Transport::send`
    pub request_id: RequestId,
    /// Response bytes (may be empty)
    pub response: Vec<u8>,
    /// Error bytes (may be empty)
    pub err: Vec<u8>,
}

impl Fulfillment {
    /// Successful fulfillment carrying only a response.
    #[must_use]
    pub fn success(request_id: RequestId, response: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id,
            response: response.into(),
            err: Vec::new(),
        }
    }

    /// Failed fulfillment carrying only an error.
    #[must_use]
    pub fn failure(request_id: RequestId, err: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id,
            response: Vec::new(),
            err: err.into(),
        }
    }
}
