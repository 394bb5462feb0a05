//! Errors reported by the correlation core.

use crate::types::RequestId;
use thiserror::Error;

/// Everything that can reject an oracle operation.
///
/// All variants are reported synchronously to the caller of the operation that
/// detected them; nothing is retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Fulfillment or lookup of an identifier that was never created
    #[error("Unknown request: {0}")]
    UnknownRequest(RequestId),

    /// Lookup of a key that was never indexed
    #[error("Unknown lookup key: {0:?}")]
    UnknownKey(String),

    /// Pagination bounds violate `first <= start <= end < len`
    #[error("Invalid history range [{start}, {end}] for history of length {len}")]
    InvalidRange {
        /// Requested first position
        start: usize,
        /// Requested last position (inclusive)
        end: usize,
        /// Current history length
        len: usize,
    },

    /// A correlated position does not exist in the history
    ///
    /// This is an internal consistency violation, not a user error.
    #[error("History position {position} out of range (length {len})")]
    IndexOutOfRange {
        /// Offending position
        position: usize,
        /// Current history length
        len: usize,
    },

    /// Submission with an empty lookup key
    #[error("Lookup key must not be empty")]
    EmptyKey,

    /// Second callback for a request that already has a result
    #[error("Request already fulfilled: {0}")]
    AlreadyFulfilled(RequestId),

    /// The transport returned an identifier that is already registered
    #[error("Request already registered: {0}")]
    DuplicateRequest(RequestId),

    /// Full listing requested for a history longer than the configured bound
    #[error("History has {len} entries, exceeding the listing limit of {limit}; use a range")]
    ListingTooLarge {
        /// Number of retained entries
        len: usize,
        /// Configured limit
        limit: usize,
    },

    /// Request settings failed validation
    #[error("Invalid request settings: {0}")]
    InvalidSettings(String),

    /// The request payload could not be encoded or decoded
    #[error("Payload encoding failed: {0}")]
    Encoding(String),
}

impl OracleError {
    /// Whether this error signals broken internal invariants rather than bad input.
    #[must_use]
    pub const fn is_invariant_breach(&self) -> bool {
        matches!(self, Self::IndexOutOfRange { .. } | Self::DuplicateRequest(_))
    }

    /// Short, stable label used as a metrics dimension.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownRequest(_) => "unknown_request",
            Self::UnknownKey(_) => "unknown_key",
            Self::InvalidRange { .. } => "invalid_range",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::EmptyKey => "empty_key",
            Self::AlreadyFulfilled(_) => "already_fulfilled",
            Self::DuplicateRequest(_) => "duplicate_request",
            Self::ListingTooLarge { .. } => "listing_too_large",
            Self::InvalidSettings(_) => "invalid_settings",
            Self::Encoding(_) => "encoding",
        }
    }
}
