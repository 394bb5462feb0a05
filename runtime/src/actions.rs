//! Actions processed by the [`OracleReducer`](crate::reducer::OracleReducer).

use crate::config::RequestSettings;
use chrono::{DateTime, Utc};
use oracle_relay_core::types::{Originator, RequestId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything that can change the relay's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleAction {
    /// The transport accepted a request and assigned it an identifier.
    ///
    /// Creates the registry record, the history entry, the index mapping and the
    /// correlation in one step.
    RequestSent {
        /// Identifier returned by the transport
        request_id: RequestId,
        /// Who submitted the request
        originator: Originator,
        /// Key the request was built from
        lookup_key: String,
        /// Optional second argument
        secondary_key: String,
    },

    /// The service called back with a result.
    Fulfill {
        /// Identifier carried by the callback
        request_id: RequestId,
        /// Response bytes
        response: Vec<u8>,
        /// Error bytes
        err: Vec<u8>,
    },

    /// Staleness timer for one request fired.
    ///
    /// Scheduled automatically when `stale_after` is configured; ignored if the
    /// request was fulfilled or archived in the meantime.
    MarkStale {
        /// Request to check
        request_id: RequestId,
    },

    /// Mark every request that has been waiting at least `max_age` as stale.
    SweepStale {
        /// Age threshold
        max_age: Duration,
    },

    /// Archive the oldest terminal history entries whose timestamp is before
    /// `older_than`.
    Archive {
        /// Cutoff time
        older_than: DateTime<Utc>,
    },

    /// Replace the constants attached to outgoing requests.
    UpdateSettings {
        /// New settings
        settings: RequestSettings,
    },
}

impl OracleAction {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestSent { .. } => "request_sent",
            Self::Fulfill { .. } => "fulfill",
            Self::MarkStale { .. } => "mark_stale",
            Self::SweepStale { .. } => "sweep_stale",
            Self::Archive { .. } => "archive",
            Self::UpdateSettings { .. } => "update_settings",
        }
    }
}
