//! Configuration for the oracle relay.
//!
//! Loads configuration from environment variables with sensible defaults.

use oracle_relay_core::OracleError;
use oracle_relay_core::types::DuplicateFulfillment;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Inline program sent with every request unless overridden.
///
/// Fetches the exchange rate published for the date passed as the first argument.
pub const DEFAULT_SOURCE: &str = r#"const date = args[0];
const response = await Functions.makeHttpRequest({
  url: `https://api.frankfurter.app/${date}`,
  params: { from: "EUR", to: "PLN" },
});
if (response.error) {
  throw Error("Rate request failed");
}
return Functions.encodeString(response.data.rates.PLN.toString());
"#;

/// Relay configuration loaded from environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// What gets sent to the computation service
    pub request: RequestSettings,
    /// History listing bounds
    pub history: HistorySettings,
    /// Request lifecycle policies
    pub lifecycle: LifecycleSettings,
    /// History retention
    pub retention: RetentionSettings,
}

/// Constants attached to every outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSettings {
    /// Program template executed by the service
    pub source: String,
    /// Subscription billed for requests
    pub subscription_id: u64,
    /// Resource ceiling per request
    pub compute_budget: u32,
    /// Service endpoint ("DON") identifier
    pub endpoint_id: String,
    /// Originator recorded when the caller does not name one
    pub default_originator: String,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            subscription_id: 0,
            compute_budget: 300_000,
            endpoint_id: "fun-ethereum-sepolia-1".to_string(),
            default_originator: "oracle-relay".to_string(),
        }
    }
}

impl RequestSettings {
    /// Reject settings the service could never execute.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::InvalidSettings`] for an empty source, an empty
    /// endpoint, a zero compute budget or an empty default originator.
    pub fn validate(&self) -> Result<(), OracleError> {
        if self.source.trim().is_empty() {
            return Err(OracleError::InvalidSettings("source must not be empty".into()));
        }
        if self.endpoint_id.trim().is_empty() {
            return Err(OracleError::InvalidSettings("endpoint_id must not be empty".into()));
        }
        if self.compute_budget == 0 {
            return Err(OracleError::InvalidSettings("compute_budget must be positive".into()));
        }
        if self.default_originator.is_empty() {
            return Err(OracleError::InvalidSettings(
                "default_originator must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Bounds on history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySettings {
    /// Largest history `history_all` will return (`None` = unbounded)
    pub list_all_limit: Option<usize>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            list_all_limit: Some(1_000),
        }
    }
}

/// Request lifecycle policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Mark requests `Stale` once they wait this long (`None` = never)
    pub stale_after: Option<Duration>,
    /// Handling of a second callback for the same request
    pub duplicate_fulfillment: DuplicateFulfillment,
}

/// History retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Archive terminal entries older than this (`None` = keep forever)
    pub max_age: Option<Duration>,
    /// How often the retention watchdog runs
    pub sweep_interval: Duration,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_age: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to [`Config::default`] values.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any `ORACLE_*` variable source.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |name: &str| lookup(name).and_then(|value| value.trim().parse::<u64>().ok());

        Self {
            request: RequestSettings {
                source: lookup("ORACLE_SOURCE").unwrap_or(defaults.request.source),
                subscription_id: parse("ORACLE_SUBSCRIPTION_ID")
                    .unwrap_or(defaults.request.subscription_id),
                compute_budget: lookup("ORACLE_COMPUTE_BUDGET")
                    .and_then(|value| value.trim().parse().ok())
                    .unwrap_or(defaults.request.compute_budget),
                endpoint_id: lookup("ORACLE_ENDPOINT_ID").unwrap_or(defaults.request.endpoint_id),
                default_originator: lookup("ORACLE_ORIGINATOR")
                    .unwrap_or(defaults.request.default_originator),
            },
            history: HistorySettings {
                list_all_limit: match lookup("ORACLE_LIST_ALL_LIMIT").as_deref().map(str::trim) {
                    Some("none" | "unbounded") => None,
                    Some(value) => value.parse().ok().or(defaults.history.list_all_limit),
                    None => defaults.history.list_all_limit,
                },
            },
            lifecycle: LifecycleSettings {
                stale_after: parse("ORACLE_STALE_AFTER_SECS")
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
                duplicate_fulfillment: match lookup("ORACLE_DUPLICATE_FULFILLMENT")
                    .map(|value| value.trim().to_ascii_lowercase())
                    .as_deref()
                {
                    Some("overwrite") => DuplicateFulfillment::Overwrite,
                    _ => DuplicateFulfillment::Reject,
                },
            },
            retention: RetentionSettings {
                max_age: parse("ORACLE_RETENTION_MAX_AGE_SECS").map(Duration::from_secs),
                sweep_interval: parse("ORACLE_RETENTION_SWEEP_SECS")
                    .filter(|secs| *secs > 0)
                    .map_or(defaults.retention.sweep_interval, Duration::from_secs),
            },
        }
    }
}
