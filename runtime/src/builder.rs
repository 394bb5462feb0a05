//! Builds the payload handed to the computation service.

use crate::config::RequestSettings;
use oracle_relay_core::OracleError;
use oracle_relay_core::types::{EncodedRequest, Originator};
use serde::{Deserialize, Serialize};

/// Where the service finds the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeLocation {
    /// Source travels inside the request
    Inline,
}

/// Language the program is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeLanguage {
    /// JavaScript executed by the service sandbox
    JavaScript,
}

/// Program plus arguments, as encoded into [`EncodedRequest::payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Where the program lives
    pub code_location: CodeLocation,
    /// Program language
    pub language: CodeLanguage,
    /// Program text
    pub source: String,
    /// Positional arguments (`args[0]` is the lookup key)
    pub args: Vec<String>,
}

/// Caller arguments for a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Who is asking
    pub originator: Originator,
    /// Key the result will be indexed under
    pub lookup_key: String,
    /// Optional second argument, empty if unused
    pub secondary_key: String,
}

impl SubmitRequest {
    /// Request for `lookup_key` with no secondary key.
    #[must_use]
    pub fn new(originator: Originator, lookup_key: impl Into<String>) -> Self {
        Self {
            originator,
            lookup_key: lookup_key.into(),
            secondary_key: String::new(),
        }
    }

    /// Attach a secondary key (sent as `args[1]`).
    #[must_use]
    pub fn with_secondary_key(mut self, secondary_key: impl Into<String>) -> Self {
        self.secondary_key = secondary_key.into();
        self
    }

    /// Program arguments in the order the service receives them.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.lookup_key.clone()];
        if !self.secondary_key.is_empty() {
            args.push(self.secondary_key.clone());
        }
        args
    }
}

/// Stateless encoder from settings + arguments to an [`EncodedRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBuilder;

impl RequestBuilder {
    /// Encode the configured program with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Encoding`] if the payload cannot be serialized.
    pub fn build(
        settings: &RequestSettings,
        args: Vec<String>,
    ) -> Result<EncodedRequest, OracleError> {
        let payload = RequestPayload {
            code_location: CodeLocation::Inline,
            language: CodeLanguage::JavaScript,
            source: settings.source.clone(),
            args,
        };

        let payload =
            bincode::serialize(&payload).map_err(|e| OracleError::Encoding(e.to_string()))?;

        Ok(EncodedRequest {
            payload,
            subscription_id: settings.subscription_id,
            compute_budget: settings.compute_budget,
            endpoint_id: settings.endpoint_id.clone(),
        })
    }

    /// Decode a payload produced by [`build`](Self::build).
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Encoding`] for bytes that are not a valid payload.
    pub fn decode(payload: &[u8]) -> Result<RequestPayload, OracleError> {
        bincode::deserialize(payload).map_err(|e| OracleError::Encoding(e.to_string()))
    }
}
