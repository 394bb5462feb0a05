//! # Oracle Relay Runtime
//!
//! Request lifecycle runtime for the oracle relay.
//!
//! This crate wires the core data structures into a running service: requests are
//! built and handed to a [`Transport`](oracle_relay_core::environment::Transport),
//! recorded in history, and matched with the callbacks that fulfill them.
//!
//! ## Core Components
//!
//! - **[`OracleStore`]**: shared state behind a lock, effect execution, queries
//! - **[`OracleReducer`]**: every state transition, validated before it mutates
//! - **[`RequestBuilder`]**: encodes the configured program and arguments
//! - **[`Config`]**: settings loaded from `ORACLE_*` environment variables
//!
//! ## Example
//!
//! ```ignore
//! use oracle_relay_runtime::{Config, OracleEnvironment, OracleStore};
//!
//! let store = OracleStore::new(&Config::from_env(), OracleEnvironment::production(transport))?;
//!
//! let request_id = store.submit("2025-01-19").await?;
//! store.fulfill(request_id, b"4.123".to_vec(), Vec::new()).await?;
//!
//! let status = store.status(&request_id).await;
//! assert!(status.fulfilled);
//! ```

/// Actions processed by the reducer
pub mod actions;

/// Outgoing request encoding
pub mod builder;

/// Configuration loaded from the environment
pub mod config;

/// Injected dependencies
pub mod environment;

/// Error types for the store
pub mod error;

/// Prometheus metrics for observability
pub mod metrics;

/// Request lifecycle reducer
pub mod reducer;

/// Store state and derived views
pub mod state;

/// The store runtime
pub mod store;

pub use actions::OracleAction;
pub use builder::{RequestBuilder, RequestPayload, SubmitRequest};
pub use config::{Config, HistorySettings, LifecycleSettings, RequestSettings, RetentionSettings};
pub use environment::OracleEnvironment;
pub use error::StoreError;
pub use reducer::OracleReducer;
pub use state::{OracleState, RequestView};
pub use store::OracleStore;
