//! Errors returned by [`OracleStore`](crate::store::OracleStore).

use oracle_relay_core::OracleError;
use thiserror::Error;

/// Store operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The reducer rejected the command; state is unchanged
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Store is shutting down and not accepting new commands
    #[error("Store is shutting down")]
    ShutdownInProgress,

    /// Shutdown timed out with effects still running
    #[error("Shutdown timed out with {0} effects still running")]
    ShutdownTimeout(usize),
}
