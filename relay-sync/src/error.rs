//! Error types for relay-sync.

use std::time::Duration;

use thiserror::Error;

use relay_core::StoreError;

/// Failures that end a run with status FAILED.
///
/// Per-record publish failures are not here: they are logged and skipped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The record store rejected a query or the mark-synced write.
    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    /// A store call did not answer within the configured bound.
    #[error("record store call '{operation}' timed out after {} ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Why a start request was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("job already running")]
    AlreadyRunning,

    #[error("bulk sync is disabled")]
    Disabled,

    /// `trigger_manual` needs a tokio runtime to host the worker.
    #[error("no async runtime available to run the job")]
    NoRuntime,
}
