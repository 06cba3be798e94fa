//! Error types for relay-publish.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a broker client, either at enqueue or on delivery.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Topic is not provisioned on this broker.
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    /// Enqueue buffer is full; the record was not accepted.
    #[error("broker queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// Broker is shut down.
    #[error("broker is closed")]
    Closed,

    /// Delivery did not complete within the configured bound.
    #[error("delivery timed out after {0} ms")]
    Timeout(u128),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BrokerError {
    BrokerError::Io {
        path: path.into(),
        source,
    }
}
