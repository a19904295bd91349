//! Observable client state.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::sanitize::ValidationError;

/// Most recent operational failure, as reported by
/// [`TelemetryStats::last_error`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// An event was dropped or trimmed by the sanitiser.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The batch is still queued and will be retried.
    #[error("retryable delivery failure (status {status}): {message}")]
    Retryable { status: i32, message: String },
    /// The collector rejected the batch; it was dropped.
    #[error("batch rejected (status {status}): {message}")]
    Fatal { status: i32, message: String },
    /// The batch failed `attempts` times in a row and was dropped.
    #[error("batch dropped after {attempts} failed attempts (last status {status}): {message}")]
    RetryExhausted {
        attempts: u32,
        status: i32,
        message: String,
    },
    /// The batch could not be encoded; it was dropped.
    #[error("batch could not be serialised: {0}")]
    Serialise(String),
}

/// Point-in-time view of a client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TelemetryStats {
    pub queued_count: usize,
    /// When the last transport call completed.
    pub last_flush_time: Option<DateTime<Utc>>,
    pub last_error: Option<DeliveryError>,
}
