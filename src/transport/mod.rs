//! Delivery of encoded batches to a collector.
//!
//! The client hands each encoded batch to a [`Transport`] and acts on the
//! [`TransportResult`] it gets back. Deciding whether a failure is worth
//! retrying belongs to the transport; [`classify_status`] captures the usual
//! HTTP rules for implementations that speak HTTP.

#[cfg(feature = "http")]
mod http;
mod mock;

#[cfg(all(test, feature = "http"))]
mod tests;

use std::sync::Arc;

#[cfg(feature = "http")]
pub use http::{
    AuthConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, HttpTransport,
    HttpTransportConfig, TransportBuildError,
};
pub use mock::{MockTransport, SentPayload, SimulatedNetworkTransport};

/// Classification of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// The collector accepted the batch.
    Success,
    /// Transient failure (connectivity, 429, 5xx). Keep the batch and back off.
    Retryable,
    /// The collector rejected the batch. Retrying would not help.
    Permanent,
}

/// Outcome of a single [`Transport::send`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResult {
    pub success: bool,
    pub retryable: bool,
    /// HTTP status, or 0 when no response was received.
    pub status_code: i32,
    pub error: Option<String>,
}

impl TransportResult {
    pub fn success(status_code: i32) -> Self {
        Self {
            success: true,
            retryable: false,
            status_code,
            error: None,
        }
    }

    pub fn retryable(status_code: i32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            retryable: true,
            status_code,
            error: Some(error.into()),
        }
    }

    pub fn fatal(status_code: i32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            retryable: false,
            status_code,
            error: Some(error.into()),
        }
    }

    /// Build a result from an HTTP status using [`classify_status`].
    pub fn from_status(status: u16) -> Self {
        let code = i32::from(status);
        match classify_status(status) {
            ResponseClass::Success => Self::success(code),
            ResponseClass::Retryable => Self::retryable(code, format!("HTTP {status}")),
            ResponseClass::Permanent => Self::fatal(code, format!("HTTP {status}")),
        }
    }

    pub fn class(&self) -> ResponseClass {
        if self.success {
            ResponseClass::Success
        } else if self.retryable {
            ResponseClass::Retryable
        } else {
            ResponseClass::Permanent
        }
    }

    /// Error text, falling back to a description of the status.
    pub fn message(&self) -> String {
        match &self.error {
            Some(error) => error.clone(),
            None if self.status_code == 0 => "no response".to_owned(),
            None => format!("HTTP {}", self.status_code),
        }
    }
}

/// Sends one encoded batch and reports how it went.
///
/// `send` blocks until the attempt completes. Timeouts and cancellation are
/// the implementation's business; the client never interrupts a send.
pub trait Transport: Send + Sync {
    fn send(&self, payload: &[u8], content_type: &str) -> TransportResult;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, payload: &[u8], content_type: &str) -> TransportResult {
        (**self).send(payload, content_type)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, payload: &[u8], content_type: &str) -> TransportResult {
        (**self).send(payload, content_type)
    }
}

/// Classifies an HTTP status code.
///
/// * **2xx** → [`ResponseClass::Success`]
/// * **429** and **5xx** → [`ResponseClass::Retryable`]
/// * anything else → [`ResponseClass::Permanent`]
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        429 => ResponseClass::Retryable,
        500..=599 => ResponseClass::Retryable,
        _ => ResponseClass::Permanent,
    }
}
