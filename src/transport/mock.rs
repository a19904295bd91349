//! In-process transports for tests and demos.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;

use super::{Transport, TransportResult};

/// A payload captured by [`MockTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentPayload {
    pub body: Vec<u8>,
    pub content_type: String,
}

impl SentPayload {
    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the body is not valid JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug)]
struct MockState {
    script: VecDeque<TransportResult>,
    fallback: TransportResult,
    sent: Vec<SentPayload>,
}

/// Records every payload and answers from a script.
///
/// Scripted results are consumed in order; once the script runs out every
/// send gets the fallback result, which is a 200 success unless replaced.
/// Clones share state, so a test can keep one clone while the client owns
/// another.
#[derive(Clone, Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_fallback(TransportResult::success(200))
    }

    pub fn with_fallback(fallback: TransportResult) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                fallback,
                sent: Vec::new(),
            })),
        }
    }

    /// Queue `result` to be returned by the next unscripted send.
    pub fn push_result(&self, result: TransportResult) {
        self.state.lock().script.push_back(result);
    }

    pub fn set_fallback(&self, fallback: TransportResult) {
        self.state.lock().fallback = fallback;
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    pub fn sent(&self) -> Vec<SentPayload> {
        self.state.lock().sent.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send(&self, payload: &[u8], content_type: &str) -> TransportResult {
        let mut state = self.state.lock();
        state.sent.push(SentPayload {
            body: payload.to_vec(),
            content_type: content_type.to_owned(),
        });
        match state.script.pop_front() {
            Some(result) => result,
            None => state.fallback.clone(),
        }
    }
}

/// Wraps a transport with an offline switch.
///
/// While offline every send fails as retryable with status 0 and the inner
/// transport is not called.
#[derive(Debug)]
pub struct SimulatedNetworkTransport<T> {
    inner: T,
    offline: AtomicBool,
}

impl<T: Transport> SimulatedNetworkTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for SimulatedNetworkTransport<T> {
    fn send(&self, payload: &[u8], content_type: &str) -> TransportResult {
        if self.is_offline() {
            return TransportResult::retryable(0, "network offline");
        }
        self.inner.send(payload, content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ResponseClass;

    #[test]
    fn mock_defaults_to_success_and_records() {
        let mock = MockTransport::new();
        let result = mock.send(b"{}", "application/json");
        assert_eq!(result.class(), ResponseClass::Success);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.sent()[0].content_type, "application/json");
    }

    #[test]
    fn mock_consumes_script_before_fallback() {
        let mock = MockTransport::new();
        mock.push_result(TransportResult::retryable(503, "busy"));
        mock.push_result(TransportResult::fatal(400, "bad"));
        let classes: Vec<_> = (0..3).map(|_| mock.send(b"", "x").class()).collect();
        assert_eq!(
            classes,
            [
                ResponseClass::Retryable,
                ResponseClass::Permanent,
                ResponseClass::Success
            ]
        );
    }

    #[test]
    fn clones_share_recordings() {
        let mock = MockTransport::new();
        let handle = mock.clone();
        mock.send(b"a", "x");
        assert_eq!(handle.call_count(), 1);
    }

    #[test]
    fn offline_network_short_circuits() {
        let mock = MockTransport::new();
        let network = SimulatedNetworkTransport::new(mock.clone());
        network.set_offline(true);
        let result = network.send(b"a", "x");
        assert_eq!(result.class(), ResponseClass::Retryable);
        assert_eq!(result.status_code, 0);
        assert_eq!(mock.call_count(), 0);

        network.set_offline(false);
        assert!(network.send(b"a", "x").success);
        assert_eq!(mock.call_count(), 1);
    }
}
