//! A transport that blocks inside `send` until the test lets it go.

#![allow(dead_code)]

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use femtotelemetry::{MockTransport, Transport, TransportResult};

pub struct GatedTransport {
    inner: MockTransport,
    entered: Sender<()>,
    release: Receiver<()>,
}

/// Test-side controls for a [`GatedTransport`].
pub struct Gate {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl Gate {
    /// Wait until a send is parked in the transport.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(5))
            .expect("transport was not entered");
    }

    /// Let one parked send complete.
    pub fn release_one(&self) {
        self.release.send(()).expect("transport dropped");
    }
}

pub fn gated(inner: MockTransport) -> (GatedTransport, Gate) {
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    (
        GatedTransport {
            inner,
            entered: entered_tx,
            release: release_rx,
        },
        Gate {
            entered: entered_rx,
            release: release_tx,
        },
    )
}

impl Transport for GatedTransport {
    fn send(&self, payload: &[u8], content_type: &str) -> TransportResult {
        let _ = self.entered.send(());
        if self.release.recv_timeout(Duration::from_secs(5)).is_err() {
            return TransportResult::retryable(0, "gate never opened");
        }
        self.inner.send(payload, content_type)
    }
}
