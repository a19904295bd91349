//! Flush bookkeeping: the single-flight latch, reports, and handles.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use thiserror::Error;

/// Retry progress for the batch at the head of the queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Consecutive retryable failures.
    pub attempt: u32,
    /// Time left before another flush may start.
    pub cooldown_remaining: Duration,
}

/// Why a flush stopped sending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopReason {
    /// A retry cooldown was active; nothing was attempted.
    CoolingDown,
    /// Another flush was already running; nothing was attempted.
    InFlight,
    /// Everything queued was delivered or dropped.
    #[default]
    QueueEmpty,
    /// The batch limit for this flush was reached with events left.
    BatchLimit,
    /// A retryable failure left the batch queued.
    Retryable,
    /// The batch was dropped after too many retryable failures.
    GaveUp,
    /// The batch was rejected and dropped.
    Rejected,
}

/// Summary of one flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Transport calls made.
    pub batches_sent: usize,
    pub events_delivered: usize,
    /// Events removed without delivery (rejected or given up on).
    pub events_dropped: usize,
    pub stopped: StopReason,
}

impl FlushReport {
    pub(crate) fn skipped(stopped: StopReason) -> Self {
        Self {
            stopped,
            ..Self::default()
        }
    }
}

/// Holds the in-flight latch; released on drop, panics included.
pub(crate) struct FlushGuard<'a> {
    latch: &'a AtomicBool,
}

impl<'a> FlushGuard<'a> {
    /// Take the latch, or `None` if a flush is already running.
    pub(crate) fn acquire(latch: &'a AtomicBool) -> Option<Self> {
        latch
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { latch })
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.latch.store(false, Ordering::Release);
    }
}

/// The flush thread ended without producing a report.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("flush worker exited without reporting")]
pub struct FlushAborted;

/// Completion handle for [`FemtoTelemetryClient::flush`](crate::FemtoTelemetryClient::flush).
///
/// Dropping the handle detaches the flush; it still runs to completion.
#[derive(Debug)]
pub struct FlushHandle {
    rx: Receiver<FlushReport>,
    thread: Option<JoinHandle<()>>,
}

impl FlushHandle {
    /// A handle for a flush that has already finished.
    pub(crate) fn ready(report: FlushReport) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(report);
        Self { rx, thread: None }
    }

    /// Run `flush` on its own thread.
    pub(crate) fn spawn(flush: impl FnOnce() -> FlushReport + Send + 'static) -> Self {
        let (tx, rx) = bounded(1);
        let thread = thread::spawn(move || {
            // Ignore send error: the handle may have been dropped.
            let _ = tx.send(flush());
        });
        Self {
            rx,
            thread: Some(thread),
        }
    }

    /// Block until the flush finishes.
    ///
    /// # Errors
    ///
    /// Returns [`FlushAborted`] if the flush thread panicked.
    pub fn wait(self) -> Result<FlushReport, FlushAborted> {
        let report = self.rx.recv().map_err(|_| FlushAborted);
        if let Some(thread) = self.thread {
            let _ = thread.join();
        }
        report
    }

    /// Wait up to `timeout`. On timeout the handle is handed back so the
    /// caller can keep waiting.
    ///
    /// # Errors
    ///
    /// Returns `Err(Ok(handle))` on timeout and `Err(Err(FlushAborted))` if
    /// the flush thread panicked.
    pub fn wait_timeout(self, timeout: Duration) -> Result<FlushReport, Result<Self, FlushAborted>> {
        match self.rx.recv_timeout(timeout) {
            Ok(report) => {
                if let Some(thread) = self.thread {
                    let _ = thread.join();
                }
                Ok(report)
            }
            Err(RecvTimeoutError::Timeout) => Err(Ok(self)),
            Err(RecvTimeoutError::Disconnected) => Err(Err(FlushAborted)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }
}
