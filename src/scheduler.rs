//! Driving clients' clocks from the host.
//!
//! Clients never start timers of their own. The host either calls
//! [`FemtoTelemetryClient::tick`] from its own loop or hands a [`TickDriver`]
//! to [`spawn_ticker`], which ticks every registered client from a dedicated
//! thread using real elapsed time.

use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};

use crate::client::FemtoTelemetryClient;

/// Shortest period accepted by [`spawn_ticker`].
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// An explicit list of clients ticked together.
#[derive(Clone, Debug, Default)]
pub struct TickDriver {
    clients: Vec<FemtoTelemetryClient>,
}

impl TickDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, client: FemtoTelemetryClient) {
        self.clients.push(client);
    }

    pub fn clients(&self) -> &[FemtoTelemetryClient] {
        &self.clients
    }

    /// Tick every client by `delta`. Returns how many auto-flushes started;
    /// their handles are detached.
    pub fn tick(&self, delta: Duration) -> usize {
        self.clients
            .iter()
            .filter_map(|client| client.tick(delta))
            .count()
    }
}

impl FromIterator<FemtoTelemetryClient> for TickDriver {
    fn from_iter<T: IntoIterator<Item = FemtoTelemetryClient>>(iter: T) -> Self {
        Self {
            clients: iter.into_iter().collect(),
        }
    }
}

/// Stops the ticker thread when dropped.
#[derive(Debug)]
pub struct TickerHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TickerHandle {
    /// Stop ticking and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // Ignore send error: the thread may already be gone.
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Tick `driver` roughly every `period` on a background thread.
///
/// Each tick passes the time actually elapsed since the previous one, so a
/// late wake-up is not lost. `period` is raised to [`MIN_TICK_PERIOD`].
pub fn spawn_ticker(driver: TickDriver, period: Duration) -> TickerHandle {
    let period = period.max(MIN_TICK_PERIOD);
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let thread = thread::spawn(move || {
        let mut last = Instant::now();
        loop {
            match stop_rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    driver.tick(now.duration_since(last));
                    last = now;
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });
    TickerHandle {
        stop_tx: Some(stop_tx),
        thread: Some(thread),
    }
}
