//! The telemetry client: track, queue, batch, send, settle.
//!
//! [`FemtoTelemetryClient`] is a cheap handle around shared state. `track`
//! sanitises and enqueues; `flush_up_to` drains the queue in batches through
//! the transport and applies the outcome of each send:
//!
//! - success drops the batch and clears retry state;
//! - a retryable failure keeps the batch and arms a jittered cooldown, or
//!   drops it once `max_attempts` is exceeded;
//! - a fatal failure drops the batch.
//!
//! At most one flush runs at a time. A flush requested while another is in
//! flight, or while a cooldown is active, does nothing. The queue lock is never
//! held across a transport call, so `track` keeps accepting events while a
//! batch is outstanding.

mod config;
mod flush;
mod stats;


use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use parking_lot::Mutex;

pub use config::{
    ClientConfig, ClientConfigBuilder, ConfigError, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BATCHES_PER_FLUSH,
    DEFAULT_MAX_DISK_BYTES, DEFAULT_MAX_EVENTS_PER_BATCH, DEFAULT_MAX_RETRY_ATTEMPTS,
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_MAX_DELAY, PersistenceConfig, RetryConfig,
};
pub use flush::{FlushAborted, FlushHandle, FlushReport, RetryState, StopReason};
pub use stats::{DeliveryError, TelemetryStats};

use crate::{
    diagnostics::Diagnostics,
    event::Event,
    queue::{DurableEventQueue, EventQueue, MemoryEventQueue},
    rate_limited_warner::RateLimitedWarner,
    retry::{RandomSource, RetryPolicy, SystemRandom},
    sanitize::{self, ValidationError},
    serialise::{EventSerializer, JsonEventSerializer, PayloadContext},
    transport::{ResponseClass, Transport, TransportResult},
    value::PropertyValue,
};

use flush::FlushGuard;

/// Handle to a telemetry pipeline. Clones share the same queue and state.
#[derive(Clone)]
pub struct FemtoTelemetryClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    endpoint: String,
    batch_size: usize,
    batches_per_flush: usize,
    flush_interval: Duration,
    auto_flush: bool,
    retry_enabled: bool,
    policy: RetryPolicy,
    transport: Box<dyn Transport>,
    serializer: Box<dyn EventSerializer>,
    diagnostics: Diagnostics,
    validation_drops: RateLimitedWarner,
    queue: Mutex<Box<dyn EventQueue>>,
    /// Mirrors the queue length so `stats` never waits on queue I/O.
    queued: AtomicUsize,
    flushing: AtomicBool,
    shared: Mutex<Shared>,
}

#[derive(Default)]
struct Shared {
    context: PayloadContext,
    retry: RetryState,
    last_flush_time: Option<chrono::DateTime<Utc>>,
    last_error: Option<DeliveryError>,
    since_auto_flush: Duration,
}

/// How a single batch settled.
enum Settled {
    Continue,
    Stop(StopReason),
}

impl FemtoTelemetryClient {
    /// Create a client that jitters retries with an entropy-seeded RNG.
    ///
    /// Never fails. Out-of-range values are clamped: batch sizes to at least
    /// one, the disk cap to 1024 bytes, retry delays as described on
    /// [`RetryPolicy::new`]. If persistence is enabled the queue is loaded from
    /// disk before this returns.
    pub fn new(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self::with_random(config, transport, Arc::new(SystemRandom::new()))
    }

    /// Create a client with a specific jitter source.
    pub fn with_random(
        config: ClientConfig,
        transport: impl Transport + 'static,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self::with_serializer(config, transport, JsonEventSerializer, random)
    }

    /// Create a client with a custom payload encoding.
    pub fn with_serializer(
        config: ClientConfig,
        transport: impl Transport + 'static,
        serializer: impl EventSerializer + 'static,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let diagnostics = Diagnostics::new(config.enable_logging);
        let queue = open_queue(&config, diagnostics);
        let queued = queue.len();
        let policy = RetryPolicy::new(
            config.retry.base_delay,
            config.retry.max_delay,
            config.retry.max_attempts,
            random,
        );
        diagnostics.info(format_args!(
            "telemetry client for {:?} started with {queued} queued events",
            config.endpoint
        ));
        Self {
            inner: Arc::new(ClientInner {
                endpoint: config.endpoint,
                batch_size: config.max_events_per_batch.max(1),
                batches_per_flush: config.max_batches_per_flush.max(1),
                flush_interval: config.flush_interval,
                auto_flush: config.enable_auto_flush,
                retry_enabled: config.retry.enabled,
                policy,
                transport: Box::new(transport),
                serializer: Box::new(serializer),
                diagnostics,
                validation_drops: RateLimitedWarner::default(),
                queue: Mutex::new(queue),
                queued: AtomicUsize::new(queued),
                flushing: AtomicBool::new(false),
                shared: Mutex::new(Shared {
                    context: PayloadContext::new(None, None),
                    ..Shared::default()
                }),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Set the user id stamped on later payloads.
    pub fn set_user_id(&self, user_id: Option<String>) {
        self.inner.shared.lock().context.user_id = user_id;
    }

    /// Set the session id stamped on later payloads.
    pub fn set_session_id(&self, session_id: Option<String>) {
        self.inner.shared.lock().context.session_id = session_id;
    }

    /// Record an event.
    ///
    /// The event is sanitised and appended to the queue. A blank name drops
    /// the event; elided properties are noted in [`TelemetryStats::last_error`]
    /// but the event is kept. Never fails and never waits on the transport.
    pub fn track<I, K, V>(&self, name: &str, properties: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        self.inner.track(name, properties);
    }

    /// Record an event without properties.
    pub fn track_event(&self, name: &str) {
        self.inner
            .track(name, std::iter::empty::<(String, PropertyValue)>());
    }

    /// Start a flush of up to `max_batches_per_flush` batches on a background
    /// thread and return immediately.
    ///
    /// If a cooldown is active or a flush is already running, the returned
    /// handle is already complete and reports why nothing happened.
    pub fn flush(&self) -> FlushHandle {
        let inner = &self.inner;
        if let Some(reason) = inner.skip_reason() {
            return FlushHandle::ready(FlushReport::skipped(reason));
        }
        let inner = Arc::clone(inner);
        FlushHandle::spawn(move || inner.flush_up_to(inner.batches_per_flush))
    }

    /// Flush on the calling thread, sending at most `max_batches` batches
    /// (at least one).
    pub fn flush_up_to(&self, max_batches: usize) -> FlushReport {
        self.inner.flush_up_to(max_batches)
    }

    /// Flush a single batch on the calling thread.
    pub fn flush_once(&self) -> FlushReport {
        self.flush_up_to(1)
    }

    /// Advance the client's clock by `delta`.
    ///
    /// Counts down any retry cooldown and, when auto-flush is enabled, starts
    /// a background flush once the interval has elapsed with events queued.
    /// Returns the flush handle if one was started.
    pub fn tick(&self, delta: Duration) -> Option<FlushHandle> {
        self.inner.advance(delta).then(|| self.flush())
    }

    pub fn stats(&self) -> TelemetryStats {
        let inner = &self.inner;
        let shared = inner.shared.lock();
        TelemetryStats {
            queued_count: inner.queued.load(Ordering::Acquire),
            last_flush_time: shared.last_flush_time,
            last_error: shared.last_error.clone(),
        }
    }

    pub fn retry_state(&self) -> RetryState {
        self.inner.shared.lock().retry
    }

    /// Whether a flush is currently running.
    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FemtoTelemetryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FemtoTelemetryClient")
            .field("endpoint", &self.inner.endpoint)
            .field("queued", &self.inner.queued.load(Ordering::Relaxed))
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

fn open_queue(config: &ClientConfig, diagnostics: Diagnostics) -> Box<dyn EventQueue> {
    if !config.persistence.enabled {
        return Box::new(MemoryEventQueue::new());
    }
    let Some(base) = config
        .persistence
        .storage_path
        .clone()
        .or_else(dirs::data_local_dir)
    else {
        diagnostics.warn(format_args!(
            "no local data directory available; queued events will not persist"
        ));
        return Box::new(MemoryEventQueue::new());
    };
    Box::new(DurableEventQueue::open_with(
        &base,
        config.persistence.max_disk_bytes,
        diagnostics,
    ))
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.validation_drops.flush(|count| {
            self.diagnostics.warn(format_args!(
                "dropped {count} events that failed validation since the last report"
            ));
        });
    }
}

impl ClientInner {
    fn track<I, K, V>(&self, name: &str, properties: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        let sanitized = match sanitize::sanitize(name, properties) {
            Ok(sanitized) => sanitized,
            Err(err) => {
                self.validation_drops.record_drop();
                self.validation_drops.warn_if_due(|count| {
                    self.diagnostics.warn(format_args!(
                        "dropped {count} events that failed validation: {err}"
                    ));
                });
                self.shared.lock().last_error = Some(err.into());
                return;
            }
        };

        if sanitized.elided > 0 {
            let err = ValidationError::PropertiesElided {
                event: sanitized.name.clone(),
                count: sanitized.elided,
            };
            self.diagnostics.debug(format_args!("{err}"));
            self.shared.lock().last_error = Some(err.into());
        }

        let event = Event::new(sanitized.name, Utc::now(), sanitized.properties);
        let mut queue = self.queue.lock();
        queue.enqueue(event);
        self.queued.store(queue.len(), Ordering::Release);
    }

    fn skip_reason(&self) -> Option<StopReason> {
        if self.cooling_down() {
            Some(StopReason::CoolingDown)
        } else if self.flushing.load(Ordering::Acquire) {
            Some(StopReason::InFlight)
        } else {
            None
        }
    }

    /// Move the clocks forward. Returns whether an auto-flush is due.
    fn advance(&self, delta: Duration) -> bool {
        let mut shared = self.shared.lock();
        if self.retry_enabled {
            shared.retry.cooldown_remaining = shared.retry.cooldown_remaining.saturating_sub(delta);
        }
        if !self.auto_flush {
            return false;
        }
        shared.since_auto_flush = shared.since_auto_flush.saturating_add(delta);
        if shared.since_auto_flush >= self.flush_interval && self.queued.load(Ordering::Acquire) > 0 {
            shared.since_auto_flush = Duration::ZERO;
            return true;
        }
        false
    }

    fn cooling_down(&self) -> bool {
        self.retry_enabled && !self.shared.lock().retry.cooldown_remaining.is_zero()
    }

    fn flush_up_to(&self, max_batches: usize) -> FlushReport {
        if self.cooling_down() {
            return FlushReport::skipped(StopReason::CoolingDown);
        }
        let Some(_guard) = FlushGuard::acquire(&self.flushing) else {
            return FlushReport::skipped(StopReason::InFlight);
        };
        // A flush that held the latch may have armed a cooldown since the
        // first check.
        if self.cooling_down() {
            return FlushReport::skipped(StopReason::CoolingDown);
        }

        let max_batches = max_batches.max(1);
        let mut report = FlushReport::default();
        loop {
            let batch = {
                let queue = self.queue.lock();
                if queue.is_empty() {
                    report.stopped = StopReason::QueueEmpty;
                    break;
                }
                if report.batches_sent >= max_batches {
                    report.stopped = StopReason::BatchLimit;
                    break;
                }
                queue.peek_batch(self.batch_size)
            };
            if batch.is_empty() {
                report.stopped = StopReason::QueueEmpty;
                break;
            }
            if let Settled::Stop(reason) = self.send_batch(&batch, &mut report) {
                report.stopped = reason;
                break;
            }
        }

        self.diagnostics.debug(format_args!(
            "flush finished: {} batches, {} delivered, {} dropped, stopped: {:?}",
            report.batches_sent, report.events_delivered, report.events_dropped, report.stopped
        ));
        report
    }

    fn send_batch(&self, batch: &[Event], report: &mut FlushReport) -> Settled {
        let context = self.shared.lock().context.clone();
        let payload = match self.serializer.encode(&context, batch) {
            Ok(payload) => payload,
            Err(err) => {
                self.diagnostics.warn(format_args!(
                    "dropping batch of {} events that could not be serialised: {err}",
                    batch.len()
                ));
                self.drop_head(batch.len());
                report.events_dropped += batch.len();
                let mut shared = self.shared.lock();
                shared.last_error = Some(DeliveryError::Serialise(err.to_string()));
                shared.retry = RetryState::default();
                return Settled::Stop(StopReason::Rejected);
            }
        };

        let result = self
            .transport
            .send(&payload, self.serializer.content_type());
        report.batches_sent += 1;
        self.shared.lock().last_flush_time = Some(Utc::now());

        match result.class() {
            ResponseClass::Success => {
                self.drop_head(batch.len());
                report.events_delivered += batch.len();
                let mut shared = self.shared.lock();
                shared.last_error = None;
                shared.retry = RetryState::default();
                Settled::Continue
            }
            ResponseClass::Retryable => self.settle_retryable(batch.len(), &result, report),
            ResponseClass::Permanent => {
                self.diagnostics.warn(format_args!(
                    "collector rejected batch of {} events (status {}); dropping it: {}",
                    batch.len(),
                    result.status_code,
                    result.message()
                ));
                self.drop_head(batch.len());
                report.events_dropped += batch.len();
                let mut shared = self.shared.lock();
                shared.last_error = Some(DeliveryError::Fatal {
                    status: result.status_code,
                    message: result.message(),
                });
                shared.retry = RetryState::default();
                Settled::Stop(StopReason::Rejected)
            }
        }
    }

    fn settle_retryable(
        &self,
        batch_len: usize,
        result: &TransportResult,
        report: &mut FlushReport,
    ) -> Settled {
        let status = result.status_code;
        let message = result.message();

        if !self.retry_enabled {
            self.diagnostics.warn(format_args!(
                "delivery failed (status {status}): {message}; batch kept, retry disabled"
            ));
            self.shared.lock().last_error = Some(DeliveryError::Retryable { status, message });
            return Settled::Stop(StopReason::Retryable);
        }

        let attempt = {
            let mut shared = self.shared.lock();
            shared.retry.attempt = shared.retry.attempt.saturating_add(1);
            shared.retry.attempt
        };

        if attempt > self.policy.max_attempts() {
            self.diagnostics.warn(format_args!(
                "giving up on batch of {batch_len} events after {attempt} failed attempts (status {status}): {message}"
            ));
            self.drop_head(batch_len);
            report.events_dropped += batch_len;
            let mut shared = self.shared.lock();
            shared.last_error = Some(DeliveryError::RetryExhausted {
                attempts: attempt,
                status,
                message,
            });
            shared.retry = RetryState::default();
            return Settled::Stop(StopReason::GaveUp);
        }

        let cooldown = self.policy.delay(attempt);
        self.diagnostics.warn(format_args!(
            "delivery failed (status {status}): {message}; attempt {attempt}, retrying in {cooldown:?}"
        ));
        let mut shared = self.shared.lock();
        shared.retry.cooldown_remaining = cooldown;
        shared.last_error = Some(DeliveryError::Retryable { status, message });
        Settled::Stop(StopReason::Retryable)
    }

    fn drop_head(&self, count: usize) {
        let mut queue = self.queue.lock();
        queue.drop_batch(count);
        self.queued.store(queue.len(), Ordering::Release);
    }
}
