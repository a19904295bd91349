//! Client-side telemetry buffering and delivery.
//!
//! Applications record named events with structured properties through a
//! [`FemtoTelemetryClient`]. Events are sanitised, held in a queue (optionally
//! mirrored to disk), and delivered to a collector in batches through a
//! [`Transport`], with bounded, jittered retry when the collector is
//! unreachable.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use femtotelemetry::{ClientConfig, FemtoTelemetryClient, MockTransport, PropertyValue};
//!
//! let config = ClientConfig::builder()
//!     .with_endpoint("https://collector.example/v1/events")
//!     .build()?;
//! let client = FemtoTelemetryClient::new(config, MockTransport::new());
//! client.track("level_complete", [("level", PropertyValue::from(3))]);
//! client.tick(Duration::from_secs(5));
//! # Ok::<(), femtotelemetry::ConfigError>(())
//! ```

mod client;
mod diagnostics;
mod event;
pub mod queue;
pub mod rate_limited_warner;
pub mod retry;
pub mod sanitize;
pub mod scheduler;
pub mod serialise;
pub mod transport;
mod value;

pub use client::{
    ClientConfig, ClientConfigBuilder, ConfigError, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_MAX_BATCHES_PER_FLUSH, DEFAULT_MAX_DISK_BYTES, DEFAULT_MAX_EVENTS_PER_BATCH,
    DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_MAX_DELAY,
    DeliveryError, FemtoTelemetryClient, FlushAborted, FlushHandle, FlushReport,
    PersistenceConfig, RetryConfig, RetryState, StopReason, TelemetryStats,
};
pub use diagnostics::LOG_TARGET;
pub use event::Event;
pub use queue::{DurableEventQueue, EventQueue, MemoryEventQueue};
pub use retry::{FixedRandom, RandomSource, RetryPolicy, SystemRandom};
pub use sanitize::{Sanitized, ValidationError, sanitize};
pub use scheduler::{TickDriver, TickerHandle, spawn_ticker};
pub use serialise::{EventSerializer, JsonEventSerializer, PayloadContext, SDK_VERSION};
#[cfg(feature = "http")]
pub use transport::{AuthConfig, HttpTransport, HttpTransportConfig};
pub use transport::{
    MockTransport, ResponseClass, SimulatedNetworkTransport, Transport, TransportResult,
    classify_status,
};
pub use value::{Properties, PropertyValue, Value};
