//! Client configurations and helpers shared by the integration tests.
//!
//! Every fixture disables logging and auto-flush so a test only sees the
//! flushes it asks for.

#![allow(dead_code)]

use std::{path::Path, sync::Arc, time::Duration};

use femtotelemetry::{
    ClientConfig, FemtoTelemetryClient, FixedRandom, PersistenceConfig, PropertyValue,
    RetryConfig, Transport,
};
use rstest::fixture;

/// Volatile queue, batches of two, up to ten batches per flush.
#[fixture]
pub fn memory_config() -> ClientConfig {
    ClientConfig {
        endpoint: "https://collector.example/v1/events".into(),
        max_events_per_batch: 2,
        max_batches_per_flush: 10,
        flush_interval: Duration::from_secs(1),
        enable_auto_flush: false,
        enable_logging: false,
        persistence: PersistenceConfig {
            enabled: false,
            ..PersistenceConfig::default()
        },
        retry: RetryConfig {
            enabled: true,
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        },
    }
}

/// [`memory_config`] with the durable queue stored under `dir`.
pub fn durable_config(dir: &Path) -> ClientConfig {
    let mut config = memory_config();
    config.persistence = PersistenceConfig {
        enabled: true,
        max_disk_bytes: 5_000_000,
        storage_path: Some(dir.to_path_buf()),
    };
    config
}

/// A client whose retry jitter always takes the full cap.
pub fn client_with(config: ClientConfig, transport: impl Transport + 'static) -> FemtoTelemetryClient {
    FemtoTelemetryClient::with_random(config, transport, Arc::new(FixedRandom(1.0)))
}

/// Track `evt0..evt{n-1}`, each with an `i` property.
pub fn track_numbered(client: &FemtoTelemetryClient, n: usize) {
    for i in 0..n {
        client.track(&format!("evt{i}"), [("i", PropertyValue::from(i))]);
    }
}
