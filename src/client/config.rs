//! Client configuration and its validating builder.
//!
//! [`ClientConfig`] is a plain struct so hosts can fill it in directly;
//! [`ClientConfigBuilder`] is the checked route that rejects nonsense values
//! before a client exists. The client itself never fails to construct: it
//! clamps whatever it is handed into a usable range.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Default number of events per batch.
pub const DEFAULT_MAX_EVENTS_PER_BATCH: usize = 25;
/// Default number of batches sent by one flush.
pub const DEFAULT_MAX_BATCHES_PER_FLUSH: usize = 4;
/// Default auto-flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Default soft cap on the durable snapshot size.
pub const DEFAULT_MAX_DISK_BYTES: u64 = 5_000_000;
/// Default number of retryable failures tolerated per batch.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Invalid configuration rejected by [`ClientConfigBuilder::build`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Durable queue settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// Soft cap on the snapshot file. Raised to 1024 bytes if smaller.
    pub max_disk_bytes: u64,
    /// Base directory for the queue. `None` uses the platform's local data
    /// directory.
    pub storage_path: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
            storage_path: None,
        }
    }
}

/// Retry and backoff settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Retryable failures tolerated for one batch before it is dropped.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

/// Everything a [`FemtoTelemetryClient`](crate::FemtoTelemetryClient) needs
/// besides its transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Collector identity, used in diagnostics. The transport owns the
    /// actual address.
    pub endpoint: String,
    pub max_events_per_batch: usize,
    pub max_batches_per_flush: usize,
    pub flush_interval: Duration,
    pub enable_auto_flush: bool,
    pub enable_logging: bool,
    pub persistence: PersistenceConfig,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            max_events_per_batch: DEFAULT_MAX_EVENTS_PER_BATCH,
            max_batches_per_flush: DEFAULT_MAX_BATCHES_PER_FLUSH,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            enable_auto_flush: true,
            enable_logging: true,
            persistence: PersistenceConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// Builder for [`ClientConfig`]. Unset fields take the [`Default`] values.
#[derive(Clone, Debug, Default)]
pub struct ClientConfigBuilder {
    endpoint: Option<String>,
    max_events_per_batch: Option<usize>,
    max_batches_per_flush: Option<usize>,
    flush_interval_secs: Option<f64>,
    enable_auto_flush: Option<bool>,
    enable_logging: Option<bool>,
    enable_persistence: Option<bool>,
    max_disk_bytes: Option<u64>,
    storage_path: Option<PathBuf>,
    enable_retry: Option<bool>,
    max_retry_attempts: Option<u32>,
    retry_base_delay_secs: Option<f64>,
    retry_max_delay_secs: Option<f64>,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collector endpoint (required).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Override the storage directory for the durable queue.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    option_setter!(
        /// Events per batch. Must be greater than zero.
        with_max_events_per_batch,
        max_events_per_batch,
        usize
    );
    option_setter!(
        /// Batches per flush. Must be greater than zero.
        with_max_batches_per_flush,
        max_batches_per_flush,
        usize
    );
    option_setter!(
        /// Auto-flush interval in seconds.
        with_flush_interval_secs,
        flush_interval_secs,
        f64
    );
    option_setter!(with_auto_flush, enable_auto_flush, bool);
    option_setter!(with_logging, enable_logging, bool);
    option_setter!(with_persistence, enable_persistence, bool);
    option_setter!(
        /// Soft cap on the snapshot size in bytes. Must be greater than zero.
        with_max_disk_bytes,
        max_disk_bytes,
        u64
    );
    option_setter!(with_retry, enable_retry, bool);
    option_setter!(with_max_retry_attempts, max_retry_attempts, u32);
    option_setter!(with_retry_base_delay_secs, retry_base_delay_secs, f64);
    option_setter!(with_retry_max_delay_secs, retry_max_delay_secs, f64);

    /// Validate the settings and produce a [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] when the endpoint is missing or
    /// blank, a count or byte cap is zero, a duration is negative or not
    /// finite, or auto-flush is enabled with a zero interval.
    pub fn build(&self) -> Result<ClientConfig, ConfigError> {
        let defaults = ClientConfig::default();

        let endpoint = match self.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => endpoint.to_owned(),
            _ => {
                return Err(ConfigError::InvalidConfig(
                    "endpoint must be provided".into(),
                ));
            }
        };

        let max_events_per_batch = ensure_positive!(
            self.max_events_per_batch
                .unwrap_or(defaults.max_events_per_batch),
            "max_events_per_batch"
        )?;
        let max_batches_per_flush = ensure_positive!(
            self.max_batches_per_flush
                .unwrap_or(defaults.max_batches_per_flush),
            "max_batches_per_flush"
        )?;
        let max_disk_bytes = ensure_positive!(
            self.max_disk_bytes
                .unwrap_or(defaults.persistence.max_disk_bytes),
            "max_disk_bytes"
        )?;

        let flush_interval = seconds(
            self.flush_interval_secs,
            defaults.flush_interval,
            "flush_interval",
        )?;
        let enable_auto_flush = self.enable_auto_flush.unwrap_or(defaults.enable_auto_flush);
        if enable_auto_flush && flush_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "flush_interval must be greater than zero when auto-flush is enabled".into(),
            ));
        }

        let base_delay = seconds(
            self.retry_base_delay_secs,
            defaults.retry.base_delay,
            "retry_base_delay",
        )?;
        let max_delay = seconds(
            self.retry_max_delay_secs,
            defaults.retry.max_delay,
            "retry_max_delay",
        )?;

        Ok(ClientConfig {
            endpoint,
            max_events_per_batch,
            max_batches_per_flush,
            flush_interval,
            enable_auto_flush,
            enable_logging: self.enable_logging.unwrap_or(defaults.enable_logging),
            persistence: PersistenceConfig {
                enabled: self
                    .enable_persistence
                    .unwrap_or(defaults.persistence.enabled),
                max_disk_bytes,
                storage_path: self.storage_path.clone(),
            },
            retry: RetryConfig {
                enabled: self.enable_retry.unwrap_or(defaults.retry.enabled),
                max_attempts: self.max_retry_attempts.unwrap_or(defaults.retry.max_attempts),
                base_delay,
                max_delay,
            },
        })
    }
}

fn seconds(value: Option<f64>, default: Duration, field: &str) -> Result<Duration, ConfigError> {
    let Some(secs) = value else {
        return Ok(default);
    };
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ConfigError::InvalidConfig(format!(
            "{field} must be a finite, non-negative number of seconds (got {secs})"
        ))
    })
}
