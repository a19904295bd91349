//! Switchable diagnostic logging.
//!
//! Every log line the engine emits goes through [`Diagnostics`] so the
//! `enable_logging` flag silences all of them at once. Lines use the
//! [`LOG_TARGET`] target on the `log` facade; the host picks the logger.

use std::fmt;

/// `log` target used for all engine diagnostics.
pub const LOG_TARGET: &str = "femtotelemetry";

#[derive(Clone, Copy, Debug)]
pub(crate) struct Diagnostics {
    enabled: bool,
}

impl Diagnostics {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub(crate) fn warn(&self, args: fmt::Arguments<'_>) {
        if self.enabled {
            log::warn!(target: LOG_TARGET, "{args}");
        }
    }

    pub(crate) fn info(&self, args: fmt::Arguments<'_>) {
        if self.enabled {
            log::info!(target: LOG_TARGET, "{args}");
        }
    }

    pub(crate) fn debug(&self, args: fmt::Arguments<'_>) {
        if self.enabled {
            log::debug!(target: LOG_TARGET, "{args}");
        }
    }
}
