//! Canonical telemetry event.

use chrono::{DateTime, Utc};

use crate::value::Properties;

/// A sanitised event ready for queueing.
///
/// Events are immutable once built. Timestamps are held at millisecond
/// precision, which is what the durable snapshot stores, so an event reloaded
/// from disk compares equal to the one that was written.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    name: String,
    timestamp: DateTime<Utc>,
    properties: Properties,
}

impl Event {
    /// Build an event from already-sanitised parts.
    ///
    /// Callers outside the engine should go through
    /// [`FemtoTelemetryClient::track`](crate::FemtoTelemetryClient::track),
    /// which applies the sanitiser first.
    pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>, properties: Properties) -> Self {
        Self {
            name: name.into(),
            timestamp: truncate_to_millis(timestamp),
            properties,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}
