//! Deterministic payload serialisation.
//!
//! A batch is encoded as a single JSON object:
//!
//! ```json
//! {"events":[{"name":"...","props":{...},"ts":"..."}],"sdkVersion":"...","sessionId":"...","userId":"..."}
//! ```
//!
//! Keys are emitted in ascending ordinal order at every level, so the same
//! logical payload always produces the same bytes. Struct fields below are
//! declared in that order and property maps are `BTreeMap`s; reordering a
//! field breaks the contract.
//!
//! String escaping follows `serde_json`: quote, backslash, `\b`, `\f`, `\n`,
//! `\r` and `\t` use two-character escapes, other control characters use
//! `\u00XX`, and everything else is emitted verbatim. Floats use the shortest
//! representation that round-trips.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{event::Event, value::Properties};

/// Version string stamped into every payload.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Content type of payloads produced by [`JsonEventSerializer`].
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Failure to encode a payload. Sanitised events cannot trigger this; it
/// signals a broken invariant rather than bad input.
#[derive(Debug, Error)]
#[error("failed to serialise payload: {0}")]
pub struct SerialiseError(#[from] serde_json::Error);

/// Identity stamped on each payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PayloadContext {
    pub sdk_version: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl PayloadContext {
    pub fn new(user_id: Option<String>, session_id: Option<String>) -> Self {
        Self {
            sdk_version: SDK_VERSION.to_owned(),
            user_id,
            session_id,
        }
    }
}

/// Encodes batches of events for a transport.
pub trait EventSerializer: Send + Sync {
    /// MIME type sent alongside the payload.
    fn content_type(&self) -> &'static str;

    /// Encode `batch` with `context`.
    ///
    /// # Errors
    ///
    /// Returns [`SerialiseError`] if the underlying encoder fails.
    fn encode(&self, context: &PayloadContext, batch: &[Event]) -> Result<Vec<u8>, SerialiseError>;
}

/// Compact, key-sorted JSON serialiser.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonEventSerializer;

#[derive(Serialize)]
struct WirePayload<'a> {
    events: Vec<WireEvent<'a>>,
    #[serde(rename = "sdkVersion")]
    sdk_version: &'a str,
    #[serde(rename = "sessionId")]
    session_id: &'a str,
    #[serde(rename = "userId")]
    user_id: &'a str,
}

#[derive(Serialize)]
struct WireEvent<'a> {
    name: &'a str,
    props: &'a Properties,
    ts: String,
}

impl<'a> From<&'a Event> for WireEvent<'a> {
    fn from(event: &'a Event) -> Self {
        Self {
            name: event.name(),
            props: event.properties(),
            ts: format_timestamp(event.timestamp()),
        }
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2026-02-19T12:00:00.000Z`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl EventSerializer for JsonEventSerializer {
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    fn encode(&self, context: &PayloadContext, batch: &[Event]) -> Result<Vec<u8>, SerialiseError> {
        let payload = WirePayload {
            events: batch.iter().map(WireEvent::from).collect(),
            sdk_version: &context.sdk_version,
            session_id: context.session_id.as_deref().unwrap_or(""),
            user_id: context.user_id.as_deref().unwrap_or(""),
        };
        Ok(serde_json::to_vec(&payload)?)
    }
}
