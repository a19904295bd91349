//! Event sanitisation.
//!
//! [`sanitize`] turns a caller-supplied event name and property bag into the
//! canonical form stored by the queue. Only a blank name rejects the whole
//! event; every other problem is handled by eliding the offending value and
//! carrying on, so a single bad property never costs the caller the event.
//!
//! Rules:
//!
//! - Names and keys are trimmed; blank keys are dropped. Both are truncated to
//!   [`MAX_NAME_LENGTH`] / [`MAX_KEY_LENGTH`] characters.
//! - Keys that collide after trimming and truncation keep the first value.
//! - At most [`MAX_PROPERTIES`] top-level properties are accepted, in input
//!   order. Nested containers are bounded by depth only.
//! - String values are truncated to [`MAX_STRING_LENGTH`] characters.
//! - Nulls, unsupported values, non-finite floats, and containers nested
//!   deeper than [`MAX_DEPTH`] levels (the property bag is level 1) are
//!   dropped.

use chrono::SecondsFormat;
use thiserror::Error;

use crate::value::{Properties, PropertyValue, Value};

pub const MAX_NAME_LENGTH: usize = 64;
pub const MAX_KEY_LENGTH: usize = 64;
pub const MAX_PROPERTIES: usize = 50;
pub const MAX_STRING_LENGTH: usize = 256;
pub const MAX_DEPTH: usize = 3;

/// Reasons an event (or part of one) did not survive sanitisation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The event name was empty or whitespace only; the event is dropped.
    #[error("event name is empty")]
    EmptyName,
    /// The event was kept but some of its properties were dropped.
    #[error("event `{event}`: {count} propert{} elided", if *count == 1 { "y" } else { "ies" })]
    PropertiesElided { event: String, count: usize },
}

/// Canonical event parts produced by [`sanitize`].
#[derive(Clone, Debug, PartialEq)]
pub struct Sanitized {
    pub name: String,
    pub properties: Properties,
    /// Number of values dropped anywhere in the property tree, including
    /// entries past the top-level cap.
    pub elided: usize,
}

/// Validate and normalise an event.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyName`] when `name` is blank. No other input
/// causes an error.
pub fn sanitize<I, K, V>(name: &str, properties: I) -> Result<Sanitized, ValidationError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropertyValue>,
{
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let mut elided = 0;
    let mut accepted = Properties::new();
    let mut entries = properties.into_iter();

    for (key, value) in entries.by_ref() {
        let Some(key) = normalise_key(&key.into()) else {
            elided += 1;
            continue;
        };
        if accepted.contains_key(&key) {
            elided += 1;
            continue;
        }
        match sanitize_value(value.into(), 1, &mut elided) {
            Some(value) => {
                accepted.insert(key, value);
            }
            None => elided += 1,
        }
        if accepted.len() >= MAX_PROPERTIES {
            break;
        }
    }
    elided += entries.count();

    Ok(Sanitized {
        name: truncate_chars(trimmed, MAX_NAME_LENGTH),
        properties: accepted,
        elided,
    })
}

/// Sanitise `value`, which lives inside a container at `level`.
///
/// Returns `None` when the value itself is dropped. Drops inside nested
/// containers are added to `elided`.
fn sanitize_value(value: PropertyValue, level: usize, elided: &mut usize) -> Option<Value> {
    match value {
        PropertyValue::Null | PropertyValue::Unsupported(_) => None,
        PropertyValue::Bool(b) => Some(Value::Bool(b)),
        PropertyValue::Int(i) => Some(Value::Int(i)),
        PropertyValue::UInt(u) => Some(match i64::try_from(u) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(u as f64),
        }),
        PropertyValue::Float(f) if f.is_finite() => Some(Value::Float(f)),
        PropertyValue::Float(_) => None,
        PropertyValue::Str(s) => Some(Value::String(truncate_chars(&s, MAX_STRING_LENGTH))),
        PropertyValue::DateTime(dt) => Some(Value::String(
            dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )),
        PropertyValue::Map(entries) => {
            let inner = level + 1;
            if inner > MAX_DEPTH {
                return None;
            }
            let mut dict = Properties::new();
            for (key, value) in entries {
                let Some(key) = normalise_key(&key) else {
                    *elided += 1;
                    continue;
                };
                if dict.contains_key(&key) {
                    *elided += 1;
                    continue;
                }
                match sanitize_value(value, inner, elided) {
                    Some(value) => {
                        dict.insert(key, value);
                    }
                    None => *elided += 1,
                }
            }
            Some(Value::Dict(dict))
        }
        PropertyValue::List(items) => {
            let inner = level + 1;
            if inner > MAX_DEPTH {
                return None;
            }
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                match sanitize_value(item, inner, elided) {
                    Some(value) => list.push(value),
                    None => *elided += 1,
                }
            }
            Some(Value::List(list))
        }
    }
}

fn normalise_key(key: &str) -> Option<String> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(truncate_chars(trimmed, MAX_KEY_LENGTH))
    }
}

/// Truncate to at most `max` characters without splitting a code point.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}
