//! Payload determinism across independently built events.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use femtotelemetry::{
    Event, EventSerializer, JsonEventSerializer, PayloadContext, PropertyValue, sanitize,
};
use rstest::rstest;

fn build_event(props: Vec<(&str, PropertyValue)>) -> Event {
    let sanitized = sanitize("evt", props).expect("valid event");
    let ts = Utc
        .with_ymd_and_hms(2026, 10, 19, 8, 30, 0)
        .single()
        .expect("valid timestamp");
    Event::new(sanitized.name, ts, sanitized.properties)
}

#[rstest]
fn keys_are_emitted_in_ordinal_order() {
    let event = build_event(vec![("z", 1.into()), ("a", 2.into())]);
    let context = PayloadContext::new(None, None);
    let bytes = JsonEventSerializer
        .encode(&context, &[event])
        .expect("encode");
    let json = String::from_utf8(bytes).expect("utf8");

    let a = json.find(r#""a":2"#).expect("a present");
    let z = json.find(r#""z":1"#).expect("z present");
    assert!(a < z, "{json}");
}

#[rstest]
fn insertion_order_does_not_change_bytes() {
    let forward = build_event(vec![
        ("alpha", "x".into()),
        ("Beta", 2.5.into()),
        ("gamma", vec![1, 2, 3].into()),
    ]);
    let mut map = HashMap::new();
    map.insert("gamma", PropertyValue::from(vec![1, 2, 3]));
    map.insert("Beta", PropertyValue::from(2.5));
    map.insert("alpha", PropertyValue::from("x"));
    let sanitized = sanitize("evt", map).expect("valid event");
    let shuffled = Event::new(sanitized.name, forward.timestamp(), sanitized.properties);

    let context = PayloadContext::new(Some("user".into()), Some("session".into()));
    let first = JsonEventSerializer
        .encode(&context, std::slice::from_ref(&forward))
        .expect("encode");
    let second = JsonEventSerializer
        .encode(&context, &[shuffled])
        .expect("encode");
    let again = JsonEventSerializer
        .encode(&context, &[forward])
        .expect("encode");

    assert_eq!(first, second);
    assert_eq!(first, again);
    let json = String::from_utf8(first).expect("utf8");
    assert!(json.contains(r#"{"Beta":2.5,"alpha":"x","gamma":[1,2,3]}"#), "{json}");
}
