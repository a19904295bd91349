//! Binary snapshot format for the durable queue.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! version: i32              currently 1
//! count:   i32
//! count x {
//!     name:        string
//!     timestamp:   i64      Unix milliseconds
//!     properties:  dict
//! }
//!
//! string = len: i32, len bytes of UTF-8
//! dict   = count: i32, count x { key: string, value }
//! list   = count: i32, count x value
//! value  = tag: u8, payload
//!          0 null   (no payload)
//!          1 string
//!          2 bool   (u8, 0 or 1)
//!          3 int64
//!          4 float64 (IEEE-754 bits)
//!          5 dict
//!          6 list
//! ```
//!
//! The decoder trusts nothing: every length is checked against the bytes that
//! remain, nesting is bounded, and trailing bytes are an error.

use chrono::DateTime;
use thiserror::Error;

use crate::{
    event::Event,
    value::{Properties, Value},
};

pub const FORMAT_VERSION: i32 = 1;

const TAG_NULL: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_DICT: u8 = 5;
const TAG_LIST: u8 = 6;

/// Nesting limit applied while decoding. Sanitised events never exceed three
/// levels; anything deeper is not a file we wrote.
const MAX_DECODE_DEPTH: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(i32),
    #[error("snapshot truncated at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },
    #[error("invalid length {0}")]
    InvalidLength(i32),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown value tag {0}")]
    UnknownTag(u8),
    #[error("invalid bool byte {0}")]
    InvalidBool(u8),
    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
    #[error("values nested deeper than {MAX_DECODE_DEPTH} levels")]
    TooDeep,
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("collection of {0} items does not fit the format")]
    TooLarge(usize),
}

/// Encode the full queue contents.
///
/// # Errors
///
/// Returns [`CodecError::TooLarge`] if a collection or string exceeds
/// `i32::MAX` entries or bytes.
pub fn encode_snapshot<'a, I>(events: I) -> Result<Vec<u8>, CodecError>
where
    I: ExactSizeIterator<Item = &'a Event>,
{
    let mut out = Vec::with_capacity(64 * events.len() + 8);
    put_i32(&mut out, FORMAT_VERSION);
    put_len(&mut out, events.len())?;
    for event in events {
        put_str(&mut out, event.name())?;
        out.extend_from_slice(&event.timestamp().timestamp_millis().to_le_bytes());
        put_dict(&mut out, event.properties())?;
    }
    Ok(out)
}

/// Decode a snapshot produced by [`encode_snapshot`].
///
/// # Errors
///
/// Any deviation from the format yields a [`CodecError`].
pub fn decode_snapshot(bytes: &[u8]) -> Result<Vec<Event>, CodecError> {
    let mut reader = Reader { buf: bytes, pos: 0 };
    let version = reader.i32()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let count = reader.len()?;
    // Each event needs at least name len + timestamp + dict count.
    let mut events = Vec::with_capacity(count.min(reader.remaining() / 16));
    for _ in 0..count {
        let name = reader.string()?;
        let millis = reader.i64()?;
        let timestamp =
            DateTime::from_timestamp_millis(millis).ok_or(CodecError::InvalidTimestamp(millis))?;
        let properties = reader.dict(1)?;
        events.push(Event::new(name, timestamp, properties));
    }
    match reader.remaining() {
        0 => Ok(events),
        extra => Err(CodecError::TrailingBytes(extra)),
    }
}

fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_len(out: &mut Vec<u8>, len: usize) -> Result<(), CodecError> {
    let len = i32::try_from(len).map_err(|_| CodecError::TooLarge(len))?;
    put_i32(out, len);
    Ok(())
}

fn put_str(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    put_len(out, s.len())?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_dict(out: &mut Vec<u8>, dict: &Properties) -> Result<(), CodecError> {
    put_len(out, dict.len())?;
    for (key, value) in dict {
        put_str(out, key)?;
        put_value(out, value)?;
    }
    Ok(())
}

fn put_value(out: &mut Vec<u8>, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::String(s) => {
            out.push(TAG_STRING);
            put_str(out, s)?;
        }
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::Dict(dict) => {
            out.push(TAG_DICT);
            put_dict(out, dict)?;
        }
        Value::List(items) => {
            out.push(TAG_LIST);
            put_len(out, items.len())?;
            for item in items {
                put_value(out, item)?;
            }
        }
    }
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(u64::from_le_bytes(self.array()?)))
    }

    /// Non-negative i32 length prefix.
    fn len(&mut self) -> Result<usize, CodecError> {
        let raw = self.i32()?;
        usize::try_from(raw).map_err(|_| CodecError::InvalidLength(raw))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.len()?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn dict(&mut self, depth: usize) -> Result<Properties, CodecError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(CodecError::TooDeep);
        }
        let count = self.len()?;
        let mut dict = Properties::new();
        for _ in 0..count {
            let key = self.string()?;
            let value = self.value(depth)?;
            dict.insert(key, value);
        }
        Ok(dict)
    }

    fn value(&mut self, depth: usize) -> Result<Value, CodecError> {
        match self.u8()? {
            TAG_NULL => Ok(Value::Null),
            TAG_STRING => Ok(Value::String(self.string()?)),
            TAG_BOOL => match self.u8()? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(CodecError::InvalidBool(other)),
            },
            TAG_INT => Ok(Value::Int(self.i64()?)),
            TAG_FLOAT => Ok(Value::Float(self.f64()?)),
            TAG_DICT => Ok(Value::Dict(self.dict(depth + 1)?)),
            TAG_LIST => {
                if depth + 1 > MAX_DECODE_DEPTH {
                    return Err(CodecError::TooDeep);
                }
                let count = self.len()?;
                // Every value is at least one tag byte.
                let mut items = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    items.push(self.value(depth + 1)?);
                }
                Ok(Value::List(items))
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_event() -> Event {
        let mut nested = Properties::new();
        nested.insert("deep".into(), Value::List(vec![Value::Int(1), Value::Null]));
        let mut props = Properties::new();
        props.insert("s".into(), Value::String("héllo".into()));
        props.insert("b".into(), Value::Bool(true));
        props.insert("i".into(), Value::Int(i64::MIN));
        props.insert("f".into(), Value::Float(-0.125));
        props.insert("d".into(), Value::Dict(nested));
        let ts = Utc.timestamp_millis_opt(1_771_502_400_123).single().expect("valid");
        Event::new("evt", ts, props)
    }

    #[test]
    fn snapshot_survives_a_round_trip() {
        let events = vec![sample_event(), Event::new("empty", Utc::now(), Properties::new())];
        let bytes = encode_snapshot(events.iter()).expect("encode");
        assert_eq!(decode_snapshot(&bytes).expect("decode"), events);
    }

    #[test]
    fn header_is_little_endian_version_then_count() {
        let bytes = encode_snapshot([sample_event()].iter()).expect("encode");
        assert_eq!(&bytes[..8], &[1, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn empty_snapshot_is_just_a_header() {
        let bytes = encode_snapshot(std::iter::empty::<&Event>()).expect("encode");
        assert_eq!(bytes, vec![1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(decode_snapshot(&bytes).expect("decode").is_empty());
    }

    #[test]
    fn rejects_unknown_versions() {
        let mut bytes = encode_snapshot([sample_event()].iter()).expect("encode");
        bytes[0] = 2;
        assert_eq!(decode_snapshot(&bytes), Err(CodecError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_every_truncation() {
        let bytes = encode_snapshot([sample_event()].iter()).expect("encode");
        for cut in 0..bytes.len() {
            assert!(decode_snapshot(&bytes[..cut]).is_err(), "cut at {cut} decoded");
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode_snapshot([sample_event()].iter()).expect("encode");
        bytes.push(0);
        assert_eq!(decode_snapshot(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn huge_counts_do_not_allocate_up_front() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        assert!(matches!(
            decode_snapshot(&bytes),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_negative_lengths() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(-1_i32).to_le_bytes());
        assert_eq!(decode_snapshot(&bytes), Err(CodecError::InvalidLength(-1)));
    }

    #[test]
    fn rejects_runaway_nesting() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&1_i32.to_le_bytes());
        bytes.extend_from_slice(&1_i32.to_le_bytes());
        bytes.push(b'e');
        bytes.extend_from_slice(&0_i64.to_le_bytes());
        for _ in 0..20 {
            bytes.extend_from_slice(&1_i32.to_le_bytes());
            bytes.extend_from_slice(&1_i32.to_le_bytes());
            bytes.push(b'k');
            bytes.push(TAG_DICT);
        }
        assert_eq!(decode_snapshot(&bytes), Err(CodecError::TooDeep));
    }
}
