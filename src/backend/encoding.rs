//! Order-preserving byte encodings for primary keys and index values.
//!
//! redb compares `&[u8]` keys bytewise, so every encoding here is built so
//! that byte order equals logical order, and so that no encoding is a
//! prefix of another (which lets composite index keys append a timestamp
//! and primary key after the value).
//!
//! Layout:
//!
//! ```text
//! number  0x10 | f64 sortable bits (8 bytes, big endian)
//! string  0x20 | utf-8 with 0x00 escaped as 0x00 0xFF | 0x00 0x01
//! array   0x30 | element* | 0x00
//! ```
//!
//! Primary keys reuse the string form and encode integers as `0x10 | i64`
//! with the sign bit flipped.

use crate::error::{Error, Result};
use crate::types::{Key, Timestamp};
use serde_json::Value;

const TAG_NUMBER: u8 = 0x10;
const TAG_STRING: u8 = 0x20;
const TAG_ARRAY: u8 = 0x30;
const ARRAY_END: u8 = 0x00;
const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;
const STRING_END: u8 = 0x01;
const SIGN_BIT: u64 = 1 << 63;

/// Encodes a primary key.
pub fn encode_key(key: &Key) -> Vec<u8> {
    match key {
        Key::Int(i) => {
            let mut out = Vec::with_capacity(9);
            out.push(TAG_NUMBER);
            out.extend_from_slice(&((*i as u64) ^ SIGN_BIT).to_be_bytes());
            out
        },
        Key::Str(s) => {
            let mut out = Vec::with_capacity(s.len() + 3);
            out.push(TAG_STRING);
            push_escaped(&mut out, s.as_bytes());
            out
        },
    }
}

/// Decodes a primary key produced by [`encode_key`].
pub fn decode_key(bytes: &[u8]) -> Result<Key> {
    let (key, rest) = split_key(bytes)?;
    if !rest.is_empty() {
        return Err(Error::InvalidKey(format!(
            "{} trailing bytes after encoded key",
            rest.len()
        )));
    }
    Ok(key)
}

/// Decodes one primary key from the front of `bytes`, returning the rest.
pub fn split_key(bytes: &[u8]) -> Result<(Key, &[u8])> {
    match bytes.split_first() {
        Some((&TAG_NUMBER, rest)) => {
            let (raw, rest) = rest
                .split_first_chunk::<8>()
                .ok_or_else(|| Error::InvalidKey("truncated integer key".into()))?;
            let i = (u64::from_be_bytes(*raw) ^ SIGN_BIT) as i64;
            Ok((Key::Int(i), rest))
        },
        Some((&TAG_STRING, rest)) => {
            let (raw, rest) = read_escaped(rest)?;
            let s = String::from_utf8(raw)
                .map_err(|e| Error::InvalidKey(format!("key is not utf-8: {e}")))?;
            Ok((Key::Str(s), rest))
        },
        Some((tag, _)) => Err(Error::InvalidKey(format!("unknown key tag {tag:#04x}"))),
        None => Err(Error::InvalidKey("empty encoded key".into())),
    }
}

/// Encodes an indexable JSON value; `None` if the value cannot be indexed.
///
/// Numbers, strings and arrays of indexable values are indexable.
/// Booleans, nulls, objects and NaN are not.
pub fn encode_index_value(value: &Value) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    write_index_value(&mut out, value).then_some(out)
}

/// Encodes a timestamp the same way a JSON number holding it would be.
pub fn encode_timestamp(ts: Timestamp) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    write_number(&mut out, ts.as_micros() as f64);
    out
}

/// Builds the composite index key `value | timestamp | primary key`.
///
/// The timestamp segment makes rows with equal index values sort by
/// write time.
pub fn index_entry_key(value: &[u8], timestamp: Timestamp, pk: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 8 + pk.len());
    out.extend_from_slice(value);
    out.extend_from_slice(&timestamp.as_micros().to_be_bytes());
    out.extend_from_slice(pk);
    out
}

/// Smallest byte string greater than every string starting with `prefix`.
///
/// `None` when no such string exists (prefix is empty or all `0xFF`).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let last = prefix.iter().rposition(|&b| b != 0xFF)?;
    let mut out = prefix[..=last].to_vec();
    out[last] += 1;
    Some(out)
}

fn write_index_value(out: &mut Vec<u8>, value: &Value) -> bool {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_nan() => {
                write_number(out, f);
                true
            },
            _ => false,
        },
        Value::String(s) => {
            out.push(TAG_STRING);
            push_escaped(out, s.as_bytes());
            true
        },
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            if !items.iter().all(|item| write_index_value(out, item)) {
                return false;
            }
            out.push(ARRAY_END);
            true
        },
        Value::Null | Value::Bool(_) | Value::Object(_) => false,
    }
}

fn write_number(out: &mut Vec<u8>, f: f64) {
    // -0.0 and 0.0 are the same index value
    let f = if f == 0.0 { 0.0 } else { f };
    let bits = f.to_bits();
    let sortable = if bits & SIGN_BIT == 0 {
        bits | SIGN_BIT
    } else {
        !bits
    };
    out.push(TAG_NUMBER);
    out.extend_from_slice(&sortable.to_be_bytes());
}

fn push_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if b == ESCAPE {
            out.extend_from_slice(&[ESCAPE, ESCAPED_NUL]);
        } else {
            out.push(b);
        }
    }
    out.extend_from_slice(&[ESCAPE, STRING_END]);
}

fn read_escaped(bytes: &[u8]) -> Result<(Vec<u8>, &[u8])> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ESCAPE {
            match bytes.get(i + 1) {
                Some(&STRING_END) => return Ok((out, &bytes[i + 2..])),
                Some(&ESCAPED_NUL) => out.push(0),
                _ => return Err(Error::InvalidKey("bad escape in encoded string".into())),
            }
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Err(Error::InvalidKey("unterminated encoded string".into()))
}
