//! Core data types: keys, timestamps, entries and index definitions.

use crate::constants::{BY_EXPIRY, BY_TIMESTAMP};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Primary key of a row.
///
/// Integers sort before strings; integers compare numerically and strings
/// bytewise. The derived `Ord` matches the on-disk key order.
///
/// Numeric keys are limited to `i64`. Fractional or out-of-range numbers
/// are rejected with [`Error::InvalidKey`](crate::Error::InvalidKey)
/// wherever a key is derived from a value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    /// Runtime type name, used in error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "number",
            Self::Str(_) => "string",
        }
    }

    /// Interprets a JSON value as a key (strings and integral numbers).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Int),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Key {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

/// Point in time as microseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Converts a system time, clamping times before the epoch to zero.
    pub fn from_system_time(time: SystemTime) -> Self {
        let micros = time
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX));
        Self(micros)
    }

    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }

    #[must_use]
    pub const fn saturating_sub_micros(self, micros: u64) -> Self {
        Self(self.0.saturating_sub(micros))
    }

    /// RFC 3339 rendering for logs and the CLI.
    pub fn to_rfc3339(self) -> String {
        i64::try_from(self.0)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_micros)
            .map_or_else(|| format!("{}us", self.0), |dt| dt.to_rfc3339())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Per-entry options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Entry becomes unreadable once `now >= expiry`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Timestamp>,
}

impl EntryOptions {
    pub const fn expiring_at(expiry: Timestamp) -> Self {
        Self {
            expiry: Some(expiry),
        }
    }

    /// Options after applying `patch`: fields set in the patch win.
    #[must_use]
    pub fn merged(self, patch: Self) -> Self {
        Self {
            expiry: patch.expiry.or(self.expiry),
        }
    }

    /// Checks if an entry with these options has expired at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

/// Stored row: value, options and last-write timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub value: Value,
    #[serde(default)]
    pub options: EntryOptions,
    pub timestamp: Timestamp,
}

impl Entry {
    pub fn is_live(&self, now: Timestamp) -> bool {
        !self.options.is_expired(now)
    }
}

/// A value tagged with its key, as returned by ordered reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: Key,
    pub value: Value,
}

/// One page of an ordered read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Record>,
    /// At least one more row exists past this window.
    pub has_next: bool,
}

/// Secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    /// Dot-path into the value; an empty path indexes the value itself.
    pub path: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub multi_entry: bool,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            unique: false,
            multi_entry: false,
        }
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub const fn multi_entry(mut self) -> Self {
        self.multi_entry = true;
        self
    }

    pub(crate) fn by_expiry() -> Self {
        Self::new(BY_EXPIRY, "options.expiry")
    }

    pub(crate) fn by_timestamp() -> Self {
        Self::new(BY_TIMESTAMP, "timestamp")
    }
}

/// How primary keys are assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Caller supplies every key.
    #[default]
    Explicit,
    /// Omitted keys are taken from a persisted counter.
    AutoIncrement,
    /// Keys are read from this dot-path in the value. The value found there
    /// must be a string or an `i64`; a fractional number such as `1.5` is
    /// not a valid key.
    KeyPath(String),
}
