//! Shared value types: decoded responses, TLS verification settings and
//! timestamps.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Value;

// ---------------------------------------------------------------------------
// Decoded results
// ---------------------------------------------------------------------------

/// A list returned by a remote method, plus the server-side total.
///
/// `total_count` comes from a response header (or envelope field) and tells the
/// caller how many items exist on the server, independent of how many were
/// returned in this page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListResult {
    items: Vec<Value>,
    total_count: u64,
}

impl ListResult {
    /// Creates a [`ListResult`].
    pub fn new(items: Vec<Value>, total_count: u64) -> Self {
        Self { items, total_count }
    }

    /// Total number of items that exist on the server.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Consumes the result, returning the items.
    pub fn into_items(self) -> Vec<Value> {
        self.items
    }
}

impl std::ops::Deref for ListResult {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.items
    }
}

impl IntoIterator for ListResult {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// The successfully decoded outcome of one call.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A scalar or mapping.
    Value(Value),
    /// A list with its server-side total.
    List(ListResult),
}

impl Response {
    /// Wraps a decoded wire value. Arrays become [`Response::List`] with the
    /// given total; everything else is returned as-is.
    pub fn from_decoded(value: Value, total_count: u64) -> Self {
        match value {
            Value::Array(items) => Response::List(ListResult::new(items, total_count)),
            other => Response::Value(other),
        }
    }

    /// Collapses the response into a single [`Value`]; lists become arrays.
    pub fn into_value(self) -> Value {
        match self {
            Response::Value(v) => v,
            Response::List(list) => Value::Array(list.into_items()),
        }
    }

    /// Borrows the list, if this is one.
    pub fn as_list(&self) -> Option<&ListResult> {
        match self {
            Response::List(list) => Some(list),
            Response::Value(_) => None,
        }
    }

    /// Borrows the scalar or mapping, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Response::Value(v) => Some(v),
            Response::List(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TLS
// ---------------------------------------------------------------------------

/// How the server certificate is verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsVerify {
    /// Verify against the platform trust store.
    #[default]
    Enabled,
    /// Do not verify the server certificate.
    Disabled,
    /// Verify against the PEM bundle at this path.
    CaBundle(PathBuf),
}

impl From<bool> for TlsVerify {
    fn from(verify: bool) -> Self {
        if verify {
            TlsVerify::Enabled
        } else {
            TlsVerify::Disabled
        }
    }
}

impl std::fmt::Display for TlsVerify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsVerify::Enabled => f.write_str("true"),
            TlsVerify::Disabled => f.write_str("false"),
            TlsVerify::CaBundle(path) => write!(f, "{}", path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Seconds elapsed from `earlier` to `self`, with sub-second precision.
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        let delta = self.0 - earlier.0;
        delta
            .num_microseconds()
            .map_or(delta.num_milliseconds() as f64 / 1_000.0, |us| {
                us as f64 / 1_000_000.0
            })
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
