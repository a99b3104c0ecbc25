//! Millisecond-precision UTC timestamps.
//!
//! Messages are stored with millisecond timestamps; every conversion between
//! the stored integer and `DateTime<Utc>` goes through here so the two never
//! drift apart.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Current time truncated to whole milliseconds.
#[must_use]
pub fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Build a timestamp from milliseconds since the Unix epoch.
///
/// Out-of-range values clamp to the epoch.
#[must_use]
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse a client-supplied timestamp: RFC 3339 or integer epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| Error::invalid_timestamp(raw));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| Error::invalid_timestamp(raw))
}
