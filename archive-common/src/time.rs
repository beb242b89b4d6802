//! Timestamp utilities

use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse an RFC 3339 timestamp as sent by the document store
pub fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("bad timestamp {:?}: {}", value, e)))
}

/// Milliseconds since the Unix epoch, or 0 when no timestamp has been assigned yet
pub fn epoch_millis(timestamp: Option<&DateTime<Utc>>) -> i64 {
    timestamp.map_or(0, |t| t.timestamp_millis())
}
