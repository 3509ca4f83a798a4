//! Timestamp utilities
//!
//! Store documents carry creation times in several shapes: the document
//! store's native `{seconds, nanoseconds}` object, RFC 3339 strings, plain
//! date strings, or epoch milliseconds. [`Timestamp`] coerces all of them
//! and keeps an explicit `Unknown` state instead of substituting the current
//! time, so a record with a broken timestamp renders as such.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Display text for a timestamp that could not be read
pub const UNKNOWN_DISPLAY: &str = "data desconhecida";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Creation time of a record, or `Unknown` when the stored value was unusable
///
/// `Unknown` orders before every known instant, so a newest-first sort puts
/// unreadable timestamps last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Option<DateTime<Utc>>", into = "Option<DateTime<Utc>>")]
pub enum Timestamp {
    Unknown,
    Known(DateTime<Utc>),
}

impl Timestamp {
    /// Coerce a raw store value into a timestamp
    ///
    /// Accepts `{seconds, nanoseconds}` (with or without leading underscores),
    /// RFC 3339 strings, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`, and epoch
    /// milliseconds as a number or numeric string. Anything else is `Unknown`.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Object(map)) => {
                let seconds = map
                    .get("seconds")
                    .or_else(|| map.get("_seconds"))
                    .and_then(Value::as_i64);
                let nanos = map
                    .get("nanoseconds")
                    .or_else(|| map.get("_nanoseconds"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                match seconds {
                    Some(secs) => Utc
                        .timestamp_opt(secs, u32::try_from(nanos).unwrap_or(0))
                        .single()
                        .map_or(Timestamp::Unknown, Timestamp::Known),
                    None => Timestamp::Unknown,
                }
            }
            Some(Value::String(s)) => Self::parse_str(s),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map_or(Timestamp::Unknown, Self::from_millis),
            _ => Timestamp::Unknown,
        }
    }

    /// Parse a string timestamp, falling back to epoch milliseconds
    pub fn parse_str(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Timestamp::Unknown;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Timestamp::Known(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Timestamp::Known(naive.and_utc());
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return date
                .and_hms_opt(0, 0, 0)
                .map_or(Timestamp::Unknown, |naive| Timestamp::Known(naive.and_utc()));
        }
        match s.parse::<i64>() {
            Ok(millis) => Self::from_millis(millis),
            Err(_) => Timestamp::Unknown,
        }
    }

    /// Build from epoch milliseconds
    pub fn from_millis(millis: i64) -> Self {
        DateTime::from_timestamp_millis(millis).map_or(Timestamp::Unknown, Timestamp::Known)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Timestamp::Known(_))
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Known(dt) => Some(*dt),
            Timestamp::Unknown => None,
        }
    }

    /// Format as `dd/MM/yyyy às HH:mm`, or [`UNKNOWN_DISPLAY`]
    pub fn display(&self) -> String {
        match self {
            Timestamp::Known(dt) => dt.format("%d/%m/%Y às %H:%M").to_string(),
            Timestamp::Unknown => UNKNOWN_DISPLAY.to_string(),
        }
    }
}

impl From<Option<DateTime<Utc>>> for Timestamp {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Timestamp::Unknown, Timestamp::Known)
    }
}

impl From<Timestamp> for Option<DateTime<Utc>> {
    fn from(value: Timestamp) -> Self {
        value.as_datetime()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
