//! Built-in field generator functions.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use uuid::Uuid;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// `current_timestamp`: `YYYY-MM-DD HH:MM:SS`.
pub fn current_timestamp(now: DateTime<FixedOffset>) -> Value {
    Value::String(now.format(TIMESTAMP_FORMAT).to_string())
}

/// `current_date`: `YYYY-MM-DD`.
pub fn current_date(now: DateTime<FixedOffset>) -> Value {
    Value::String(now.format(DATE_FORMAT).to_string())
}

/// `unix_timestamp`: whole seconds since the epoch.
pub fn unix_timestamp(now: DateTime<FixedOffset>) -> Value {
    Value::Number(now.timestamp().into())
}

/// `uuid`: a fresh v4 identifier.
pub fn uuid() -> Value {
    Value::String(Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-15T09:30:05+00:00").unwrap()
    }

    #[test]
    fn test_formats() {
        assert_eq!(current_timestamp(fixed()), "2024-03-15 09:30:05");
        assert_eq!(current_date(fixed()), "2024-03-15");
        assert_eq!(unix_timestamp(fixed()), 1710495005);
    }

    #[test]
    fn test_uuid_is_fresh() {
        let a = uuid();
        let b = uuid();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str().unwrap()).is_ok());
    }
}
