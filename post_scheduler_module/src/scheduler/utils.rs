use chrono::{DateTime, SecondsFormat, Utc};

use super::types::SchedulerError;

pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, SchedulerError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

pub(crate) fn datetime_to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn millis_to_datetime(value: i64) -> Result<DateTime<Utc>, SchedulerError> {
    DateTime::from_timestamp_millis(value).ok_or(SchedulerError::TimestampOutOfRange(value))
}

/// Drops sub-millisecond precision so values survive a store round trip unchanged.
pub(crate) fn truncate_to_millis(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or(value)
}

pub(crate) fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}
