/// Utility functions for timestamps and unit conversion
use time::{format_description, OffsetDateTime};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Format a millisecond timestamp for human-readable logging
///
/// Converts to DD.MM.YYYY - HH:MM:SS.mmm in UTC. Falls back to the raw
/// millisecond value if the timestamp is out of range or formatting fails.
pub fn format_millis(millis: i64) -> String {
    let dt = match OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000) {
        Ok(dt) => dt,
        Err(_) => return format!("{} ms", millis),
    };
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second].[subsecond digits:3]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Round a scalar to the nearest integer, saturating at the i16 range
pub fn to_raw_unit(value: f32) -> i16 {
    // `as` saturates on float to int and maps NaN to 0
    value.round() as i16
}
