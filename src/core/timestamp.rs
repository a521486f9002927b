//! Purpose: Extract signed-value timestamps and compute Monday-anchored UTC weeks.
//! Exports: `extract_millis`, `extract_datetime`, `millis_to_datetime`, `week_start`, `week_end`.
//! Role: Date arithmetic behind the weekly backlog report.
//! Invariants: The timestamp is the 8 big-endian bytes before the trailing 64-byte signature.
//! Invariants: Week arithmetic never panics; a week past the calendar range yields `None`.
use time::{Date, Duration, OffsetDateTime};

use crate::core::error::{Error, ErrorKind};

pub const SIGNATURE_LEN: usize = 64;
pub const TIMESTAMP_LEN: usize = 8;
/// Minimum value length that holds the timestamp + signature trailer.
pub const TRAILER_LEN: usize = SIGNATURE_LEN + TIMESTAMP_LEN;

/// Reads the big-endian millisecond timestamp stored just before the trailing signature.
pub fn extract_millis(value: &[u8]) -> Result<u64, Error> {
    let len = value.len();
    if len < TRAILER_LEN {
        return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
            "value is {len} bytes, shorter than the {TRAILER_LEN}-byte timestamp and signature trailer"
        )));
    }
    let start = len - TRAILER_LEN;
    let mut bytes = [0u8; TIMESTAMP_LEN];
    bytes.copy_from_slice(&value[start..start + TIMESTAMP_LEN]);
    Ok(u64::from_be_bytes(bytes))
}

pub fn millis_to_datetime(millis: u64) -> Result<OffsetDateTime, Error> {
    let nanos = i128::from(millis) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("timestamp {millis}ms is out of calendar range"))
            .with_source(err)
    })
}

pub fn extract_datetime(value: &[u8]) -> Result<OffsetDateTime, Error> {
    millis_to_datetime(extract_millis(value)?)
}

/// The Monday on or before `instant`, in UTC.
pub fn week_start(instant: OffsetDateTime) -> Date {
    let date = instant.to_offset(time::UtcOffset::UTC).date();
    let back = date.weekday().number_days_from_monday();
    date - Duration::days(i64::from(back))
}

/// The Sunday closing the week that starts on `start`, if the calendar reaches it.
pub fn week_end(start: Date) -> Option<Date> {
    start.checked_add(Duration::days(6))
}
