//! Time utilities: timezone-aware day buckets for epoch timestamps.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Default bucket timezone for transaction days.
pub const DEFAULT_TIMEZONE: &str = "Asia/Ho_Chi_Minh";

/// Parse an IANA timezone name like "Asia/Ho_Chi_Minh".
pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {tz}"))
}

/// Convert fractional epoch seconds to a local datetime in `tz`.
pub fn local_from_epoch_secs(secs: f64, tz: Tz) -> Result<DateTime<Tz>> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    let utc = Utc
        .timestamp_opt(whole as i64, nanos)
        .single()
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {secs}"))?;
    Ok(utc.with_timezone(&tz))
}

/// Calendar day (in `tz`) of an epoch-milliseconds bound.
pub fn day_of_epoch_millis(ms: i64, tz: Tz) -> Result<NaiveDate> {
    let utc = DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {ms}ms"))?;
    Ok(utc.with_timezone(&tz).date_naive())
}

/// Current time as fractional epoch seconds.
pub fn now_epoch_secs() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}

/// Every calendar day from `start` to `end` inclusive; empty when `start > end`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}
