use chrono::{DateTime, Duration, TimeZone, Utc};

/// Midnight UTC of the day containing `now`.
pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(now)
}

/// Whole seconds elapsed from `start` to `end`, rounded down.
pub fn floor_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let elapsed = end - start;
    let secs = elapsed.num_seconds();
    if elapsed < Duration::seconds(secs) {
        secs - 1
    } else {
        secs
    }
}

pub fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| format!("invalid timestamp {raw:?}: {err}"))
}

pub(crate) fn align_down(ts: DateTime<Utc>, interval_seconds: i64) -> DateTime<Utc> {
    let interval_ms = interval_seconds.max(1) * 1000;
    let bucket_ms = ts.timestamp_millis().div_euclid(interval_ms) * interval_ms;
    Utc.timestamp_millis_opt(bucket_ms).single().unwrap_or(ts)
}
