//! Local-time helpers for cycle records.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

/// Fixed offset for a whole-hour UTC offset, `None` when out of range.
#[must_use]
pub fn utc_offset(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

/// UTC bounds `[start, end)` of the local calendar day containing `now`.
#[must_use]
pub fn local_day_bounds(now: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = now
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::MIN);
    let start = local_midnight.and_utc() - Duration::seconds(i64::from(offset.local_minus_utc()));
    (start, start + Duration::days(1))
}

/// Formats elapsed seconds as `HH:MM:SS`, truncating fractions.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_duration_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// `DD-MM-YYYY | HH:MM:SS <zone>` in the given offset.
///
/// Indonesian offsets get their usual labels; anything else prints the
/// numeric offset.
#[must_use]
pub fn format_local_stamp(now: DateTime<Utc>, offset: FixedOffset) -> String {
    let local = now.with_timezone(&offset);
    let zone = match offset.local_minus_utc() {
        25_200 => "WIB".to_owned(),
        28_800 => "WITA".to_owned(),
        32_400 => "WIT".to_owned(),
        _ => local.format("%:z").to_string(),
    };
    format!("{} {zone}", local.format("%d-%m-%Y | %H:%M:%S"))
}
