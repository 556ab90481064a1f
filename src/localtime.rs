//! Tower local time (Eastern European Time) helpers.
//!
//! The datastore stamps every row with the tower's wall-clock time but tags
//! it as UTC. Nothing here shifts those timestamps: the calendar and clock
//! fields are taken as written and treated as local time. The only real
//! offset arithmetic is for turning the server's UTC clock into tower "now".

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

// ---

/// EET offset from UTC, in hours.
pub const EET_OFFSET_HOURS: i64 = 2;

/// EEST (summer time) offset from UTC, in hours.
pub const EEST_OFFSET_HOURS: i64 = 3;

/// Reinterpret a mislabeled timestamp string as tower local time.
///
/// Accepts RFC 3339 (`2024-06-15T14:30:00Z`, `...+00:00`, fractional
/// seconds), the Postgres text form (`2024-06-15 14:30:00+00`) and an
/// untagged ISO-8601 form. The written fields are kept, the tag is dropped.
/// Returns `None` for anything else.
pub fn parse_mislabeled(raw: &str) -> Option<NaiveDateTime> {
    // ---
    let raw = raw.trim();

    if let Ok(tagged) = DateTime::parse_from_rfc3339(raw) {
        return Some(tagged.naive_local());
    }
    if let Ok(tagged) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(tagged.naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Whether EU summer time is in force at `utc`.
///
/// Summer time runs from 01:00 UTC on the last Sunday of March until
/// 01:00 UTC on the last Sunday of October.
pub fn is_summer_time(utc: DateTime<Utc>) -> bool {
    // ---
    let year = utc.year();
    let (Some(start), Some(end)) = (last_sunday(year, 3), last_sunday(year, 10)) else {
        return false;
    };

    let start = start.and_time(chrono::NaiveTime::MIN) + Duration::hours(1);
    let end = end.and_time(chrono::NaiveTime::MIN) + Duration::hours(1);
    let now = utc.naive_utc();

    now >= start && now < end
}

/// Current offset of tower local time from UTC, in hours.
pub fn eet_offset_hours(utc: DateTime<Utc>) -> i64 {
    if is_summer_time(utc) {
        EEST_OFFSET_HOURS
    } else {
        EET_OFFSET_HOURS
    }
}

/// Tower wall-clock time corresponding to the real instant `utc`.
pub fn local_now(utc: DateTime<Utc>) -> NaiveDateTime {
    utc.naive_utc() + Duration::hours(eet_offset_hours(utc))
}

/// `14:00` style label.
pub fn hour_label(at: NaiveDateTime) -> String {
    at.format("%H:%M").to_string()
}

/// `Jan 15` style label, or `Jan 15 PM` when `with_period` is set.
pub fn date_label(at: NaiveDateTime, with_period: bool) -> String {
    if with_period {
        at.format("%b %-d %p").to_string()
    } else {
        at.format("%b %-d").to_string()
    }
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    // ---
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = first_of_next.pred_opt()?;
    let back = i64::from(last_day.weekday().num_days_from_sunday());

    Some(last_day - Duration::days(back))
}
