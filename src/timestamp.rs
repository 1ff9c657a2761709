//! Business-local timestamps.
//!
//! The business runs in one implicit timezone, so every instant is a
//! `NaiveDateTime` read off the local wall clock. Offsets in RFC 3339 input
//! are accepted but not converted.

use chrono::{DateTime, Local, NaiveDateTime, Timelike};

use crate::limits::MAX_TIMESTAMP_LEN;
use crate::model::Ms;

/// Format the engine writes to the store.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

pub fn parse(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() || s.len() > MAX_TIMESTAMP_LEN {
        return None;
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_local()))
}

pub fn format(t: NaiveDateTime) -> String {
    t.format(CANONICAL_FORMAT).to_string()
}

/// Stored text in canonical form when it parses, untouched otherwise.
pub fn normalize(raw: &str) -> String {
    parse(raw).map(format).unwrap_or_else(|| raw.to_string())
}

pub fn to_ms(t: NaiveDateTime) -> Ms {
    t.and_utc().timestamp_millis()
}

pub fn minute_of_day(t: NaiveDateTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Render minutes-from-midnight as `HH:MM`.
pub fn format_minutes(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Parse `HH:MM` into minutes-from-midnight. `24:00` is allowed.
pub fn parse_minutes(raw: &str) -> Option<u32> {
    let (h, m) = raw.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if m >= 60 || h > 24 || (h == 24 && m > 0) {
        return None;
    }
    Some(h * 60 + m)
}

pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ymd_hms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn parses_accepted_forms() {
        let expected = ymd_hms(2024, 6, 3, 11, 30, 0);
        assert_eq!(parse("2024-06-03T11:30:00"), Some(expected));
        assert_eq!(parse("2024-06-03T11:30"), Some(expected));
        assert_eq!(parse("2024-06-03 11:30:00"), Some(expected));
        assert_eq!(parse("2024-06-03 11:30"), Some(expected));
        assert_eq!(parse("  2024-06-03T11:30:00.000 "), Some(expected));
    }

    #[test]
    fn rfc3339_keeps_wall_clock() {
        assert_eq!(
            parse("2024-06-03T11:30:00-06:00"),
            Some(ymd_hms(2024, 6, 3, 11, 30, 0))
        );
        assert_eq!(
            parse("2024-06-03T11:30:00Z"),
            Some(ymd_hms(2024, 6, 3, 11, 30, 0))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("tomorrow at noon"), None);
        assert_eq!(parse("2024-02-30T11:00:00"), None);
        assert_eq!(parse("2024-06-03T25:00:00"), None);
        assert_eq!(parse(&"9".repeat(MAX_TIMESTAMP_LEN + 1)), None);
    }

    #[test]
    fn normalize_falls_back_to_raw() {
        assert_eq!(normalize("2024-06-03 11:30"), "2024-06-03T11:30:00");
        assert_eq!(normalize("not a date"), "not a date");
    }

    #[test]
    fn minute_helpers() {
        assert_eq!(minute_of_day(ymd_hms(2024, 6, 3, 17, 45, 59)), 17 * 60 + 45);
        assert_eq!(format_minutes(660), "11:00");
        assert_eq!(format_minutes(1125), "18:45");
        assert_eq!(parse_minutes("11:00"), Some(660));
        assert_eq!(parse_minutes("24:00"), Some(1440));
        assert_eq!(parse_minutes("24:01"), None);
        assert_eq!(parse_minutes("9:75"), None);
        assert_eq!(parse_minutes("nine"), None);
    }

    #[test]
    fn ms_preserves_ordering() {
        let a = ymd_hms(2024, 6, 3, 11, 0, 0);
        let b = ymd_hms(2024, 6, 3, 11, 1, 0);
        assert_eq!(to_ms(b) - to_ms(a), 60_000);
    }
}
