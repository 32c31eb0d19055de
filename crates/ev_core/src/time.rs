//! RFC3339 UTC timestamp helpers.
//!
//! Everything persisted or hashed carries timestamps as strings produced by
//! `format_utc` (microsecond precision, trailing `Z`). One formatter keeps
//! string comparison and hash stability aligned across crates.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Render a UTC instant as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current wall-clock time in the canonical string form.
///
/// Only framework-level fields (`started_at`, `completed_at`, audit entry
/// timestamps) may use this; algorithm payload content must not.
pub fn now_utc_string() -> String {
    format_utc(Utc::now())
}

/// Strict RFC3339 parse (offset-aware input normalized to UTC).
pub fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Lenient parse for timestamps arriving from external metadata.
///
/// Mirrors the formats evidence capture devices actually emit: RFC3339 with
/// or without offset/fraction, and space-separated variants. Naive inputs
/// are taken as UTC and the assumption is the caller's to record.
pub fn parse_flexible(s: &str) -> Option<DateTime<Utc>> {
    if let Some(dt) = parse_utc(s) {
        return Some(dt);
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_stable_and_parseable() {
        let dt = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let s = format_utc(dt);
        assert_eq!(s, "2026-02-10T12:00:00.000000Z");
        assert_eq!(parse_utc(&s).unwrap(), dt);
    }

    #[test]
    fn flexible_accepts_naive_and_spaced() {
        assert!(parse_flexible("2026-02-10T12:00:00").is_some());
        assert!(parse_flexible("2026-02-10 12:00:00.250").is_some());
        assert!(parse_flexible("not a time").is_none());
    }

    #[test]
    fn offset_input_normalizes_to_utc() {
        let dt = parse_flexible("2026-02-10T14:00:00+02:00").unwrap();
        assert_eq!(format_utc(dt), "2026-02-10T12:00:00.000000Z");
    }
}
