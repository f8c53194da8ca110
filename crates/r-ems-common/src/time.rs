//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the data response monitor."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Local, Utc};

/// Seconds elapsed from `earlier` to `later`, rounded to hundredths.
///
/// Negative spans are reported as-is; callers only pass ordered timestamps.
pub fn interval_seconds(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let millis = (later - earlier).num_milliseconds() as f64;
    round_to(millis / 1000.0, 2)
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Local wall-clock rendering with millisecond precision, as shown on device cards.
pub fn display_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn interval_is_rounded_to_hundredths() {
        let start = Utc::now();
        assert_eq!(interval_seconds(start, start + Duration::milliseconds(153)), 0.15);
        assert_eq!(interval_seconds(start, start + Duration::milliseconds(1_996)), 2.0);
        assert_eq!(interval_seconds(start, start), 0.0);
    }

    #[test]
    fn round_to_one_place() {
        assert_eq!(round_to(99.0, 1), 99.0);
        assert_eq!(round_to(66.666_666, 1), 66.7);
        assert_eq!(round_to(83.349, 1), 83.3);
    }

    #[test]
    fn display_timestamp_has_millis() {
        let rendered = display_timestamp(Utc::now());
        assert_eq!(rendered.len(), "2024-01-01 00:00:00.000".len());
    }
}
