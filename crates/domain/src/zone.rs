//! Display timezone (US Eastern)

use std::sync::LazyLock;

use jiff::Timestamp;
use jiff::tz::TimeZone;
use time::{OffsetDateTime, UtcOffset};

const EASTERN_ZONE: &str = "America/New_York";

static EASTERN: LazyLock<TimeZone> = LazyLock::new(|| {
    TimeZone::get(EASTERN_ZONE).unwrap_or_else(|error| {
        tracing::warn!(zone = EASTERN_ZONE, error = %error, "Time zone not found, showing UTC");
        TimeZone::UTC
    })
});

/// Convert an instant to US Eastern local time, using the offset the tz
/// database gives for that instant
pub fn to_us_eastern(instant: OffsetDateTime) -> OffsetDateTime {
    let Ok(timestamp) = Timestamp::from_second(instant.unix_timestamp()) else {
        return instant;
    };

    match UtcOffset::from_whole_seconds(EASTERN.to_offset(timestamp).seconds()) {
        Ok(offset) => instant.to_offset(offset),
        Err(_) => instant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::format_description::well_known::Rfc3339;

    fn at(s: &str) -> OffsetDateTime {
        OffsetDateTime::parse(s, &Rfc3339).unwrap()
    }

    fn offset_hours(s: &str) -> i8 {
        to_us_eastern(at(s)).offset().whole_hours()
    }

    #[test]
    fn test_winter_is_standard_time() {
        let local = to_us_eastern(at("2024-01-15T12:00:00Z"));
        assert_eq!(local.offset().whole_hours(), -5);
        assert_eq!(local.hour(), 7);
    }

    #[test]
    fn test_summer_is_daylight_time() {
        let local = to_us_eastern(at("2024-07-04T16:30:00Z"));
        assert_eq!(local.offset().whole_hours(), -4);
        assert_eq!(local.hour(), 12);
        assert_eq!(local.minute(), 30);
    }

    #[test]
    fn test_transition_boundaries_2024() {
        // DST began 2024-03-10 07:00 UTC, ended 2024-11-03 06:00 UTC
        assert_eq!(offset_hours("2024-03-10T06:59:59Z"), -5);
        assert_eq!(offset_hours("2024-03-10T07:00:00Z"), -4);
        assert_eq!(offset_hours("2024-11-03T05:59:59Z"), -4);
        assert_eq!(offset_hours("2024-11-03T06:00:00Z"), -5);
    }

    #[test]
    fn test_rules_before_2007() {
        // Until 2006 DST ran from the first Sunday of April to the last Sunday of October
        assert_eq!(offset_hours("2006-03-20T12:00:00Z"), -5);
        assert_eq!(offset_hours("2006-04-02T07:00:00Z"), -4);
        assert_eq!(offset_hours("2006-10-29T05:59:59Z"), -4);
        assert_eq!(offset_hours("2006-11-01T12:00:00Z"), -5);
    }

    #[test]
    fn test_instant_is_preserved() {
        let utc = at("2024-05-01T00:00:00Z");
        assert_eq!(to_us_eastern(utc), utc);
    }
}
