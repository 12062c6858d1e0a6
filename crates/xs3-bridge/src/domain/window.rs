//! Access-window time handling.
//!
//! The backend stores window bounds on a 5-minute UTC grid and compares them
//! at minute granularity. Begin values floor down, end values ceil up.

use crate::domain::error::{BridgeError, BridgeResult};
use chrono::{DateTime, NaiveDateTime, Utc};

const GRID_SECS: i64 = 300;

/// Wire format for window bounds
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Floor to the 5-minute UTC grid
pub fn floor_5min(t: DateTime<Utc>) -> DateTime<Utc> {
    let floored = t.timestamp().div_euclid(GRID_SECS) * GRID_SECS;
    DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(t)
}

/// Ceil to the 5-minute UTC grid
pub fn ceil_5min(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    if secs.rem_euclid(GRID_SECS) == 0 && t.timestamp_subsec_nanos() == 0 {
        return t;
    }
    let ceiled = (secs.div_euclid(GRID_SECS) + 1) * GRID_SECS;
    DateTime::<Utc>::from_timestamp(ceiled, 0).unwrap_or(t)
}

/// Equality at minute granularity
pub fn same_minute(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.timestamp().div_euclid(60) == b.timestamp().div_euclid(60)
}

pub fn format_wire(t: DateTime<Utc>) -> String {
    t.format(WIRE_FORMAT).to_string()
}

/// Parse a caller-supplied ISO-8601 timestamp that must carry a zone.
///
/// Accepts `YYYY-MM-DDTHH:MM[:SS[.fff]]` followed by `Z` or `±HH:MM`.
pub fn parse_iso_with_offset(input: &str, field: &str) -> BridgeResult<DateTime<Utc>> {
    let invalid = || {
        BridgeError::validation(format!(
            "{field} must be ISO 8601 with timezone (e.g. 2025-09-30T12:09:02Z or +02:00)"
        ))
    };

    let bytes = input.as_bytes();
    if bytes.len() < 17 || bytes[10] != b'T' {
        return Err(invalid());
    }
    let normalized = match input.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{rest}+00:00"),
        None => input.to_string(),
    };
    DateTime::parse_from_rfc3339(&normalized)
        .or_else(|_| DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M%:z"))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| invalid())
}

/// Lenient parse of a timestamp read back from the backend.
///
/// Values without a zone are taken as UTC.
pub fn parse_backend_timestamp(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = parse_iso_with_offset(input, "value") {
        return Some(t);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Validated access window: `begin < end` and `end` lies in the future
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AccessWindow {
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> BridgeResult<Self> {
        if end <= begin {
            return Err(BridgeError::validation(
                "checkOut must be strictly after checkIn",
            ));
        }
        if end <= now {
            return Err(BridgeError::validation("checkOut must be in the future"));
        }
        Ok(Self { begin, end })
    }

    /// Parse and validate a `checkIn`/`checkOut` pair
    pub fn parse(check_in: &str, check_out: &str, now: DateTime<Utc>) -> BridgeResult<Self> {
        let begin = parse_iso_with_offset(check_in, "checkIn")?;
        let end = parse_iso_with_offset(check_out, "checkOut")?;
        Self::new(begin, end, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_floor_and_ceil() {
        assert_eq!(floor_5min(utc(10, 3, 0)), utc(10, 0, 0));
        assert_eq!(floor_5min(utc(10, 4, 59)), utc(10, 0, 0));
        assert_eq!(ceil_5min(utc(10, 3, 0)), utc(10, 5, 0));
        assert_eq!(ceil_5min(utc(10, 5, 0)), utc(10, 5, 0));
        assert_eq!(ceil_5min(utc(23, 58, 1)), Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_ceil_with_subsecond_remainder() {
        let t = utc(10, 5, 0) + chrono::Duration::milliseconds(1);
        assert_eq!(ceil_5min(t), utc(10, 10, 0));
    }

    #[test]
    fn test_same_minute() {
        assert!(same_minute(utc(10, 0, 0), utc(10, 0, 59)));
        assert!(!same_minute(utc(10, 0, 59), utc(10, 1, 0)));
    }

    #[test]
    fn test_format_wire() {
        assert_eq!(format_wire(utc(10, 0, 0)), "2025-01-01T10:00:00Z");
    }

    #[test]
    fn test_parse_iso_with_offset_accepts_zones() {
        assert_eq!(
            parse_iso_with_offset("2025-01-01T10:03:00Z", "checkIn").unwrap(),
            utc(10, 3, 0)
        );
        assert_eq!(
            parse_iso_with_offset("2025-01-01T12:03:00+02:00", "checkIn").unwrap(),
            utc(10, 3, 0)
        );
        assert_eq!(
            parse_iso_with_offset("2025-01-01T10:03z", "checkIn").unwrap(),
            utc(10, 3, 0)
        );
        assert_eq!(
            parse_iso_with_offset("2025-01-01T10:03:00.250Z", "checkIn").unwrap(),
            utc(10, 3, 0) + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn test_parse_iso_with_offset_rejects_naive() {
        let err = parse_iso_with_offset("2025-01-01T10:03:00", "checkIn").unwrap_err();
        assert!(err.to_string().contains("checkIn"));
        assert!(parse_iso_with_offset("2025-01-01 10:03:00Z", "checkIn").is_err());
        assert!(parse_iso_with_offset("tomorrow", "checkIn").is_err());
    }

    #[test]
    fn test_parse_backend_timestamp_naive_is_utc() {
        assert_eq!(parse_backend_timestamp("2025-01-01T10:00:00"), Some(utc(10, 0, 0)));
        assert_eq!(parse_backend_timestamp("2025-01-01T10:00"), Some(utc(10, 0, 0)));
        assert_eq!(parse_backend_timestamp("2025-01-01T10:00:00Z"), Some(utc(10, 0, 0)));
        assert_eq!(parse_backend_timestamp("garbage"), None);
    }

    #[test]
    fn test_window_validation() {
        let now = utc(9, 0, 0);
        assert!(AccessWindow::new(utc(10, 0, 0), utc(11, 0, 0), now).is_ok());
        assert!(AccessWindow::new(utc(11, 0, 0), utc(11, 0, 0), now).is_err());
        assert!(AccessWindow::new(utc(8, 0, 0), utc(8, 30, 0), now).is_err());
    }

    proptest! {
        #[test]
        fn prop_grid_is_idempotent(secs in 0i64..4_102_444_800, nanos in 0u32..1_000_000_000) {
            let t = DateTime::<Utc>::from_timestamp(secs, nanos).unwrap();
            let f = floor_5min(t);
            let c = ceil_5min(t);
            prop_assert_eq!(floor_5min(f), f);
            prop_assert_eq!(ceil_5min(c), c);
            prop_assert!(f <= t && t <= c);
            prop_assert!(c - f <= chrono::Duration::minutes(5));
        }

        #[test]
        fn prop_same_floor_same_minute(secs in 0i64..4_102_444_800, jitter in 0i64..300) {
            let base = DateTime::<Utc>::from_timestamp(secs.div_euclid(300) * 300, 0).unwrap();
            let t = base + chrono::Duration::seconds(jitter);
            prop_assert!(same_minute(floor_5min(t), floor_5min(base)));
        }

        #[test]
        fn prop_inverted_windows_rejected(begin in 0i64..4_000_000_000, back in 0i64..1_000_000) {
            let b = DateTime::<Utc>::from_timestamp(begin, 0).unwrap();
            let e = b - chrono::Duration::seconds(back);
            let now = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
            prop_assert!(AccessWindow::new(b, e, now).is_err());
        }
    }
}
