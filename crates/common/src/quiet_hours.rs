//! Quiet-hours window and wall-clock `HH:MM` parsing.
//!
//! A window is stored as two wall-clock times. When `start < end` the window is
//! the closed range `[start, end]`; otherwise it wraps midnight and covers
//! `t >= start || t <= end`. Equal bounds therefore silence the whole day.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Per-user quiet-hours window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub enabled: bool,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
        }
    }
}

impl QuietHours {
    /// Whether `now` falls inside the window. Always false when disabled.
    pub fn is_active_at(&self, now: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }

        // Minute resolution: 22:00:59 is still 22:00.
        let now = truncate_to_minute(now);

        if self.start < self.end {
            now >= self.start && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}

/// Parse a wall-clock time written as `H:MM` or `HH:MM` (hour 0-23, minute 00-59).
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let (hour, minute) = raw.trim().split_once(':')?;

    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
        return None;
    }
    if !hour.bytes().all(|b| b.is_ascii_digit()) || !minute.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Format a wall-clock time as zero-padded `HH:MM`.
pub fn format_clock_time(t: NaiveTime) -> String {
    format!("{:02}:{:02}", t.hour(), t.minute())
}

/// Serde adapter storing `NaiveTime` as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_clock_time(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_clock_time(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time {raw:?}, expected HH:MM")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> NaiveTime {
        parse_clock_time(raw).unwrap()
    }

    fn window(start: &str, end: &str) -> QuietHours {
        QuietHours {
            enabled: true,
            start: t(start),
            end: t(end),
        }
    }

    #[test]
    fn test_parse_clock_time_accepts_short_hour() {
        assert_eq!(parse_clock_time("9:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_clock_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_clock_time("23:59"), NaiveTime::from_hms_opt(23, 59, 0));
        assert_eq!(parse_clock_time("0:00"), NaiveTime::from_hms_opt(0, 0, 0));
    }

    #[test]
    fn test_parse_clock_time_rejects_invalid() {
        for raw in ["24:00", "12:60", "12:5", "123:00", "ab:cd", "12", "", ":30", "12:30:00", "-1:30"] {
            assert!(parse_clock_time(raw).is_none(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_disabled_window_never_active() {
        let mut quiet = window("00:00", "23:59");
        quiet.enabled = false;
        assert!(!quiet.is_active_at(t("12:00")));
    }

    #[test]
    fn test_same_day_window_inclusive() {
        let quiet = window("13:00", "15:00");
        assert!(quiet.is_active_at(t("13:00")));
        assert!(quiet.is_active_at(t("14:10")));
        assert!(quiet.is_active_at(t("15:00")));
        assert!(!quiet.is_active_at(t("12:59")));
        assert!(!quiet.is_active_at(t("15:01")));
    }

    #[test]
    fn test_window_spanning_midnight() {
        let quiet = window("22:00", "08:00");
        assert!(quiet.is_active_at(t("22:00")));
        assert!(quiet.is_active_at(t("23:45")));
        assert!(quiet.is_active_at(t("00:00")));
        assert!(quiet.is_active_at(t("08:00")));
        assert!(!quiet.is_active_at(t("08:01")));
        assert!(!quiet.is_active_at(t("21:59")));
        assert!(!quiet.is_active_at(t("12:00")));
    }

    #[test]
    fn test_equal_bounds_cover_whole_day() {
        let quiet = window("06:00", "06:00");
        assert!(quiet.is_active_at(t("06:00")));
        assert!(quiet.is_active_at(t("18:30")));
        assert!(quiet.is_active_at(t("03:00")));
    }

    #[test]
    fn test_seconds_are_truncated() {
        let quiet = window("13:00", "15:00");
        let just_after = NaiveTime::from_hms_opt(15, 0, 42).unwrap();
        assert!(quiet.is_active_at(just_after));
    }

    #[test]
    fn test_serde_uses_hh_mm() {
        let quiet = window("7:05", "22:00");
        let json = serde_json::to_value(quiet).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"enabled": true, "start": "07:05", "end": "22:00"})
        );

        let back: QuietHours = serde_json::from_value(json).unwrap();
        assert_eq!(back, quiet);

        let bad = serde_json::from_value::<QuietHours>(
            serde_json::json!({"enabled": true, "start": "25:00", "end": "08:00"}),
        );
        assert!(bad.is_err());
    }
}
