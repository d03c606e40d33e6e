//! Digest cadence: which period is due for a batched frequency.
//!
//! Periods are identified by a key that doubles as the run-lock suffix:
//! `hourly:2025-03-04T09`, `daily:2025-03-04`, `weekly:2025-W10`.
//! All times are UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};

use careerak_common::config::AppConfig;
use careerak_common::types::Frequency;

const HOUR_SECS: u64 = 60 * 60;
const DAY_SECS: u64 = 24 * HOUR_SECS;
const WEEK_SECS: u64 = 7 * DAY_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestSchedule {
    /// Hour of day (UTC) at which daily and weekly digests go out.
    pub daily_hour: u32,
    pub weekly_day: Weekday,
}

impl Default for DigestSchedule {
    fn default() -> Self {
        Self {
            daily_hour: 9,
            weekly_day: Weekday::Mon,
        }
    }
}

impl DigestSchedule {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            daily_hour: config.digest_daily_hour,
            weekly_day: config.digest_weekly_day,
        }
    }

    /// Key of the period containing `now`, due or not. `None` for unbatched frequencies.
    pub fn current_period(&self, frequency: Frequency, now: DateTime<Utc>) -> Option<String> {
        match frequency {
            Frequency::Hourly => Some(now.format("hourly:%Y-%m-%dT%H").to_string()),
            Frequency::Daily => Some(now.format("daily:%Y-%m-%d").to_string()),
            Frequency::Weekly => {
                let week = now.iso_week();
                Some(format!("weekly:{}-W{:02}", week.year(), week.week()))
            }
            Frequency::Instant | Frequency::Disabled => None,
        }
    }

    /// Key of the current period if its send time has been reached.
    pub fn due_period(&self, frequency: Frequency, now: DateTime<Utc>) -> Option<String> {
        let due = match frequency {
            Frequency::Hourly => true,
            Frequency::Daily => now.hour() >= self.daily_hour,
            Frequency::Weekly => {
                let today = now.weekday().num_days_from_monday();
                let send_day = self.weekly_day.num_days_from_monday();
                today > send_day || (today == send_day && now.hour() >= self.daily_hour)
            }
            Frequency::Instant | Frequency::Disabled => false,
        };

        if due {
            self.current_period(frequency, now)
        } else {
            None
        }
    }

    /// Instant at which the period containing `now` becomes due.
    pub fn send_time(&self, frequency: Frequency, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let (date, hour): (NaiveDate, u32) = match frequency {
            Frequency::Hourly => (today, now.hour()),
            Frequency::Daily => (today, self.daily_hour),
            Frequency::Weekly => {
                let since_monday = now.weekday().num_days_from_monday();
                let send_offset = self.weekly_day.num_days_from_monday();
                let monday = today - Duration::days(i64::from(since_monday));
                (monday + Duration::days(i64::from(send_offset)), self.daily_hour)
            }
            Frequency::Instant | Frequency::Disabled => return None,
        };
        Some(date.and_hms_opt(hour, 0, 0)?.and_utc())
    }

    /// Newest item creation time a run at `now` may include: the period's
    /// send time, or `now` when running ahead of it.
    pub fn cutoff(&self, frequency: Frequency, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.send_time(frequency, now).map(|send| send.min(now))
    }

    /// Run-lock lifetime: twice the period, so a finished period stays locked
    /// until well after it has ended.
    pub fn lock_ttl(frequency: Frequency) -> Option<u64> {
        match frequency {
            Frequency::Hourly => Some(2 * HOUR_SECS),
            Frequency::Daily => Some(2 * DAY_SECS),
            Frequency::Weekly => Some(2 * WEEK_SECS),
            Frequency::Instant | Frequency::Disabled => None,
        }
    }
}
