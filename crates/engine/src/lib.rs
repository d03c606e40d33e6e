//! Notification delivery engine.
//!
//! - `preferences`: per-user type settings, quiet hours, frequency, push endpoints
//! - `admin`: admin/moderator fan-out with preference and quiet-hours filtering
//! - `notifications`: user notifications routed to instant delivery or a digest
//! - `digest`, `schedule`, `run_lock`: batched delivery on an hourly/daily/weekly cadence

pub mod admin;
pub mod digest;
pub mod notifications;
pub mod preferences;
pub mod run_lock;
pub mod schedule;

use chrono::{Local, NaiveTime};

/// Wall-clock time used for quiet-hours checks (server local time).
pub fn local_wall_clock() -> NaiveTime {
    Local::now().time()
}
