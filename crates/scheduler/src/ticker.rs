use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;
use tokio::time::MissedTickBehavior;

use careerak_engine::digest::{DigestRunReport, DigestRunner};

/// Wakes up every tick and runs whichever digest periods are due.
///
/// Each period is claimed through the Redis run lock, so several scheduler
/// replicas can run side by side and a restart never re-sends a period.
pub struct DigestScheduler {
    runner: DigestRunner,
    redis: ConnectionManager,
    tick: Duration,
}

impl DigestScheduler {
    pub fn new(runner: DigestRunner, redis: ConnectionManager, tick_secs: u64) -> Self {
        Self {
            runner,
            redis,
            tick: tick_interval(tick_secs),
        }
    }

    /// Run the tick loop. Runs indefinitely until the task is cancelled.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let schedule = self.runner.schedule();
        tracing::info!(
            tick_secs = self.tick.as_secs(),
            daily_hour = schedule.daily_hour,
            weekly_day = %schedule.weekly_day,
            "Digest scheduler started"
        );

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.tick_once().await;
        }
    }

    /// Run every due period once.
    pub async fn tick_once(&mut self) -> Vec<DigestRunReport> {
        let reports = self.runner.run_due(&mut self.redis, Utc::now()).await;
        for report in &reports {
            tracing::info!(
                frequency = %report.frequency,
                period_key = %report.period_key,
                users_notified = report.users_notified,
                items_digested = report.items_digested,
                users_deferred = report.users_deferred,
                "Digest period delivered"
            );
        }
        reports
    }
}

fn tick_interval(tick_secs: u64) -> Duration {
    Duration::from_secs(tick_secs.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_interval_has_floor() {
        assert_eq!(tick_interval(0), Duration::from_secs(1));
        assert_eq!(tick_interval(60), Duration::from_secs(60));
    }
}
