//! Batched delivery.
//!
//! Notifications in hourly/daily/weekly categories are parked in
//! `digest_items`. When a period is due the runner folds each user's pending
//! items into a single `digest` notification and marks them digested in the
//! same transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use redis::aio::ConnectionManager;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use careerak_common::error::AppError;
use careerak_common::types::{DigestItem, Frequency, NotificationType, Priority, TypeSetting};
use careerak_notifier::NotificationDispatcher;

use crate::notifications::{CreateNotificationParams, UserNotificationService, insert_notification};
use crate::preferences::PreferenceService;
use crate::run_lock::DigestRunLock;
use crate::schedule::DigestSchedule;

/// Item titles listed in a digest body before "and N more".
const MAX_LISTED_ITEMS: usize = 5;

/// Storage for notifications waiting on a digest.
pub struct DigestQueue;

impl DigestQueue {
    pub async fn enqueue(
        pool: &PgPool,
        params: &CreateNotificationParams,
        frequency: Frequency,
    ) -> Result<DigestItem, AppError> {
        if !frequency.is_batched() {
            return Err(AppError::Validation(format!(
                "Frequency '{}' cannot be batched",
                frequency
            )));
        }

        let item: DigestItem = sqlx::query_as(
            r#"
            INSERT INTO digest_items
                (id, user_id, type, category, frequency, priority, title, message, related_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.recipient_id)
        .bind(params.notification_type.as_str())
        .bind(params.notification_type.category().as_str())
        .bind(frequency.as_str())
        .bind(params.priority.as_str())
        .bind(&params.title)
        .bind(&params.message)
        .bind(&params.related_data)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::missing_reference(e, "User"))?;

        tracing::info!(
            user_id = %params.recipient_id,
            notification_type = %params.notification_type,
            frequency = %frequency,
            "Notification queued for digest"
        );

        Ok(item)
    }

    /// Users with undelivered items of `frequency` created up to `before`.
    pub async fn pending_users(
        pool: &PgPool,
        frequency: Frequency,
        before: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        let users: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT user_id FROM digest_items
            WHERE frequency = $1 AND digested_at IS NULL AND created_at <= $2
            ORDER BY user_id
            "#,
        )
        .bind(frequency.as_str())
        .bind(before)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    pub async fn pending_items(
        pool: &PgPool,
        user_id: Uuid,
        frequency: Frequency,
        before: DateTime<Utc>,
    ) -> Result<Vec<DigestItem>, AppError> {
        let items: Vec<DigestItem> = sqlx::query_as(
            r#"
            SELECT * FROM digest_items
            WHERE user_id = $1 AND frequency = $2 AND digested_at IS NULL AND created_at <= $3
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .bind(frequency.as_str())
        .bind(before)
        .fetch_all(pool)
        .await?;

        Ok(items)
    }
}

/// Rendered digest content.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestSummary {
    pub title: String,
    pub message: String,
    pub related_data: serde_json::Value,
}

/// Fold pending items into one digest notification body.
pub fn build_digest(frequency: Frequency, items: &[DigestItem]) -> DigestSummary {
    let count = items.len();
    let noun = if count == 1 { "notification" } else { "notifications" };
    let title = format!("Your {} digest: {} new {}", frequency, count, noun);

    let mut lines: Vec<String> = items
        .iter()
        .take(MAX_LISTED_ITEMS)
        .map(|item| format!("- {}", item.title))
        .collect();
    if count > MAX_LISTED_ITEMS {
        lines.push(format!("and {} more", count - MAX_LISTED_ITEMS));
    }

    let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
    for item in items {
        *categories.entry(item.category.as_str()).or_default() += 1;
    }
    let item_ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();

    DigestSummary {
        title,
        message: lines.join("\n"),
        related_data: serde_json::json!({
            "frequency": frequency,
            "item_ids": item_ids,
            "categories": categories,
        }),
    }
}

/// Totals for one digest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestRunReport {
    pub frequency: Frequency,
    pub period_key: String,
    pub users_notified: u32,
    pub items_digested: u64,
    /// Users skipped because their quiet hours were active.
    pub users_deferred: u32,
}

/// Builds and delivers digests for one frequency at a time.
#[derive(Clone)]
pub struct DigestRunner {
    pool: PgPool,
    notifications: UserNotificationService,
    schedule: DigestSchedule,
}

impl DigestRunner {
    pub fn new(pool: PgPool, dispatcher: NotificationDispatcher, schedule: DigestSchedule) -> Self {
        let notifications = UserNotificationService::new(pool.clone(), dispatcher);
        Self {
            pool,
            notifications,
            schedule,
        }
    }

    pub fn schedule(&self) -> &DigestSchedule {
        &self.schedule
    }

    /// Deliver every pending digest of `frequency` created up to `cutoff`,
    /// checking quiet hours at `now`.
    ///
    /// Does not take the run lock; see [`run_period`](Self::run_period).
    pub async fn run(
        &self,
        frequency: Frequency,
        period_key: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DigestRunReport, AppError> {
        if !frequency.is_batched() {
            return Err(AppError::Validation(format!(
                "Frequency '{}' has no digest",
                frequency
            )));
        }

        let mut report = DigestRunReport {
            frequency,
            period_key: period_key.to_string(),
            users_notified: 0,
            items_digested: 0,
            users_deferred: 0,
        };

        let wall_clock = now.with_timezone(&Local).time();
        let users = DigestQueue::pending_users(&self.pool, frequency, cutoff).await?;

        for user_id in users {
            let prefs = PreferenceService::find(&self.pool, user_id).await?;

            // Digests are low priority, so quiet hours always hold them back.
            if prefs
                .as_ref()
                .is_some_and(|p| p.quiet_hours.is_active_at(wall_clock))
            {
                tracing::debug!(user_id = %user_id, frequency = %frequency, "Digest deferred: quiet hours");
                report.users_deferred += 1;
                continue;
            }

            let items = DigestQueue::pending_items(&self.pool, user_id, frequency, cutoff).await?;
            if items.is_empty() {
                continue;
            }

            let setting = prefs
                .as_ref()
                .map(|p| p.user_setting(NotificationType::Digest))
                .unwrap_or_default();

            let delivered = self.deliver_digest(user_id, frequency, &items, setting).await?;
            report.items_digested += items.len() as u64;
            if delivered {
                report.users_notified += 1;
            }
        }

        tracing::info!(
            frequency = %frequency,
            period_key = %period_key,
            users_notified = report.users_notified,
            items_digested = report.items_digested,
            users_deferred = report.users_deferred,
            "Digest run complete"
        );

        Ok(report)
    }

    /// Insert the digest and retire its items atomically, then send it.
    /// With the `digest` type disabled the items are retired without a notification.
    async fn deliver_digest(
        &self,
        user_id: Uuid,
        frequency: Frequency,
        items: &[DigestItem],
        setting: TypeSetting,
    ) -> Result<bool, AppError> {
        let item_ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();

        let mut tx = self.pool.begin().await?;

        let notification = if setting.enabled {
            let summary = build_digest(frequency, items);
            let params = CreateNotificationParams {
                recipient_id: user_id,
                notification_type: NotificationType::Digest,
                priority: Priority::Low,
                title: summary.title,
                message: summary.message,
                related_data: summary.related_data,
            };
            Some(insert_notification(&mut *tx, &params).await?)
        } else {
            None
        };

        sqlx::query("UPDATE digest_items SET digested_at = NOW() WHERE id = ANY($1)")
            .bind(&item_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let Some(notification) = notification else {
            tracing::info!(user_id = %user_id, items = items.len(), "Digest type disabled, items retired");
            return Ok(false);
        };

        self.notifications.deliver(notification, setting).await;
        Ok(true)
    }

    /// Run a period under its lock. `None` when another run already claimed it.
    /// The lock is released after a failed run, and after a run that deferred
    /// users, so a later tick retries them.
    pub async fn run_period(
        &self,
        redis: &mut ConnectionManager,
        frequency: Frequency,
        period_key: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<DigestRunReport>, AppError> {
        let ttl = DigestSchedule::lock_ttl(frequency).ok_or_else(|| {
            AppError::Validation(format!("Frequency '{}' has no digest", frequency))
        })?;

        if !DigestRunLock::try_acquire(redis, period_key, ttl).await? {
            return Ok(None);
        }

        match self.run(frequency, period_key, cutoff, now).await {
            Ok(report) => {
                if report.users_deferred > 0 {
                    tracing::info!(
                        period_key = %period_key,
                        users_deferred = report.users_deferred,
                        "Digest period left open for deferred users"
                    );
                    DigestRunLock::release(redis, period_key).await?;
                }
                Ok(Some(report))
            }
            Err(e) => {
                if let Err(release_err) = DigestRunLock::release(redis, period_key).await {
                    tracing::error!(
                        period_key = %period_key,
                        error = %release_err,
                        "Failed to release digest lock"
                    );
                }
                Err(e)
            }
        }
    }

    /// Run the current period of `frequency` regardless of schedule, taking
    /// everything pending up to `now`. A period that already ran is a conflict.
    pub async fn run_now(
        &self,
        redis: &mut ConnectionManager,
        frequency: Frequency,
        now: DateTime<Utc>,
    ) -> Result<DigestRunReport, AppError> {
        let period_key = self
            .schedule
            .current_period(frequency, now)
            .ok_or_else(|| {
                AppError::Validation(format!("Frequency '{}' has no digest", frequency))
            })?;

        self.run_period(redis, frequency, &period_key, now, now)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!("Digest {} has already run", period_key))
            })
    }

    /// Run every batched frequency whose period is due. Failures are logged
    /// per frequency so one failing cadence does not block the others.
    pub async fn run_due(
        &self,
        redis: &mut ConnectionManager,
        now: DateTime<Utc>,
    ) -> Vec<DigestRunReport> {
        let mut reports = Vec::new();

        for frequency in Frequency::BATCHED {
            let Some(period_key) = self.schedule.due_period(*frequency, now) else {
                continue;
            };
            let Some(cutoff) = self.schedule.cutoff(*frequency, now) else {
                continue;
            };

            match self
                .run_period(redis, *frequency, &period_key, cutoff, now)
                .await
            {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(e) => tracing::error!(
                    frequency = %frequency,
                    period_key = %period_key,
                    error = %e,
                    "Digest run failed"
                ),
            }
        }

        reports
    }
}
