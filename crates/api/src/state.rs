//! Shared application state for the Axum API server.

use careerak_common::config::AppConfig;
use careerak_engine::admin::AdminNotificationService;
use careerak_engine::digest::DigestRunner;
use careerak_engine::notifications::UserNotificationService;
use careerak_engine::schedule::DigestSchedule;
use careerak_notifier::{EmailSender, NotificationDispatcher, RealtimeBroadcaster};
use redis::aio::ConnectionManager;
use sqlx::PgPool;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub config: AppConfig,
    pub admin_notifications: AdminNotificationService,
    pub notifications: UserNotificationService,
    pub digests: DigestRunner,
}

impl AppState {
    pub fn new(pool: PgPool, redis: ConnectionManager, config: AppConfig) -> Self {
        let realtime = if config.realtime_enabled {
            RealtimeBroadcaster::new(redis.clone())
        } else {
            RealtimeBroadcaster::disabled()
        };
        let dispatcher = NotificationDispatcher::new(realtime, EmailSender::from_config(&config));

        Self {
            admin_notifications: AdminNotificationService::new(pool.clone(), dispatcher.clone()),
            notifications: UserNotificationService::new(pool.clone(), dispatcher.clone()),
            digests: DigestRunner::new(
                pool.clone(),
                dispatcher,
                DigestSchedule::from_config(&config),
            ),
            pool,
            redis,
            config,
        }
    }
}
