use careerak_common::config::AppConfig;
use careerak_common::db;
use careerak_common::redis_pool::create_redis_pool;
use careerak_engine::digest::DigestRunner;
use careerak_engine::schedule::DigestSchedule;
use careerak_notifier::{EmailSender, NotificationDispatcher, RealtimeBroadcaster};
use careerak_scheduler::ticker::DigestScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "careerak_scheduler=info,careerak_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Careerak digest scheduler starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database and Redis
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;
    let redis = create_redis_pool(&config.redis_url).await?;

    let realtime = if config.realtime_enabled {
        RealtimeBroadcaster::new(redis.clone())
    } else {
        RealtimeBroadcaster::disabled()
    };
    let dispatcher = NotificationDispatcher::new(realtime, EmailSender::from_config(&config));
    let runner = DigestRunner::new(pool, dispatcher, DigestSchedule::from_config(&config));

    let mut scheduler = DigestScheduler::new(runner, redis, config.scheduler_tick_secs);

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = scheduler.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Digest scheduler exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Careerak digest scheduler stopped.");
    Ok(())
}
