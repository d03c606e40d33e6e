use std::str::FromStr;

use chrono::Weekday;
use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// JWT secret shared with the platform auth service
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Port the API server binds to
    pub api_port: u16,

    /// Publish realtime events over Redis pub/sub
    pub realtime_enabled: bool,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Resend API base URL
    pub resend_base_url: String,

    /// Hour of day (UTC) at which daily and weekly digests go out
    pub digest_daily_hour: u32,

    /// Day of week on which the weekly digest goes out
    pub digest_weekly_day: Weekday,

    /// Seconds between scheduler ticks
    pub scheduler_tick_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let digest_daily_hour: u32 = parse_var("DIGEST_DAILY_HOUR", var("DIGEST_DAILY_HOUR"), "9")?;
        if digest_daily_hour > 23 {
            anyhow::bail!("DIGEST_DAILY_HOUR must be between 0 and 23");
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: parse_var("JWT_EXPIRY_HOURS", var("JWT_EXPIRY_HOURS"), "24")?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"), "20")?,
            api_port: parse_var("API_PORT", var("API_PORT"), "3000")?,
            realtime_enabled: parse_var("REALTIME_ENABLED", var("REALTIME_ENABLED"), "true")?,
            resend_api_key: var("RESEND_API_KEY"),
            email_from: var("EMAIL_FROM"),
            resend_base_url: var("RESEND_BASE_URL")
                .unwrap_or_else(|| "https://api.resend.com".to_string()),
            digest_daily_hour,
            digest_weekly_day: parse_var("DIGEST_WEEKLY_DAY", var("DIGEST_WEEKLY_DAY"), "mon")?,
            scheduler_tick_secs: parse_var(
                "SCHEDULER_TICK_SECS",
                var("SCHEDULER_TICK_SECS"),
                "60",
            )?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an optional raw value, falling back to `default` when unset.
fn parse_var<T: FromStr>(key: &str, raw: Option<String>, default: &str) -> anyhow::Result<T> {
    let raw = raw.unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_uses_default() {
        let port: u16 = parse_var("API_PORT", None, "3000").unwrap();
        assert_eq!(port, 3000);
    }

    #[test]
    fn test_parse_var_overrides_default() {
        let hours: u64 = parse_var("JWT_EXPIRY_HOURS", Some(" 48 ".to_string()), "24").unwrap();
        assert_eq!(hours, 48);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        let err = parse_var::<u32>("DB_MAX_CONNECTIONS", Some("lots".to_string()), "20")
            .unwrap_err()
            .to_string();
        assert!(err.contains("DB_MAX_CONNECTIONS"));
    }

    #[test]
    fn test_parse_weekday_and_bool() {
        let day: Weekday = parse_var("DIGEST_WEEKLY_DAY", Some("fri".to_string()), "mon").unwrap();
        assert_eq!(day, Weekday::Fri);
        let enabled: bool = parse_var("REALTIME_ENABLED", Some("false".to_string()), "true").unwrap();
        assert!(!enabled);
    }
}
