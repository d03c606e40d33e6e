//! Redis-backed run lock for digest periods.
//!
//! Uses `SET key value NX EX ttl`: the first scheduler to claim a period key
//! runs it, every other replica (and every later tick) sees the key and skips.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use careerak_common::error::AppError;

const LOCK_PREFIX: &str = "digest:run";

pub struct DigestRunLock;

impl DigestRunLock {
    pub fn lock_key(period_key: &str) -> String {
        format!("{}:{}", LOCK_PREFIX, period_key)
    }

    /// Claim a period. Returns `true` if this caller now owns it.
    pub async fn try_acquire(
        redis: &mut ConnectionManager,
        period_key: &str,
        ttl_secs: u64,
    ) -> Result<bool, AppError> {
        let key = Self::lock_key(period_key);

        // Some("OK") when set, None when the key already exists.
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(redis)
            .await?;

        let acquired = result.is_some();
        if !acquired {
            tracing::debug!(key = %key, "Digest period already claimed");
        }

        Ok(acquired)
    }

    /// Drop a claim so the period can be retried.
    pub async fn release(redis: &mut ConnectionManager, period_key: &str) -> Result<(), AppError> {
        redis.del::<_, ()>(Self::lock_key(period_key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key() {
        assert_eq!(
            DigestRunLock::lock_key("daily:2025-03-04"),
            "digest:run:daily:2025-03-04"
        );
    }
}
