//! Redis connection pool management

use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};
use std::time::Duration;

use crate::{
    config::RedisConfig,
    error::{Error, Result},
};

/// Create the publish-side Redis pool with retry logic
///
/// Retries follow `max_retries` and `retry_delay_secs` from the configuration.
/// The pool is only returned once a checked-out connection answers `PING`.
pub(crate) async fn create_pool(config: &RedisConfig) -> Result<Pool> {
    create_pool_with_retries(config, config.max_retries).await
}

/// Create a Redis connection pool with configurable retries
///
/// Uses exponential backoff strategy for retries
async fn create_pool_with_retries(config: &RedisConfig, max_retries: u32) -> Result<Pool> {
    let mut attempt = 0;

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "Redis connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "Redis connection pool created: max_connections={}",
                        config.max_connections
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to Redis after {} attempts: {}",
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = backoff_delay(config.retry_delay(), attempt, None);

                tracing::warn!(
                    "Redis connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Attempt to create a Redis pool (single try)
async fn try_create_pool(config: &RedisConfig) -> Result<Pool> {
    let cfg = DeadpoolConfig::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| Error::Pool(format!("Failed to build Redis pool: {}", e)))?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| Error::Pool(format!("Failed to create Redis pool: {}", e)))?;

    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<()>(&mut conn).await?;
    drop(conn);

    Ok(pool)
}

/// Exponential backoff: `base * 2^(attempt-1)`, optionally capped
///
/// `attempt` is 1-based. The exponent saturates so large attempt counts
/// never overflow.
pub(crate) fn backoff_delay(base: Duration, attempt: u32, cap: Option<Duration>) -> Duration {
    let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
    let delay = base.saturating_mul(multiplier);

    match cap {
        Some(cap) => delay.min(cap),
        None => delay,
    }
}
