//! Redis connection pool management.

use cdc_core::{CheckpointError, DeadLetterError};
use redis::aio::ConnectionManager;
use thiserror::Error;

/// Redis error types.
#[derive(Error, Debug)]
pub enum RedisError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for Redis operations.
pub type RedisResult<T> = Result<T, RedisError>;

/// Redis connection pool: ConnectionManager handles multiplexing and
/// reconnects internally. It is Clone, so callers clone it to get a mutable
/// handle for each operation.
pub type RedisPool = ConnectionManager;

/// Initialize a Redis connection pool from a URL and verify it answers.
///
/// Example URL: `redis://127.0.0.1:6379`
pub async fn init_pool(redis_url: &str) -> RedisResult<RedisPool> {
    let client = redis::Client::open(redis_url)?;
    let mut manager = ConnectionManager::new(client).await?;
    let _: String = redis::cmd("PING").query_async(&mut manager).await?;
    Ok(manager)
}

impl From<RedisError> for CheckpointError {
    fn from(err: RedisError) -> Self {
        CheckpointError::Backend(err.to_string())
    }
}

impl From<RedisError> for DeadLetterError {
    fn from(err: RedisError) -> Self {
        DeadLetterError::Backend(err.to_string())
    }
}
