//! Redis list dead-letter sink.
//!
//! Used by the connector for records rejected by the codec: they must never
//! reach the main log, so they are parked in `cdc:{connector_id}:dead_letters`.

use async_trait::async_trait;
use cdc_core::{DeadLetter, DeadLetterError, DeadLetterSink};
use redis::AsyncCommands;

use crate::client::{RedisError, RedisPool};

#[derive(Clone)]
pub struct RedisDeadLetters {
    pool: RedisPool,
    key: String,
}

impl RedisDeadLetters {
    pub fn new(pool: RedisPool, connector_id: &str) -> Self {
        Self {
            pool,
            key: format!("cdc:{connector_id}:dead_letters"),
        }
    }

    /// Number of parked dead letters.
    pub async fn count(&self) -> Result<u64, DeadLetterError> {
        let mut conn = self.pool.clone();
        let len: u64 = conn.llen(&self.key).await.map_err(RedisError::from)?;
        Ok(len)
    }

    /// Most recent dead letters, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<DeadLetter>, DeadLetterError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.clone();
        let raw: Vec<String> = conn
            .lrange(&self.key, 0, limit as isize - 1)
            .await
            .map_err(RedisError::from)?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(DeadLetterError::from))
            .collect()
    }
}

#[async_trait]
impl DeadLetterSink for RedisDeadLetters {
    async fn dead_letter(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        letter.log();
        let json = serde_json::to_string(&letter)?;
        let mut conn = self.pool.clone();
        conn.lpush::<_, _, ()>(&self.key, json)
            .await
            .map_err(RedisError::from)?;
        Ok(())
    }
}
