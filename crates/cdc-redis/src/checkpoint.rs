//! Redis implementation of [`CheckpointStore`].
//!
//! Keys:
//! - `cdc:{connector_id}:hwm`: high-water mark (decimal string)
//! - `cdc:{group}:offsets:{topic}`: hash of partition -> last processed offset
//!
//! Writes go through Lua scripts that only replace a stored value with a
//! larger one, so a late or replayed writer can never move progress back.
//! Values are compared as decimal strings (length, then lexicographic) since
//! Lua numbers are doubles and ledger timestamps exceed 2^53.

use async_trait::async_trait;
use cdc_core::{CheckpointError, CheckpointStore, ConsumerCheckpoint};
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use tracing::debug;

use crate::client::{RedisError, RedisPool};

const ADVANCE_KEY: &str = r#"
local cur = redis.call('GET', KEYS[1])
local new = ARGV[1]
if (not cur) or (#new > #cur) or (#new == #cur and new > cur) then
  redis.call('SET', KEYS[1], new)
  return 1
end
return 0
"#;

const ADVANCE_FIELD: &str = r#"
local cur = redis.call('HGET', KEYS[1], ARGV[1])
local new = ARGV[2]
if (not cur) or (#new > #cur) or (#new == #cur and new > cur) then
  redis.call('HSET', KEYS[1], ARGV[1], new)
  return 1
end
return 0
"#;

/// Checkpoint store persisted in Redis.
#[derive(Clone)]
pub struct RedisCheckpointStore {
    pool: RedisPool,
    advance_key: Script,
    advance_field: Script,
}

impl RedisCheckpointStore {
    pub fn new(pool: RedisPool) -> Self {
        Self {
            pool,
            advance_key: Script::new(ADVANCE_KEY),
            advance_field: Script::new(ADVANCE_FIELD),
        }
    }
}

fn mark_key(connector_id: &str) -> String {
    format!("cdc:{connector_id}:hwm")
}

fn offsets_key(group: &str, topic: &str) -> String {
    format!("cdc:{group}:offsets:{topic}")
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, CheckpointError> {
    raw.parse().map_err(|_| CheckpointError::Corrupt {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_offsets(
    key: &str,
    topic: &str,
    raw: HashMap<String, String>,
) -> Result<Vec<ConsumerCheckpoint>, CheckpointError> {
    let mut checkpoints = raw
        .into_iter()
        .map(|(partition, offset)| {
            Ok(ConsumerCheckpoint {
                topic: topic.to_string(),
                partition: parse_value(key, &partition)?,
                offset: parse_value(key, &offset)?,
            })
        })
        .collect::<Result<Vec<_>, CheckpointError>>()?;
    checkpoints.sort_by_key(|c| c.partition);
    Ok(checkpoints)
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    async fn load_high_water_mark(&self, connector_id: &str) -> Result<Option<u64>, CheckpointError> {
        let mut conn = self.pool.clone();
        let key = mark_key(connector_id);
        let raw: Option<String> = conn.get(&key).await.map_err(RedisError::from)?;
        raw.map(|v| parse_value(&key, &v)).transpose()
    }

    async fn save_high_water_mark(&self, connector_id: &str, mark: u64) -> Result<(), CheckpointError> {
        let mut conn = self.pool.clone();
        let key = mark_key(connector_id);
        let updated: i64 = self
            .advance_key
            .key(&key)
            .arg(mark.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        debug!(key = %key, mark, updated = updated == 1, "Saved high-water mark");
        Ok(())
    }

    async fn load_offset(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> Result<Option<i64>, CheckpointError> {
        let mut conn = self.pool.clone();
        let key = offsets_key(group, topic);
        let raw: Option<String> = conn
            .hget(&key, partition.to_string())
            .await
            .map_err(RedisError::from)?;
        raw.map(|v| parse_value(&key, &v)).transpose()
    }

    async fn commit_offset(&self, group: &str, checkpoint: &ConsumerCheckpoint) -> Result<(), CheckpointError> {
        if checkpoint.offset < 0 {
            return Err(CheckpointError::Corrupt {
                key: offsets_key(group, &checkpoint.topic),
                value: checkpoint.offset.to_string(),
            });
        }
        let mut conn = self.pool.clone();
        let key = offsets_key(group, &checkpoint.topic);
        let _: i64 = self
            .advance_field
            .key(&key)
            .arg(checkpoint.partition.to_string())
            .arg(checkpoint.offset.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(())
    }

    async fn list_offsets(&self, group: &str, topic: &str) -> Result<Vec<ConsumerCheckpoint>, CheckpointError> {
        let mut conn = self.pool.clone();
        let key = offsets_key(group, topic);
        let raw: HashMap<String, String> = conn.hgetall(&key).await.map_err(RedisError::from)?;
        parse_offsets(&key, topic, raw)
    }
}
