//! Checkpoint store contract: the extractor's high-water mark and the sink's
//! per-partition consumer offsets.
//!
//! Both values only ever move forward. Implementations must make each write
//! atomic on its own key; no cross-key ordering is required.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;

/// Last processed position of one log partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerCheckpoint {
    pub topic: String,
    pub partition: i32,
    /// Offset of the last record whose graph write succeeded (or was dead-lettered).
    pub offset: i64,
}

/// Durable storage for extractor and sink progress.
///
/// Implementations: `MemoryCheckpointStore` (tests, ephemeral runs) and
/// `cdc_redis::RedisCheckpointStore`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the persisted high-water mark for an extractor.
    async fn load_high_water_mark(&self, connector_id: &str) -> Result<Option<u64>, CheckpointError>;

    /// Persist a high-water mark. A value lower than the stored one is ignored.
    async fn save_high_water_mark(&self, connector_id: &str, mark: u64) -> Result<(), CheckpointError>;

    /// Load the last committed offset of a partition.
    async fn load_offset(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> Result<Option<i64>, CheckpointError>;

    /// Commit a partition offset. A value lower than the stored one is ignored.
    async fn commit_offset(&self, group: &str, checkpoint: &ConsumerCheckpoint) -> Result<(), CheckpointError>;

    /// All committed partition offsets for a group/topic, ordered by partition.
    async fn list_offsets(&self, group: &str, topic: &str) -> Result<Vec<ConsumerCheckpoint>, CheckpointError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    marks: HashMap<String, u64>,
    offsets: HashMap<(String, String, i32), i64>,
}

/// In-memory checkpoint store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<MemoryState>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, CheckpointError> {
        self.state
            .lock()
            .map_err(|e| CheckpointError::Backend(format!("checkpoint state poisoned: {e}")))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load_high_water_mark(&self, connector_id: &str) -> Result<Option<u64>, CheckpointError> {
        Ok(self.lock()?.marks.get(connector_id).copied())
    }

    async fn save_high_water_mark(&self, connector_id: &str, mark: u64) -> Result<(), CheckpointError> {
        let mut state = self.lock()?;
        let entry = state.marks.entry(connector_id.to_string()).or_insert(mark);
        *entry = (*entry).max(mark);
        Ok(())
    }

    async fn load_offset(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> Result<Option<i64>, CheckpointError> {
        let key = (group.to_string(), topic.to_string(), partition);
        Ok(self.lock()?.offsets.get(&key).copied())
    }

    async fn commit_offset(&self, group: &str, checkpoint: &ConsumerCheckpoint) -> Result<(), CheckpointError> {
        let key = (group.to_string(), checkpoint.topic.clone(), checkpoint.partition);
        let mut state = self.lock()?;
        let entry = state.offsets.entry(key).or_insert(checkpoint.offset);
        *entry = (*entry).max(checkpoint.offset);
        Ok(())
    }

    async fn list_offsets(&self, group: &str, topic: &str) -> Result<Vec<ConsumerCheckpoint>, CheckpointError> {
        let state = self.lock()?;
        let mut checkpoints: Vec<ConsumerCheckpoint> = state
            .offsets
            .iter()
            .filter(|((g, t, _), _)| g == group && t == topic)
            .map(|((_, t, p), offset)| ConsumerCheckpoint {
                topic: t.clone(),
                partition: *p,
                offset: *offset,
            })
            .collect();
        checkpoints.sort_by_key(|c| c.partition);
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_high_water_mark_never_regresses() {
        let store = MemoryCheckpointStore::new();
        assert_eq!(store.load_high_water_mark("c").await.unwrap(), None);
        store.save_high_water_mark("c", 10).await.unwrap();
        store.save_high_water_mark("c", 7).await.unwrap();
        assert_eq!(store.load_high_water_mark("c").await.unwrap(), Some(10));
        store.save_high_water_mark("c", 12).await.unwrap();
        assert_eq!(store.load_high_water_mark("c").await.unwrap(), Some(12));
    }

    #[tokio::test]
    async fn test_offsets_are_independent_per_partition() {
        let store = MemoryCheckpointStore::new();
        let cp = |partition, offset| ConsumerCheckpoint {
            topic: "transactions".into(),
            partition,
            offset,
        };
        store.commit_offset("g", &cp(1, 5)).await.unwrap();
        store.commit_offset("g", &cp(0, 3)).await.unwrap();
        store.commit_offset("g", &cp(1, 4)).await.unwrap();
        store.commit_offset("other", &cp(0, 99)).await.unwrap();

        assert_eq!(store.load_offset("g", "transactions", 1).await.unwrap(), Some(5));
        assert_eq!(store.load_offset("g", "transactions", 2).await.unwrap(), None);

        let listed = store.list_offsets("g", "transactions").await.unwrap();
        assert_eq!(listed, vec![cp(0, 3), cp(1, 5)]);
    }
}
