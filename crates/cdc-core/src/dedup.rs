//! Bounded dedup cache for overlapping poll windows.
//!
//! Suppresses re-emission of transfer ids already acknowledged in a recent
//! window. It lives in process memory only; the persisted high-water mark is
//! what guarantees correctness across restarts.

use std::num::NonZeroUsize;
use std::time::Instant;

use lru::LruCache;

use crate::event::Uint128;

/// Capacity-limited id -> insertion time map with oldest-first eviction.
///
/// Lookups go through `contains`/`peek`, so the recency order is the insertion
/// order and the least recently used entry is the oldest one.
#[derive(Debug)]
pub struct DedupCache {
    entries: LruCache<Uint128, Instant>,
}

impl DedupCache {
    /// Create a cache holding at most `capacity` ids (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn contains(&self, id: &Uint128) -> bool {
        self.entries.contains(id)
    }

    /// Record `id`. Re-inserting a present id keeps its original position.
    ///
    /// Returns the evicted id, if the insert pushed the cache over capacity.
    pub fn insert(&mut self, id: Uint128) -> Option<Uint128> {
        if self.entries.contains(&id) {
            return None;
        }
        self.entries.push(id, Instant::now()).map(|(evicted, _)| evicted)
    }

    /// When `id` was inserted, if still cached.
    pub fn inserted_at(&self, id: &Uint128) -> Option<Instant> {
        self.entries.peek(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
