//! CDC Redis persistence
//!
//! Durable progress for the bridge: the extractor's high-water mark, the
//! sink's per-partition offsets, and a dead-letter list for records rejected
//! before they reach the log.

pub mod checkpoint;
pub mod client;
pub mod dead_letter;

pub use checkpoint::RedisCheckpointStore;
pub use client::{RedisError, RedisPool, RedisResult, init_pool};
pub use dead_letter::RedisDeadLetters;
