//! CDC Core Library
//!
//! Domain types and contracts shared by the ledger connector and the graph sink:
//! the canonical [`TransferEvent`], its codec, the dedup cache, retry policy,
//! checkpoint and dead-letter contracts.

pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod dead_letter;
pub mod dedup;
pub mod error;
pub mod event;
pub mod retry;

pub use checkpoint::{CheckpointStore, ConsumerCheckpoint, MemoryCheckpointStore};
pub use dead_letter::{DeadLetter, DeadLetterSink, DeadLetterSource, MemoryDeadLetters};
pub use dedup::DedupCache;
pub use error::{CdcError, CdcResult, CheckpointError, CodecError, DeadLetterError};
pub use event::{Uint128, LedgerTransfer, TransferEvent};
pub use retry::{RetryConfig, RetryPolicy};
