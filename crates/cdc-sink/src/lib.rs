//! Sink side of the ledger CDC bridge.
//!
//! Consumes canonical transfer events from the log under a durable consumer
//! group and materializes them into the graph with commit-after-write
//! semantics.

pub mod consumer;
pub mod dead_letter;
pub mod orchestrator;

pub use consumer::{ConsumeError, KafkaLogConsumer, LogConsumer, SourceRecord};
pub use dead_letter::KafkaDeadLetters;
pub use orchestrator::{SinkOrchestrator, WriteOutcome};
