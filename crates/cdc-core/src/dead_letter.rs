//! Dead-letter path for records that cannot be forwarded or materialized.
//!
//! A dead letter is an operator-visible gap: it is logged at error level and
//! stored with enough context (transfer id, source position, raw payload) to
//! allow a manual replay.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::DeadLetterError;

/// Where a dead-lettered record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeadLetterSource {
    /// Rejected by the extractor before reaching the log.
    Ledger { timestamp: u64 },
    /// Skipped by the sink at a log position.
    Log { topic: String, partition: i32, offset: i64 },
}

/// A rejected or skipped record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub reason: String,
    pub detail: String,
    pub transfer_id: Option<String>,
    pub source: DeadLetterSource,
    /// Raw payload (wire JSON or debug form of the native record).
    pub payload: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(reason: impl Into<String>, detail: impl Into<String>, source: DeadLetterSource) -> Self {
        Self {
            reason: reason.into(),
            detail: detail.into(),
            transfer_id: None,
            source,
            payload: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_transfer_id(mut self, id: impl Into<String>) -> Self {
        self.transfer_id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Emit the operator-visible log line for this dead letter.
    pub fn log(&self) {
        error!(
            alert = "dead_letter",
            reason = %self.reason,
            transfer_id = self.transfer_id.as_deref().unwrap_or("-"),
            source = ?self.source,
            detail = %self.detail,
            "Record dead-lettered"
        );
    }
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(&self, letter: DeadLetter) -> Result<(), DeadLetterError>;
}

/// In-memory dead-letter sink for tests.
#[derive(Default)]
pub struct MemoryDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded letters, in arrival order.
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetters {
    async fn dead_letter(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        letter.log();
        self.letters
            .lock()
            .map_err(|e| DeadLetterError::Backend(format!("dead-letter buffer poisoned: {e}")))?
            .push(letter);
        Ok(())
    }
}
