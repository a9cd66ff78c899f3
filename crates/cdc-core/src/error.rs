//! Centralized error types for the CDC bridge.

use thiserror::Error;

/// Errors raised while converting between native ledger records and the
/// canonical wire representation.
///
/// Every variant is a data-integrity error: the record is rejected and
/// dead-lettered, never forwarded in a truncated or guessed form.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Amount overflow for transfer {transfer_id}: {amount} does not fit in 64 bits")]
    AmountOverflow { transfer_id: String, amount: u128 },

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Checkpoint store failures (high-water mark and consumer offsets).
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint backend error: {0}")]
    Backend(String),

    #[error("Corrupt checkpoint value for '{key}': {value}")]
    Corrupt { key: String, value: String },
}

/// Failure to record a dead letter.
#[derive(Error, Debug)]
pub enum DeadLetterError {
    #[error("Dead-letter backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Main error type for CDC operations.
#[derive(Error, Debug)]
pub enum CdcError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Dead-letter error: {0}")]
    DeadLetter(#[from] DeadLetterError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for CDC operations.
pub type CdcResult<T> = Result<T, CdcError>;

impl CdcError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl CodecError {
    /// Create a malformed-record error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Short machine-readable reason used when dead-lettering.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AmountOverflow { .. } => "amount_overflow",
            Self::Malformed(_) => "malformed_record",
            Self::Json(_) => "invalid_json",
        }
    }
}
