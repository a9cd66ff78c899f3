//! Ledger query interface.
//!
//! The ledger engine is an external collaborator reached through its query
//! gateway: `POST /transfers/query` with a [`QueryFilter`] returns transfers
//! ordered by timestamp, 128-bit fields encoded as decimal strings.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cdc_core::LedgerTransfer;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Transfer query: `ledger`/`code` match exactly, `timestamp_min` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub ledger: u32,
    pub code: u16,
    pub timestamp_min: u64,
    pub limit: u32,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Ledger API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Ledger query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Source of native transfer records.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Transfers matching `filter`, ascending by timestamp, at most `filter.limit`.
    async fn query_transfers(&self, filter: &QueryFilter) -> Result<Vec<LedgerTransfer>, LedgerError>;
}

/// HTTP client for the ledger query gateway.
#[derive(Clone)]
pub struct HttpLedger {
    base_url: String,
    client: reqwest::Client,
}

impl HttpLedger {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Check that the gateway answers; used to fail fast at startup.
    pub async fn health_check(&self) -> Result<(), LedgerError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Status { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerSource for HttpLedger {
    async fn query_transfers(&self, filter: &QueryFilter) -> Result<Vec<LedgerTransfer>, LedgerError> {
        let response = self
            .client
            .post(format!("{}/transfers/query", self.base_url))
            .json(filter)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Status { status, body });
        }

        let mut transfers: Vec<LedgerTransfer> = response.json().await?;
        transfers.sort_by_key(|t| t.timestamp);
        debug!(count = transfers.len(), timestamp_min = filter.timestamp_min, "Queried ledger");
        Ok(transfers)
    }
}

/// In-memory ledger for tests.
#[derive(Default)]
pub struct MemoryLedger {
    transfers: Mutex<Vec<LedgerTransfer>>,
    pending_failures: Mutex<u32>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, transfer: LedgerTransfer) {
        if let Ok(mut transfers) = self.transfers.lock() {
            transfers.push(transfer);
        }
    }

    /// Make the next `n` queries fail.
    pub fn fail_next(&self, n: u32) {
        if let Ok(mut pending) = self.pending_failures.lock() {
            *pending = n;
        }
    }
}

#[async_trait]
impl LedgerSource for MemoryLedger {
    async fn query_transfers(&self, filter: &QueryFilter) -> Result<Vec<LedgerTransfer>, LedgerError> {
        {
            let mut pending = self
                .pending_failures
                .lock()
                .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
            if *pending > 0 {
                *pending -= 1;
                return Err(LedgerError::Unavailable("injected failure".to_string()));
            }
        }

        let transfers = self
            .transfers
            .lock()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        let mut matching: Vec<LedgerTransfer> = transfers
            .iter()
            .filter(|t| t.ledger == filter.ledger && t.code == filter.code)
            .filter(|t| t.timestamp >= filter.timestamp_min)
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.timestamp);
        matching.truncate(filter.limit as usize);
        Ok(matching)
    }
}
