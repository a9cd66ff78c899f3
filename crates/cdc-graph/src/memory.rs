//! In-memory graph for tests and dry runs.
//!
//! Mirrors the Neo4j write semantics: accounts merged by id, relationships
//! merged by transfer id, every write all-or-nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cdc_core::TransferEvent;

use crate::materializer::{MaterializeError, Materializer, graph_amount};

/// A materialized `SENT_TO` relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEdge {
    pub from: String,
    pub to: String,
    pub amount: i64,
    pub ledger: i64,
}

#[derive(Default)]
struct GraphState {
    accounts: BTreeSet<String>,
    edges: BTreeMap<String, StoredEdge>,
    pending_failures: u32,
    writes: u64,
}

/// Shared in-memory graph; clones see the same state.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    state: Arc<Mutex<GraphState>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, GraphState>, MaterializeError> {
        self.state
            .lock()
            .map_err(|e| MaterializeError::Transient(format!("graph state poisoned: {e}")))
    }

    /// Make the next `n` writes fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.pending_failures = n;
        }
    }

    pub fn account_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.accounts.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn edge(&self, transfer_id: &str) -> Option<StoredEdge> {
        self.state.lock().ok()?.edges.get(transfer_id).cloned()
    }

    pub fn edge_count(&self) -> usize {
        self.state.lock().map(|s| s.edges.len()).unwrap_or(0)
    }

    /// Successful write transactions, replays included.
    pub fn write_count(&self) -> u64 {
        self.state.lock().map(|s| s.writes).unwrap_or(0)
    }
}

#[async_trait]
impl Materializer for MemoryGraph {
    async fn materialize(&self, event: &TransferEvent) -> Result<(), MaterializeError> {
        let amount = graph_amount(event)?;
        let mut state = self.lock()?;
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(MaterializeError::Transient("injected failure".to_string()));
        }

        let from = event.debit_account_id.to_string();
        let to = event.credit_account_id.to_string();
        state.accounts.insert(from.clone());
        state.accounts.insert(to.clone());
        state
            .edges
            .entry(event.id.to_string())
            .or_insert(StoredEdge {
                from,
                to,
                amount,
                ledger: i64::from(event.ledger),
            });
        state.writes += 1;
        Ok(())
    }
}
