//! Idempotent transfer materialization.
//!
//! One managed transaction per event: merge the debit account, merge the
//! credit account, merge the `SENT_TO` relationship keyed by `txId`. A replay
//! matches the existing relationship and changes nothing.

use async_trait::async_trait;
use cdc_core::TransferEvent;
use neo4rs::{Query, query};
use thiserror::Error;
use tracing::debug;

use crate::GraphClient;

/// Cypher for a single transfer.
///
/// `ON CREATE SET` keeps the first-written properties on replay instead of
/// rewriting them.
pub const UPSERT_TRANSFER: &str = "
MERGE (from:Account {id: $debit_id})
MERGE (to:Account {id: $credit_id})
MERGE (from)-[r:SENT_TO {txId: $tx_id}]->(to)
ON CREATE SET r.amount = $amount, r.ledger = $ledger
";

#[derive(Error, Debug)]
pub enum MaterializeError {
    /// Connectivity or transaction failure; the write can be retried.
    #[error("Graph write failed: {0}")]
    Transient(String),

    /// The event can never be written as-is; retrying is pointless.
    #[error("Transfer {transfer_id} cannot be materialized: {reason}")]
    Permanent { transfer_id: String, reason: String },
}

impl MaterializeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<neo4rs::Error> for MaterializeError {
    fn from(err: neo4rs::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

/// Writes one transfer event into the graph store.
#[async_trait]
pub trait Materializer: Send + Sync {
    async fn materialize(&self, event: &TransferEvent) -> Result<(), MaterializeError>;
}

/// Graph integers are signed 64-bit.
pub fn graph_amount(event: &TransferEvent) -> Result<i64, MaterializeError> {
    i64::try_from(event.amount).map_err(|_| MaterializeError::Permanent {
        transfer_id: event.id.to_string(),
        reason: format!("amount {} exceeds the graph integer range", event.amount),
    })
}

/// Build the parameterized upsert for an event.
pub fn upsert_query(event: &TransferEvent) -> Result<Query, MaterializeError> {
    let amount = graph_amount(event)?;
    Ok(query(UPSERT_TRANSFER)
        .param("debit_id", event.debit_account_id.to_string())
        .param("credit_id", event.credit_account_id.to_string())
        .param("tx_id", event.id.to_string())
        .param("amount", amount)
        .param("ledger", i64::from(event.ledger)))
}

/// Neo4j-backed materializer.
///
/// Each sink worker holds its own instance; every call checks one connection
/// out of the pool for the duration of its transaction.
#[derive(Clone)]
pub struct GraphMaterializer {
    client: GraphClient,
}

impl GraphMaterializer {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Materializer for GraphMaterializer {
    async fn materialize(&self, event: &TransferEvent) -> Result<(), MaterializeError> {
        let upsert = upsert_query(event)?;

        let mut txn = self.client.inner().start_txn().await?;
        if let Err(e) = txn.run(upsert).await {
            if let Err(rollback) = txn.rollback().await {
                debug!(transfer_id = %event.id, error = %rollback, "Rollback after failed write also failed");
            }
            return Err(e.into());
        }
        txn.commit().await?;

        debug!(
            transfer_id = %event.id,
            from = %event.debit_account_id,
            to = %event.credit_account_id,
            amount = event.amount,
            "Materialized transfer"
        );
        Ok(())
    }
}
