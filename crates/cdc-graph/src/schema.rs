//! Neo4j schema initialization (constraints and indexes).

use anyhow::Result;
use neo4rs::Query;
use tracing::info;

use crate::GraphClient;

/// Cypher statements for schema initialization.
///
/// The uniqueness constraint makes concurrent `MERGE (:Account {id})` from
/// different partition workers safe; the relationship index keeps the
/// merge-by-`txId` lookup cheap.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT account_id IF NOT EXISTS FOR (a:Account) REQUIRE a.id IS UNIQUE",
    "CREATE INDEX sent_to_tx_id IF NOT EXISTS FOR ()-[r:SENT_TO]-() ON (r.txId)",
];

/// Initialize Neo4j schema with constraints and indexes.
///
/// Safe to run multiple times - uses IF NOT EXISTS clauses.
pub async fn initialize_schema(client: &GraphClient) -> Result<()> {
    info!("Initializing Neo4j schema...");

    for statement in SCHEMA_STATEMENTS {
        client.execute(Query::new(statement.to_string())).await?;
    }

    info!("Neo4j schema initialized ({} statements)", SCHEMA_STATEMENTS.len());
    Ok(())
}
