//! Neo4j connection client.

use anyhow::{Context, Result};
use cdc_core::config::{DEFAULT_NEO4J_PASSWORD, DEFAULT_NEO4J_URI, DEFAULT_NEO4J_USERNAME};
use neo4rs::{ConfigBuilder, Graph, Query};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Pool size; one connection per sink worker plus headroom.
    pub max_connections: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_NEO4J_URI.to_string(),
            user: DEFAULT_NEO4J_USERNAME.to_string(),
            password: DEFAULT_NEO4J_PASSWORD.to_string(),
            max_connections: 16,
        }
    }
}

/// Client for Neo4j graph operations.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Create a new GraphClient from config.
    ///
    /// neo4rs builds its pool lazily, so a `RETURN 1` ping runs immediately to
    /// surface an unreachable or misconfigured store at startup.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db("neo4j")
            .max_connections(config.max_connections)
            .fetch_size(200)
            .build()
            .context("Failed to build Neo4j config")?;

        let graph = Graph::connect(neo4j_config)
            .await
            .context("Failed to create Neo4j connection pool")?;

        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .context("Neo4j is not responding to queries")?;

        Ok(Self { graph })
    }

    /// Execute a Cypher query that returns no results.
    pub async fn execute(&self, query: Query) -> Result<()> {
        self.graph.run(query).await.context("Neo4j query execution failed")?;
        Ok(())
    }

    /// Execute a Cypher query and return results as rows.
    pub async fn query(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut result = self.graph.execute(query).await
            .context("Neo4j query failed")?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.context("Failed to read Neo4j row")? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a Cypher query and return a single scalar value.
    pub async fn query_scalar<T: DeserializeOwned>(&self, query: Query, field: &str) -> Result<Option<T>> {
        let rows = self.query(query).await?;
        if let Some(row) = rows.into_iter().next() {
            let val: T = row.get(field)
                .map_err(|e| anyhow::anyhow!("Failed to get field '{}': {:?}", field, e))?;
            Ok(Some(val))
        } else {
            Ok(None)
        }
    }

    /// Account node and transfer relationship counts for status display.
    pub async fn get_counts(&self) -> Result<GraphCounts> {
        let account_query = Query::new("MATCH (a:Account) RETURN count(a) AS count".to_string());
        let transfer_query = Query::new("MATCH ()-[r:SENT_TO]->() RETURN count(r) AS count".to_string());

        let accounts: i64 = self.query_scalar(account_query, "count").await?.unwrap_or(0);
        let transfers: i64 = self.query_scalar(transfer_query, "count").await?.unwrap_or(0);

        Ok(GraphCounts {
            accounts: accounts.max(0) as usize,
            transfers: transfers.max(0) as usize,
        })
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}

/// Account and transfer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphCounts {
    pub accounts: usize,
    pub transfers: usize,
}
