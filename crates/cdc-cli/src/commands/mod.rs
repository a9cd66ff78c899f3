//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cdc_core::config::{
    DEFAULT_BROKERS, DEFAULT_NEO4J_PASSWORD, DEFAULT_NEO4J_URI, DEFAULT_NEO4J_USERNAME, DEFAULT_REDIS_URL,
    DEFAULT_TOPIC, parse_brokers,
};
use cdc_graph::{GraphClient, GraphConfig};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod connector;
pub mod schema;
pub mod sink;
pub mod status;

/// Upper bound on each startup connectivity check.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Ledger CDC - ledger to graph change-data-capture bridge
#[derive(Parser)]
#[command(name = "ledger-cdc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the ledger and publish transfers to the event log
    Connector(connector::ConnectorArgs),

    /// Consume the event log and materialize transfers into the graph
    Sink(sink::SinkArgs),

    /// Show persisted progress, dead letters and graph size
    Status(status::StatusArgs),

    /// Create graph constraints and indexes
    Schema(GraphArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Connector(args) => connector::execute(args).await,
            Commands::Sink(args) => sink::execute(args).await,
            Commands::Status(args) => status::execute(args).await,
            Commands::Schema(args) => schema::execute(args).await,
        }
    }
}

/// Event log location.
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Comma-separated broker addresses
    #[arg(long, env = "REDPANDA_BROKERS", default_value = DEFAULT_BROKERS)]
    pub brokers: String,

    /// Transfer topic
    #[arg(long, env = "REDPANDA_TOPIC", default_value = DEFAULT_TOPIC)]
    pub topic: String,
}

impl LogArgs {
    /// Normalized broker list, rejecting an empty one.
    pub fn brokers(&self) -> Result<String> {
        let brokers = parse_brokers(&self.brokers);
        anyhow::ensure!(!brokers.is_empty(), "No broker address configured");
        Ok(brokers.join(","))
    }
}

/// Graph store connection.
#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    #[arg(long, env = "NEO4J_URI", default_value = DEFAULT_NEO4J_URI)]
    pub neo4j_uri: String,

    #[arg(long, env = "NEO4J_USERNAME", default_value = DEFAULT_NEO4J_USERNAME)]
    pub neo4j_username: String,

    #[arg(long, env = "NEO4J_PASSWORD", default_value = DEFAULT_NEO4J_PASSWORD, hide_env_values = true)]
    pub neo4j_password: String,
}

impl GraphArgs {
    pub fn config(&self) -> GraphConfig {
        GraphConfig {
            uri: self.neo4j_uri.clone(),
            user: self.neo4j_username.clone(),
            password: self.neo4j_password.clone(),
            ..GraphConfig::default()
        }
    }
}

/// Connect to the graph store, bounded by [`STARTUP_TIMEOUT`].
pub async fn connect_graph(args: &GraphArgs) -> Result<GraphClient> {
    let config = args.config();
    tokio::time::timeout(STARTUP_TIMEOUT, GraphClient::connect(&config))
        .await
        .map_err(|_| anyhow::anyhow!("Timed out connecting to the graph store at {}", config.uri))?
        .with_context(|| format!("Graph store unreachable at {}", config.uri))
}

/// Checkpoint store connection.
#[derive(Args, Debug, Clone)]
pub struct RedisArgs {
    #[arg(long, env = "REDIS_URL", default_value = DEFAULT_REDIS_URL)]
    pub redis_url: String,
}

/// Token cancelled on Ctrl-C or SIGTERM.
pub fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received, finishing in-flight work");
        trigger.cancel();
    });
    cancel
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Cannot install SIGTERM handler, listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
