//! `sink`: event consumer + graph materializer.

use std::sync::Arc;

use anyhow::{Context, Result};
use cdc_core::config::{DEFAULT_CONSUMER_GROUP, DEFAULT_DEAD_LETTER_TOPIC, SinkConfig};
use cdc_graph::{GraphMaterializer, schema};
use cdc_redis::RedisCheckpointStore;
use cdc_sink::{KafkaDeadLetters, KafkaLogConsumer, SinkOrchestrator};
use clap::Args;
use tracing::info;

use super::{GraphArgs, LogArgs, RedisArgs, STARTUP_TIMEOUT, connect_graph, shutdown_token};

#[derive(Args, Debug, Clone)]
pub struct SinkArgs {
    /// Consumer group id
    #[arg(long, env = "REDPANDA_CONSUMER_GROUP", default_value = DEFAULT_CONSUMER_GROUP)]
    pub group: String,

    /// Topic for records that could not be materialized
    #[arg(long, env = "DEAD_LETTER_TOPIC", default_value = DEFAULT_DEAD_LETTER_TOPIC)]
    pub dead_letter_topic: String,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(flatten)]
    pub graph: GraphArgs,

    #[command(flatten)]
    pub redis: RedisArgs,
}

impl SinkArgs {
    pub fn sink_config(&self) -> Result<SinkConfig> {
        Ok(SinkConfig {
            brokers: self.log.brokers()?,
            topic: self.log.topic.clone(),
            group_id: self.group.clone(),
            dead_letter_topic: self.dead_letter_topic.clone(),
            ..SinkConfig::default()
        })
    }
}

pub async fn execute(args: SinkArgs) -> Result<()> {
    let config = args.sink_config()?;
    config.validate()?;
    let graph_config = args.graph.config();

    info!(
        brokers = %config.brokers,
        topic = %config.topic,
        group = %config.group_id,
        dead_letter_topic = %config.dead_letter_topic,
        neo4j_uri = %graph_config.uri,
        "Starting sink"
    );

    let graph = connect_graph(&args.graph).await?;
    schema::initialize_schema(&graph).await?;

    let pool = cdc_redis::init_pool(&args.redis.redis_url)
        .await
        .context("Checkpoint store unreachable")?;

    let consumer = KafkaLogConsumer::new(&config)?;
    consumer
        .verify(STARTUP_TIMEOUT)
        .await
        .with_context(|| format!("Event log unreachable at {}", config.brokers))?;
    let dead_letters = KafkaDeadLetters::new(&config.brokers, &config.dead_letter_topic, STARTUP_TIMEOUT)?;

    let orchestrator = SinkOrchestrator::new(
        config,
        Arc::new(consumer),
        GraphMaterializer::new(graph),
        Arc::new(RedisCheckpointStore::new(pool)),
        Arc::new(dead_letters),
    );
    orchestrator.run(shutdown_token()).await;
    Ok(())
}
