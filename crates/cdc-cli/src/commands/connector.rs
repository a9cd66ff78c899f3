//! `connector`: ledger extractor + event publisher.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cdc_connector::{Extractor, HttpLedger, KafkaPublisher};
use cdc_core::config::{
    DEFAULT_CONNECTOR_ID, DEFAULT_LEDGER_ADDRESS, DEFAULT_LEDGER_CODE, DEFAULT_LEDGER_ID,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUERY_LIMIT, ExtractorConfig, PublisherConfig,
};
use cdc_redis::{RedisCheckpointStore, RedisDeadLetters};
use clap::Args;
use tracing::{info, warn};

use super::{LogArgs, RedisArgs, STARTUP_TIMEOUT, shutdown_token};

#[derive(Args, Debug, Clone)]
pub struct ConnectorArgs {
    /// Ledger query gateway address
    #[arg(long, env = "LEDGER_ADDRESS", default_value = DEFAULT_LEDGER_ADDRESS)]
    pub ledger_address: String,

    /// Ledger to extract
    #[arg(long, env = "LEDGER_ID", default_value = DEFAULT_LEDGER_ID)]
    pub ledger_id: u32,

    /// Transfer code to extract
    #[arg(long, env = "LEDGER_CODE", default_value = DEFAULT_LEDGER_CODE)]
    pub ledger_code: u16,

    /// Maximum transfers per poll
    #[arg(long, env = "LEDGER_QUERY_LIMIT", default_value = DEFAULT_QUERY_LIMIT)]
    pub query_limit: u32,

    /// Poll interval in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Namespace of the persisted high-water mark
    #[arg(long, env = "CONNECTOR_ID", default_value = DEFAULT_CONNECTOR_ID)]
    pub connector_id: String,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(flatten)]
    pub redis: RedisArgs,
}

impl ConnectorArgs {
    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            connector_id: self.connector_id.clone(),
            ledger: self.ledger_id,
            code: self.ledger_code,
            query_limit: self.query_limit,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            ..ExtractorConfig::default()
        }
    }

    pub fn publisher_config(&self) -> Result<PublisherConfig> {
        Ok(PublisherConfig {
            brokers: self.log.brokers()?,
            topic: self.log.topic.clone(),
            ..PublisherConfig::default()
        })
    }
}

pub async fn execute(args: ConnectorArgs) -> Result<()> {
    let extractor_config = args.extractor_config();
    let publisher_config = args.publisher_config()?;
    extractor_config.validate()?;
    publisher_config.validate()?;

    info!(
        ledger_address = %args.ledger_address,
        ledger = extractor_config.ledger,
        code = extractor_config.code,
        query_limit = extractor_config.query_limit,
        poll_interval_ms = args.poll_interval_ms,
        brokers = %publisher_config.brokers,
        topic = %publisher_config.topic,
        connector_id = %extractor_config.connector_id,
        "Starting connector"
    );

    let ledger = HttpLedger::new(&args.ledger_address, extractor_config.query_timeout)?;
    ledger
        .health_check()
        .await
        .with_context(|| format!("Ledger gateway unreachable at {}", args.ledger_address))?;

    let pool = cdc_redis::init_pool(&args.redis.redis_url)
        .await
        .context("Checkpoint store unreachable")?;

    let publisher = KafkaPublisher::new(&publisher_config)?;
    publisher
        .verify(STARTUP_TIMEOUT)
        .await
        .with_context(|| format!("Event log unreachable at {}", publisher_config.brokers))?;

    let checkpoints = Arc::new(RedisCheckpointStore::new(pool.clone()));
    let dead_letters = Arc::new(RedisDeadLetters::new(pool, &extractor_config.connector_id));

    let extractor = Extractor::new(extractor_config, ledger, publisher.clone(), checkpoints, dead_letters);
    extractor.run(shutdown_token()).await?;

    if let Err(e) = publisher.flush(publisher_config.delivery_timeout).await {
        warn!(error = %e, "Publisher flush on shutdown failed");
    }
    info!("Connector stopped");
    Ok(())
}
