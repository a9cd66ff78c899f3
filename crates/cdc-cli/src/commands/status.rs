//! `status`: persisted progress, parked dead letters and graph size.

use anyhow::{Context, Result};
use cdc_core::CheckpointStore;
use cdc_core::config::{DEFAULT_CONNECTOR_ID, DEFAULT_CONSUMER_GROUP, DEFAULT_TOPIC};
use cdc_redis::{RedisCheckpointStore, RedisDeadLetters};
use clap::Args;
use colored::Colorize;

use super::{GraphArgs, RedisArgs, connect_graph};

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Namespace of the extractor's high-water mark
    #[arg(long, env = "CONNECTOR_ID", default_value = DEFAULT_CONNECTOR_ID)]
    pub connector_id: String,

    /// Consumer group of the sink
    #[arg(long, env = "REDPANDA_CONSUMER_GROUP", default_value = DEFAULT_CONSUMER_GROUP)]
    pub group: String,

    /// Transfer topic
    #[arg(long, env = "REDPANDA_TOPIC", default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Number of recent dead letters to list
    #[arg(long, default_value = "5")]
    pub recent: usize,

    #[command(flatten)]
    pub graph: GraphArgs,

    #[command(flatten)]
    pub redis: RedisArgs,
}

pub async fn execute(args: StatusArgs) -> Result<()> {
    let pool = cdc_redis::init_pool(&args.redis.redis_url)
        .await
        .context("Checkpoint store unreachable")?;
    let checkpoints = RedisCheckpointStore::new(pool.clone());
    let dead_letters = RedisDeadLetters::new(pool, &args.connector_id);

    println!("{}", "Ledger CDC Status".bold());
    println!("{}", "─".repeat(50));

    println!("{}", "Connector".cyan().bold());
    let mark = checkpoints.load_high_water_mark(&args.connector_id).await?;
    match mark {
        Some(mark) => println!("  High-water mark:     {}", mark.to_string().green()),
        None => println!("  High-water mark:     {}", "none (starts from the beginning)".dimmed()),
    }
    let parked = dead_letters.count().await?;
    let parked_label = if parked == 0 { parked.to_string().green() } else { parked.to_string().red() };
    println!("  Dead letters:        {}", parked_label);
    for letter in dead_letters.recent(args.recent).await? {
        println!(
            "    {} {} {} {}",
            "→".dimmed(),
            letter.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            letter.reason.yellow(),
            letter.transfer_id.as_deref().unwrap_or("-")
        );
    }

    println!("\n{} ({} / {})", "Sink".cyan().bold(), args.group, args.topic);
    let offsets = checkpoints.list_offsets(&args.group, &args.topic).await?;
    if offsets.is_empty() {
        println!("  {}", "No committed offsets.".dimmed());
    } else {
        println!("  {:<12} {:>12}", "Partition", "Offset");
        for checkpoint in &offsets {
            println!("  {:<12} {:>12}", checkpoint.partition, checkpoint.offset);
        }
    }

    println!("\n{}", "Graph".cyan().bold());
    match connect_graph(&args.graph).await {
        Ok(client) => {
            let counts = client.get_counts().await?;
            println!("  Accounts:            {}", counts.accounts.to_string().bold());
            println!("  Transfers:           {}", counts.transfers.to_string().bold());
        }
        Err(e) => println!("  {} {:#}", "unreachable:".red(), e),
    }

    Ok(())
}
