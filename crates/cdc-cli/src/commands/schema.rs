//! `schema`: idempotent graph constraint/index bootstrap.

use anyhow::Result;
use cdc_graph::schema;
use colored::Colorize;

use super::{GraphArgs, connect_graph};

pub async fn execute(args: GraphArgs) -> Result<()> {
    let client = connect_graph(&args).await?;

    println!("{}", "Initializing graph schema...".bold());
    schema::initialize_schema(&client).await?;

    for statement in schema::SCHEMA_STATEMENTS {
        println!("  {} {}", "✓".green(), statement.dimmed());
    }
    println!("\n{}", "Schema ready.".green().bold());
    Ok(())
}
