//! Turn the cleaned wraps CSV into an idempotent upsert script.

use anyhow::Result;
use std::path::Path;
use tracing::error;
use wrapseed::{config, logging, seed};

fn main() -> Result<()> {
    logging::init();

    let input = Path::new(config::CLEAN_CSV_PATH);
    let output = Path::new(config::SEED_SQL_PATH);

    let stats =
        seed::generate_seed_sql(input, output).inspect_err(|e| error!("generate failed: {:#}", e))?;
    println!("Generated SQL for {} rows.", stats.generated);
    Ok(())
}
