use anyhow::{Context, Result};
use std::{path::Path, time::Instant};
use tracing::info;
use wrapseed::{clean, config, logging, seed};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    logging::init();
    let start = Instant::now();

    let raw = Path::new(config::RAW_CSV_PATH);
    let cleaned = Path::new(config::CLEAN_CSV_PATH);
    let sql = Path::new(config::SEED_SQL_PATH);

    // ─── 2) clean the raw export ─────────────────────────────────────
    let cleaned_stats = clean::clean_csv(raw, cleaned).context("clean stage")?;
    println!(
        "Successfully processed {} rows. Skipped {} rows containing errors or huge data.",
        cleaned_stats.written, cleaned_stats.skipped
    );

    // ─── 3) render the seed script ───────────────────────────────────
    let seed_stats = seed::generate_seed_sql(cleaned, sql).context("seed stage")?;
    println!("Generated SQL for {} rows.", seed_stats.generated);

    info!(elapsed = ?start.elapsed(), "all done");
    Ok(())
}
