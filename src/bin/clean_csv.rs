//! Drop rows with oversized fields from the wraps export, blank `user_id`,
//! and lowercase `TRUE`/`FALSE`.

use anyhow::Result;
use std::path::Path;
use tracing::error;
use wrapseed::{clean, config, logging};

fn main() -> Result<()> {
    logging::init();

    let input = Path::new(config::RAW_CSV_PATH);
    let output = Path::new(config::CLEAN_CSV_PATH);

    let stats = clean::clean_csv(input, output).inspect_err(|e| error!("clean failed: {:#}", e))?;
    println!(
        "Successfully processed {} rows. Skipped {} rows containing errors or huge data.",
        stats.written, stats.skipped
    );
    Ok(())
}
