//! Hardcoded locations and limits for the wraps migration.

/// Spreadsheet export as downloaded from the old project.
pub const RAW_CSV_PATH: &str = "assets/wraps_rows.csv";

/// Cleaner output, SQL generator input.
pub const CLEAN_CSV_PATH: &str = "assets/wraps_rows_clean.csv";

/// Seed script consumed by the database bootstrap.
pub const SEED_SQL_PATH: &str = "database/seed_wraps.sql";

/// Any field longer than this (in characters) marks the whole row as corrupt.
/// Real URLs stay well below it; pasted base64 images run to tens of thousands.
pub const MAX_FIELD_CHARS: usize = 2000;

/// Records decoded per arrow batch.
pub const BATCH_ROWS: usize = 1024;

pub const WRAPS_TABLE: &str = "wraps";
