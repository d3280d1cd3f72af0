use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    config::WRAPS_TABLE,
    table::{self, Record, Row},
};

const INSERT_COLUMNS: &str = "id, name, category, texture_url, preview_url, model_slug, \
                              is_public, prompt, description, user_id, created_at, updated_at";

/// Columns refreshed when a row with the same `id` already exists.
const UPDATE_ON_CONFLICT: [&str; 4] = ["name", "texture_url", "preview_url", "is_public"];

/// Fallback order for an empty `preview_url`.
const PREVIEW_FALLBACKS: [&str; 3] = ["thumb_url", "thumbnail_url", "texture_url"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedStats {
    pub generated: u64,
    pub skipped: u64,
}

/// Quote `value` as a SQL string literal; empty or missing becomes `NULL`.
pub fn escape_sql(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => format!("'{}'", v.replace('\'', "''")),
        _ => "NULL".to_string(),
    }
}

/// One row of the `wraps` table. `user_id` and the timestamps are fixed at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapRecord {
    pub id: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub texture_url: String,
    pub preview_url: String,
    pub model_slug: Option<String>,
    pub is_public: bool,
    pub prompt: Option<String>,
    pub description: Option<String>,
}

impl WrapRecord {
    /// `None` when `name` or `texture_url` is empty; such rows are not seeded.
    pub fn from_row(row: &Row) -> Option<Self> {
        let name = row.non_empty("name")?;
        let texture_url = row.non_empty("texture_url")?;

        let preview_url = row
            .non_empty("preview_url")
            .or_else(|| PREVIEW_FALLBACKS.iter().find_map(|c| row.non_empty(c)))
            .unwrap_or(texture_url);

        let text = |col: &str| row.non_empty(col).map(str::to_string);

        Some(Self {
            id: text("id"),
            name: name.to_string(),
            category: text("category"),
            texture_url: texture_url.to_string(),
            preview_url: preview_url.to_string(),
            model_slug: text("model_slug"),
            is_public: parse_is_public(row.get("is_public")),
            prompt: text("prompt"),
            description: text("description"),
        })
    }

    pub fn upsert_statement(&self) -> String {
        let values = [
            escape_sql(self.id.as_deref()),
            escape_sql(Some(self.name.as_str())),
            escape_sql(self.category.as_deref()),
            escape_sql(Some(self.texture_url.as_str())),
            escape_sql(Some(self.preview_url.as_str())),
            escape_sql(self.model_slug.as_deref()),
            self.is_public.to_string(),
            escape_sql(self.prompt.as_deref()),
            escape_sql(self.description.as_deref()),
            "NULL".to_string(),
            "NOW()".to_string(),
            "NOW()".to_string(),
        ];
        let updates = UPDATE_ON_CONFLICT
            .iter()
            .map(|c| format!("    {c} = EXCLUDED.{c}"))
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "INSERT INTO {WRAPS_TABLE} ({INSERT_COLUMNS})\n\
             VALUES ({})\n\
             ON CONFLICT (id) DO UPDATE SET\n\
             {updates};\n",
            values.join(", ")
        )
    }
}

/// Anything other than a case-insensitive `false` counts as public.
fn parse_is_public(raw: Option<&str>) -> bool {
    !matches!(raw, Some(v) if v.eq_ignore_ascii_case("false"))
}

/// Read the cleaned CSV at `input` and write a transactional upsert script to `output`.
pub fn generate_seed_sql(input: &Path, output: &Path) -> Result<SeedStats> {
    let start = Instant::now();
    info!(input = %input.display(), output = %output.display(), "generating seed SQL");

    let schema = table::read_header(input)?;
    let records = table::open_rows(input, &schema)?;

    table::create_parent_dir(output)?;
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "-- Seed data for {WRAPS_TABLE} table")?;
    writeln!(
        out,
        "-- Generated by wrapseed at {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    )?;
    writeln!(out, "BEGIN;")?;

    let mut stats = SeedStats::default();
    for record in records {
        let row = match record.with_context(|| format!("reading {}", input.display()))? {
            Record::Row(row) => row,
            Record::Malformed { line, reason } => {
                warn!(line, "skipping malformed record: {}", reason);
                stats.skipped += 1;
                continue;
            }
        };

        match WrapRecord::from_row(&row) {
            Some(wrap) => {
                writeln!(out)?;
                out.write_all(wrap.upsert_statement().as_bytes())
                    .with_context(|| format!("writing {}", output.display()))?;
                stats.generated += 1;
            }
            None => {
                debug!(id = row.get("id").unwrap_or(""), "no name or texture_url");
                stats.skipped += 1;
            }
        }
    }

    writeln!(out, "COMMIT;")?;
    out.flush()
        .with_context(|| format!("flushing {}", output.display()))?;

    info!(
        generated = stats.generated,
        skipped = stats.skipped,
        elapsed = ?start.elapsed(),
        "wrote seed SQL"
    );
    Ok(stats)
}
