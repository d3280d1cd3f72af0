use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    csv::{reader::Format, Writer, WriterBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};
use tracing::debug;

pub type CsvWriter = Writer<BufWriter<File>>;

/// One CSV record keyed by the header. Missing or empty cells are `""`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl Row {
    fn new(columns: Arc<[String]>, values: Vec<String>) -> Self {
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs, keeping their order.
    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let columns: Arc<[String]> = pairs.iter().map(|(k, _)| k.to_string()).collect();
        let values = pairs.iter().map(|(_, v)| v.to_string()).collect();
        Self { columns, values }
    }

    #[cfg(test)]
    pub(crate) fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [String] {
        &mut self.values
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// `None` when the header has no such column.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Like `get`, but an empty value counts as absent.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// Overwrite a cell. Returns `false` if the column does not exist.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.position(name) {
            Some(i) if i < self.values.len() => {
                self.values[i] = value.into();
                true
            }
            _ => false,
        }
    }
}

/// Parse only the header record of `path` into an all-`Utf8` schema.
pub fn read_header(path: &Path) -> Result<SchemaRef> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (inferred, _) = Format::default()
        .with_header(true)
        .infer_schema(file, Some(0))
        .with_context(|| format!("reading header of {}", path.display()))?;

    if inferred.fields().is_empty() {
        bail!("{}: no header row", path.display());
    }

    // Inference on zero records says nothing useful about types; every cell is text.
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    debug!(columns = fields.len(), "read header of {}", path.display());
    Ok(Arc::new(Schema::new(fields)))
}

/// One decoded data record.
#[derive(Debug)]
pub enum Record {
    Row(Row),
    /// The record could not be turned into a row (too many fields, invalid UTF-8).
    Malformed { line: u64, reason: String },
}

/// Record-at-a-time reader over the data records of a CSV file.
///
/// A malformed record only affects itself: it comes back as `Record::Malformed`
/// and reading carries on with the next one. Short records are padded with `""`.
pub struct RowReader {
    columns: Arc<[String]>,
    records: csv::StringRecordsIntoIter<File>,
}

impl Iterator for RowReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) if e.is_io_error() => {
                return Some(Err(anyhow::Error::new(e).context("reading CSV record")))
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                return Some(Ok(Record::Malformed {
                    line,
                    reason: e.to_string(),
                }));
            }
        };

        let width = self.columns.len();
        if record.len() > width {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            return Some(Ok(Record::Malformed {
                line,
                reason: format!("{} fields, header has {}", record.len(), width),
            }));
        }

        let mut values: Vec<String> = record.iter().map(str::to_string).collect();
        values.resize(width, String::new());
        Some(Ok(Record::Row(Row::new(Arc::clone(&self.columns), values))))
    }
}

/// Open `path` for record-by-record reading against the header in `schema`.
pub fn open_rows(path: &Path, schema: &SchemaRef) -> Result<RowReader> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quote(b'"')
        .delimiter(b',')
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let columns: Arc<[String]> = schema.fields().iter().map(|f| f.name().clone()).collect();
    Ok(RowReader {
        columns,
        records: reader.into_records(),
    })
}

/// Pack rows back into a batch. Empty strings become nulls, which the writer renders as empty cells.
pub fn rows_to_batch(schema: &SchemaRef, rows: &[Row]) -> Result<RecordBatch> {
    let width = schema.fields().len();
    if let Some(bad) = rows.iter().find(|r| r.values.len() != width) {
        bail!(
            "row has {} values, schema has {} columns",
            bad.values.len(),
            width
        );
    }

    let cols: Vec<ArrayRef> = (0..width)
        .map(|i| {
            let arr: StringArray = rows
                .iter()
                .map(|r| Some(r.values[i].as_str()).filter(|v| !v.is_empty()))
                .collect();
            Arc::new(arr) as ArrayRef
        })
        .collect();

    RecordBatch::try_new(Arc::clone(schema), cols).context("assembling output batch")
}

/// Create `path` (and its parent directory) and write the header line straight away,
/// so the file carries the header even if no rows follow.
pub fn create_writer(path: &Path, schema: &SchemaRef) -> Result<CsvWriter> {
    create_parent_dir(path)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .build(BufWriter::new(file));
    writer
        .write(&RecordBatch::new_empty(Arc::clone(schema)))
        .with_context(|| format!("writing header to {}", path.display()))?;
    Ok(writer)
}

pub fn finish_writer(writer: CsvWriter) -> Result<()> {
    let mut out = writer.into_inner();
    out.flush().context("flushing CSV output")
}

pub fn create_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn csv_file(content: &str) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(content.as_bytes())?;
        Ok(tmp)
    }

    #[test]
    fn header_becomes_text_schema() -> Result<()> {
        let tmp = csv_file("id,name,is_public\n1,Red,TRUE\n")?;
        let schema = read_header(tmp.path())?;
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "name", "is_public"]);
        assert!(schema
            .fields()
            .iter()
            .all(|f| f.data_type() == &DataType::Utf8));
        Ok(())
    }

    #[test]
    fn empty_file_has_no_header() -> Result<()> {
        let tmp = csv_file("")?;
        let err = read_header(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("no header row"), "{err}");
        Ok(())
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let err = read_header(&dir.path().join("nope.csv")).unwrap_err();
        assert!(err.to_string().contains("opening"), "{err}");
    }

    fn read_all(path: &Path) -> Result<Vec<Record>> {
        let schema = read_header(path)?;
        open_rows(path, &schema)?.collect()
    }

    fn expect_row(record: &Record) -> &Row {
        match record {
            Record::Row(row) => row,
            Record::Malformed { line, reason } => panic!("line {line} malformed: {reason}"),
        }
    }

    #[test]
    fn reads_quoted_and_short_records() -> Result<()> {
        let tmp = csv_file("id,name,prompt\n1,\"Red, shiny\",\"say \"\"hi\"\"\"\n2,Blue\n")?;
        let records = read_all(tmp.path())?;

        assert_eq!(records.len(), 2);
        let (first, second) = (expect_row(&records[0]), expect_row(&records[1]));
        assert_eq!(first.get("name"), Some("Red, shiny"));
        assert_eq!(first.get("prompt"), Some("say \"hi\""));
        assert_eq!(second.get("name"), Some("Blue"));
        assert_eq!(second.get("prompt"), Some(""));
        assert_eq!(second.non_empty("prompt"), None);
        assert_eq!(second.get("missing"), None);
        Ok(())
    }

    #[test]
    fn overwide_record_is_isolated() -> Result<()> {
        let tmp = csv_file("id,name\n1,Red\n2,Blue,EXTRA\n3,Green\n")?;
        let records = read_all(tmp.path())?;

        assert_eq!(records.len(), 3);
        assert_eq!(expect_row(&records[0]).get("name"), Some("Red"));
        match &records[1] {
            Record::Malformed { line, reason } => {
                assert_eq!(*line, 3);
                assert!(reason.contains("3 fields"), "{reason}");
            }
            Record::Row(row) => panic!("expected malformed, got {row:?}"),
        }
        assert_eq!(expect_row(&records[2]).get("name"), Some("Green"));
        Ok(())
    }

    #[test]
    fn invalid_utf8_record_is_isolated() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"id,name\n1,Red\n2,\xff\xfe\n3,Green\n")?;
        let records = read_all(tmp.path())?;

        assert_eq!(records.len(), 3);
        assert!(matches!(records[1], Record::Malformed { .. }));
        assert_eq!(expect_row(&records[2]).get("id"), Some("3"));
        Ok(())
    }

    #[test]
    fn writer_emits_header_without_rows() -> Result<()> {
        let src = csv_file("id,name\n")?;
        let schema = read_header(src.path())?;
        let dir = tempdir()?;
        let out = dir.path().join("nested").join("out.csv");

        let writer = create_writer(&out, &schema)?;
        finish_writer(writer)?;

        assert_eq!(fs::read_to_string(&out)?, "id,name\n");
        Ok(())
    }

    #[test]
    fn rows_round_trip_through_writer() -> Result<()> {
        let src = csv_file("id,name\n")?;
        let schema = read_header(src.path())?;
        let dir = tempdir()?;
        let out = dir.path().join("out.csv");

        let rows = vec![
            Row::from_pairs(&[("id", "1"), ("name", "Red, \"shiny\"")]),
            Row::from_pairs(&[("id", "2"), ("name", "")]),
        ];
        let mut writer = create_writer(&out, &schema)?;
        writer.write(&rows_to_batch(&schema, &rows)?)?;
        finish_writer(writer)?;

        assert_eq!(
            fs::read_to_string(&out)?,
            "id,name\n1,\"Red, \"\"shiny\"\"\"\n2,\n"
        );
        Ok(())
    }

    #[test]
    fn set_only_touches_known_columns() {
        let mut row = Row::from_pairs(&[("id", "1"), ("user_id", "u-9")]);
        assert!(row.set("user_id", ""));
        assert!(!row.set("owner", "x"));
        assert_eq!(row.values(), &["1".to_string(), String::new()]);
    }

    #[test]
    fn batch_rejects_ragged_rows() -> Result<()> {
        let src = csv_file("id,name\n")?;
        let schema = read_header(src.path())?;
        let rows = vec![Row::from_pairs(&[("id", "1")])];
        assert!(rows_to_batch(&schema, &rows).is_err());
        Ok(())
    }
}
