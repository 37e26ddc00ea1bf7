//! 🚰 Sources: bytes in, rows out.
//!
//! 🎬 *[a multipart upload arrives. it is named `US_ID/sentencing_case_record.json.gz`]*
//! *[we peel it like an onion: directory, `.gz`, `.json`, and finally, a stem]*
//!
//! An [`UploadedFile`] is a name plus bytes, nothing more. [`detect`] works out the
//! format and whether it's gzipped; [`RowReader`] turns the (decompressed) bytes into
//! a lazy stream of [`ParsedRow`]s in file order. A row that won't tokenize is an
//! `Err` in the stream, not the end of the stream. Collect, don't abort.
//!
//! 🧠 Knowledge graph:
//! - `.csv` → [`csv::CsvRows`], header row required, strict column counts
//! - `.json` / `.jsonl` / `.ndjson` → [`ndjson::NdjsonRows`], one object per line
//! - the orchestrator decides what "too many parse errors" means; we just count honestly

use std::borrow::Cow;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::common::RawRecord;
use crate::errors::{ImportError, ParseError};

pub(crate) mod csv;
pub(crate) mod ndjson;

/// 📄 One row out of a source: parsed, or the reason it couldn't be.
pub type ParsedRow = std::result::Result<RawRecord, ParseError>;

/// 📦 An uploaded file: name and raw bytes. The name drives entity and format detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }

    /// 📂 Read a file off disk. The file name (no directories) becomes the upload name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read(path).await.with_context(|| {
            format!(
                "💀 Tried to read '{}' for import. The filesystem declined. \
                Check the path exists and that we're allowed to read it.",
                path.display()
            )
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(file_name, contents))
    }

    /// 🫁 The bytes to parse: decompressed when the name said `.gz`, borrowed otherwise.
    pub fn decoded_contents(&self, detected: &DetectedFile) -> Result<Cow<'_, [u8]>, ImportError> {
        if !detected.gzipped {
            return Ok(Cow::Borrowed(&self.contents));
        }
        let mut decoder = flate2::read::GzDecoder::new(self.contents.as_slice());
        let mut inflated = Vec::with_capacity(self.contents.len() * 4);
        decoder
            .read_to_end(&mut inflated)
            .map_err(|e| ImportError::Unreadable {
                file_name: self.file_name.clone(),
                message: format!("gzip decompression failed: {e}"),
            })?;
        Ok(Cow::Owned(inflated))
    }
}

/// 🧾 The wire formats we read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Csv,
    Ndjson,
}

/// 🔍 What a file name told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFile {
    /// lowercase name with directory and extensions stripped (`sentencing_case_record`)
    pub stem: String,
    pub format: RecordFormat,
    pub gzipped: bool,
}

/// 🔍 Work out stem, format and compression from a file name.
pub fn detect(file_name: &str) -> Result<DetectedFile, ImportError> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim()
        .to_ascii_lowercase();

    let (base, gzipped) = match base.strip_suffix(".gz") {
        Some(inner) => (inner.to_string(), true),
        None => (base, false),
    };

    let unsupported = || ImportError::UnsupportedFormat {
        file_name: file_name.to_string(),
    };
    let (stem, extension) = base.rsplit_once('.').ok_or_else(unsupported)?;
    let format = match extension {
        "csv" => RecordFormat::Csv,
        "json" | "jsonl" | "ndjson" => RecordFormat::Ndjson,
        _ => return Err(unsupported()),
    };

    Ok(DetectedFile {
        stem: stem.to_string(),
        format,
        gzipped,
    })
}

/// 🎭 A row stream over one file's bytes. Enum dispatch, one variant per format.
#[derive(Debug)]
pub enum RowReader<'a> {
    Csv(csv::CsvRows<'a>),
    Ndjson(ndjson::NdjsonRows<'a>),
}

impl<'a> RowReader<'a> {
    pub fn open(format: RecordFormat, bytes: &'a [u8]) -> Self {
        match format {
            RecordFormat::Csv => RowReader::Csv(csv::CsvRows::new(bytes)),
            RecordFormat::Ndjson => RowReader::Ndjson(ndjson::NdjsonRows::new(bytes)),
        }
    }
}

impl Iterator for RowReader<'_> {
    type Item = ParsedRow;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RowReader::Csv(rows) => rows.next(),
            RowReader::Ndjson(rows) => rows.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn the_one_where_the_onion_gets_peeled() {
        let detected = detect("US_ID/Sentencing_Case_Record.json.gz").expect("💀 should detect");
        assert_eq!(detected.stem, "sentencing_case_record");
        assert_eq!(detected.format, RecordFormat::Ndjson);
        assert!(detected.gzipped);

        let detected = detect("clients.csv").expect("💀 should detect");
        assert_eq!(detected.stem, "clients");
        assert_eq!(detected.format, RecordFormat::Csv);
        assert!(!detected.gzipped);
    }

    #[test]
    fn the_one_where_a_spreadsheet_is_not_a_feed() {
        assert_eq!(
            detect("clients.xlsx"),
            Err(ImportError::UnsupportedFormat {
                file_name: "clients.xlsx".into()
            })
        );
        assert!(detect("README").is_err());
    }

    #[test]
    fn the_one_where_gzip_is_inflated_before_parsing() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(b"{\"external_id\":\"s-1\"}\n")
            .expect("💀 gzip write");
        let file = UploadedFile::new("staff.jsonl.gz", encoder.finish().expect("💀 gzip finish"));
        let detected = detect(&file.file_name).expect("💀 should detect");
        let bytes = file.decoded_contents(&detected).expect("💀 should inflate");
        let rows: Vec<ParsedRow> = RowReader::open(detected.format, &bytes).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_ok());
    }

    #[test]
    fn the_one_where_fake_gzip_is_unreadable_not_a_panic() {
        let file = UploadedFile::new("staff.csv.gz", b"definitely not gzip".to_vec());
        let detected = detect(&file.file_name).expect("💀 should detect");
        assert!(matches!(
            file.decoded_contents(&detected),
            Err(ImportError::Unreadable { .. })
        ));
    }

    #[tokio::test]
    async fn the_one_where_a_file_on_disk_keeps_only_its_name() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let path = dir.path().join("clients.csv");
        std::fs::write(&path, "external_id\nc-1\n").expect("💀 write");
        let file = UploadedFile::from_path(&path).await.expect("💀 read");
        assert_eq!(file.file_name, "clients.csv");
        assert_eq!(file.contents, b"external_id\nc-1\n");

        let missing = UploadedFile::from_path(dir.path().join("nope.csv")).await;
        assert!(missing.is_err());
    }
}
