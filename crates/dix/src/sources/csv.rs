//! 🧾 CSV rows. Header first, then data, and every data row must have exactly as many
//! cells as the header. A row that doesn't is a [`ParseError`]; the next row still gets read.

use ::csv::{Reader, ReaderBuilder, StringRecord};
use serde_json::{Map, Value};

use crate::common::RawRecord;
use crate::errors::ParseError;
use crate::sources::ParsedRow;

pub struct CsvRows<'a> {
    reader: Reader<&'a [u8]>,
    headers: Result<Vec<String>, String>,
    record: StringRecord,
    row_number: usize,
    done: bool,
}

impl std::fmt::Debug for CsvRows<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvRows")
            .field("headers", &self.headers)
            .field("row_number", &self.row_number)
            .finish()
    }
}

impl<'a> CsvRows<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(bytes);
        let headers = reader
            .headers()
            .map(|h| h.iter().map(|name| name.trim().to_string()).collect())
            .map_err(|e| e.to_string());
        Self {
            reader,
            headers,
            record: StringRecord::new(),
            row_number: 0,
            done: false,
        }
    }
}

impl Iterator for CsvRows<'_> {
    type Item = ParsedRow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let headers = match &self.headers {
            Ok(headers) => headers,
            Err(message) => {
                // -- no header, no columns, no rows. one error and we're out.
                self.done = true;
                return Some(Err(ParseError {
                    row_number: 0,
                    line: 1,
                    message: format!("unreadable header row: {message}"),
                }));
            }
        };

        match self.reader.read_record(&mut self.record) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                self.row_number += 1;
                let line = self
                    .record
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(self.row_number + 1);
                let mut columns = Map::with_capacity(headers.len());
                for (name, cell) in headers.iter().zip(self.record.iter()) {
                    columns.insert(name.clone(), Value::String(cell.to_string()));
                }
                Some(Ok(RawRecord::new(self.row_number, line, columns)))
            }
            Err(err) => {
                self.row_number += 1;
                let line = err
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(self.row_number + 1);
                let message = match err.kind() {
                    ::csv::ErrorKind::UnequalLengths { expected_len, len, .. } => {
                        format!("expected {expected_len} columns, found {len}")
                    }
                    _ => err.to_string(),
                };
                Some(Err(ParseError {
                    row_number: self.row_number,
                    line,
                    message,
                }))
            }
        }
    }
}
