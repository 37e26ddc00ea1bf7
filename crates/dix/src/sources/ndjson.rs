//! 🎬 *[NDJSON: one object per line. no brackets, no commas, no mercy for arrays.]*
//!
//! 📡 `NdjsonRows` walks the buffer with `memchr`, skips blank lines, and hands every other
//! line to `serde_json`. Anything that isn't a JSON object is a [`ParseError`] for that
//! line only. The BigQuery exports the feeds come from use `.json` for this format too.
//!
//! 🦆 (the duck has seen a `[` on line one. the duck does not want to talk about it.)

use memchr::memchr;
use serde_json::Value;

use crate::common::RawRecord;
use crate::errors::ParseError;
use crate::sources::ParsedRow;

#[derive(Debug)]
pub struct NdjsonRows<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: usize,
    row_number: usize,
}

impl<'a> NdjsonRows<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        // -- a UTF-8 BOM on line one is an editor's fingerprint, not data
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        Self {
            bytes,
            offset: 0,
            line: 0,
            row_number: 0,
        }
    }

    /// 📏 Next physical line, without its terminator. `None` at end of buffer.
    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        let bytes: &'a [u8] = self.bytes;
        let rest = &bytes[self.offset..];
        let end = memchr(b'\n', rest).unwrap_or(rest.len());
        self.offset += end + 1;
        self.line += 1;
        let line = &rest[..end];
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }
}

impl Iterator for NdjsonRows<'_> {
    type Item = ParsedRow;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.next_line()?;
            if line.trim_ascii().is_empty() {
                continue;
            }
            self.row_number += 1;
            let parsed = match serde_json::from_slice::<Value>(line) {
                Ok(Value::Object(columns)) => Ok(RawRecord::new(self.row_number, self.line, columns)),
                Ok(other) => Err(format!("expected a JSON object, found {}", kind_of(&other))),
                Err(e) => Err(format!("invalid JSON: {e}")),
            };
            return Some(parsed.map_err(|message| ParseError {
                row_number: self.row_number,
                line: self.line,
                message,
            }));
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
