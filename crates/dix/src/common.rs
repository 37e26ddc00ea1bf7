//! 📦 Common data structures: the building blocks of dix.
//!
//! 🎬 COLD OPEN: INT. STATE DATA FEED, 4:02 AM
//!
//! A CSV lands in the bucket. Nobody knows who exported it. Column three is called
//! `external_id` today; last week it was `externalId`. One row has a birth date of
//! "2/30". The import has to survive all of it, and the structs in this file are
//! the luggage every row gets packed into on the way through.
//!
//! - [`RawRecord`]: what the file said, untyped, with its row number for the blame report.
//! - [`FieldValue`] / [`Fields`]: what the schema decided the row actually means.
//! - [`ValidatedRecord`]: a row that passed, with its key and checksum attached.
//! - [`RecordKey`] / [`Checksum`]: identity and fingerprint, the two things the planner diffs on.
//! - [`StateCode`]: the partition. One state's import never touches another's rows.
//!
//! 🦆

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::schema::EntityKind;

// ============================================================
// 🗺️ StateCode: the partition key
// ============================================================

/// 🗺️ A supported state code. Every import batch is scoped to exactly one of these.
///
/// `US_IX` is the feeds' internal alias for Idaho and is folded into `US_ID` on parse,
/// same as the upstream data platform does. `US_XX` and `US_YY` are the demo/test states.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateCode {
    US_AR,
    US_AZ,
    US_CA,
    US_CO,
    US_ID,
    US_ME,
    US_MI,
    US_MO,
    US_ND,
    US_NE,
    US_OR,
    US_PA,
    US_TN,
    US_TX,
    US_UT,
    US_XX,
    US_YY,
}

impl StateCode {
    pub const ALL: [StateCode; 17] = [
        StateCode::US_AR,
        StateCode::US_AZ,
        StateCode::US_CA,
        StateCode::US_CO,
        StateCode::US_ID,
        StateCode::US_ME,
        StateCode::US_MI,
        StateCode::US_MO,
        StateCode::US_ND,
        StateCode::US_NE,
        StateCode::US_OR,
        StateCode::US_PA,
        StateCode::US_TN,
        StateCode::US_TX,
        StateCode::US_UT,
        StateCode::US_XX,
        StateCode::US_YY,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateCode::US_AR => "US_AR",
            StateCode::US_AZ => "US_AZ",
            StateCode::US_CA => "US_CA",
            StateCode::US_CO => "US_CO",
            StateCode::US_ID => "US_ID",
            StateCode::US_ME => "US_ME",
            StateCode::US_MI => "US_MI",
            StateCode::US_MO => "US_MO",
            StateCode::US_ND => "US_ND",
            StateCode::US_NE => "US_NE",
            StateCode::US_OR => "US_OR",
            StateCode::US_PA => "US_PA",
            StateCode::US_TN => "US_TN",
            StateCode::US_TX => "US_TX",
            StateCode::US_UT => "US_UT",
            StateCode::US_XX => "US_XX",
            StateCode::US_YY => "US_YY",
        }
    }
}

impl FromStr for StateCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        // -- 🥔 Idaho goes by two names in the feeds. We only answer to one.
        if wanted == "US_IX" {
            return Ok(StateCode::US_ID);
        }
        StateCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == wanted)
            .ok_or_else(|| format!("'{}' is not a supported state code", s.trim()))
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StateCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================
// 📄 RawRecord: one row, exactly as the file said it
// ============================================================

/// 📄 One parsed row, untyped. Columns map to JSON values (CSV cells are always strings).
///
/// `row_number` is the 1-based data row (header excluded), which is what people see in
/// their spreadsheet and what the report quotes back at them. `line` is the physical line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub row_number: usize,
    pub line: usize,
    pub columns: Map<String, Value>,
}

impl RawRecord {
    pub fn new(row_number: usize, line: usize, columns: Map<String, Value>) -> Self {
        Self {
            row_number,
            line,
            columns,
        }
    }

    /// 🔍 Look up a column by any of the given names, first hit wins.
    pub fn get_any(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| self.columns.get(*name))
    }
}

// ============================================================
// 🧬 FieldValue / Fields: typed values after validation
// ============================================================

/// 🧬 A validated, strongly typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    TextList(Vec<String>),
    /// 🧾 structured JSON kept whole, already normalized by validation
    Json(Value),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::DateTime(t) => Some(t.date_naive()),
            _ => None,
        }
    }

    /// 📤 The JSON shape this value is persisted as.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(t) => {
                Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::TextList(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            FieldValue::Json(value) => value.clone(),
        }
    }

    /// 🔐 Canonical encoding for checksums. Versioned by [`CHECKSUM_FORMAT`]; changing
    /// anything in here means bumping the version, or every record in every state
    /// turns into an "update" on the next run.
    fn encode_canonical(&self, out: &mut String) {
        match self {
            FieldValue::Null => out.push('~'),
            FieldValue::Text(s) => {
                out.push_str("s:");
                out.push_str(&json_quote(s));
            }
            FieldValue::Integer(i) => {
                out.push_str("i:");
                out.push_str(&i.to_string());
            }
            FieldValue::Float(f) => {
                // -- -0.0 and 0.0 are the same number to everyone except IEEE 754
                let normalized = if *f == 0.0 { 0.0 } else { *f };
                out.push_str("f:");
                out.push_str(&format!("{normalized:?}"));
            }
            FieldValue::Boolean(b) => {
                out.push_str(if *b { "b:1" } else { "b:0" });
            }
            FieldValue::Date(d) => {
                out.push_str("d:");
                out.push_str(&d.format("%Y-%m-%d").to_string());
            }
            FieldValue::DateTime(t) => {
                out.push_str("t:");
                out.push_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true));
            }
            FieldValue::TextList(items) => {
                out.push_str("l:");
                out.push_str(&items.len().to_string());
                for item in items {
                    out.push(':');
                    out.push_str(&json_quote(item));
                }
            }
            // -- serde_json objects are key-sorted, so the compact rendering is canonical
            FieldValue::Json(value) => {
                out.push_str("j:");
                out.push_str(&value.to_string());
            }
        }
    }
}

fn json_quote(s: &str) -> String {
    // -- serde_json escaping a &str cannot fail. the fallback exists to keep the type honest.
    serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
}

/// 📋 Typed fields of a record, in schema declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fields(Vec<(&'static str, FieldValue)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: &'static str, value: FieldValue) {
        self.0.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 📤 The persisted payload: a JSON object of field name → value.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (name, value) in &self.0 {
            object.insert((*name).to_string(), value.to_json());
        }
        Value::Object(object)
    }
}

// ============================================================
// 🔑 RecordKey / 🔐 Checksum
// ============================================================

// -- ASCII unit separator. nobody types this into a CSV. nobody.
const KEY_SEPARATOR: char = '\u{1f}';

/// 🔑 A record's natural key. Composite keys are joined with the unit separator;
/// displayed with `/` because humans read reports too.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                joined.push(KEY_SEPARATOR);
            }
            joined.push_str(part.as_ref());
        }
        Self(joined)
    }

    /// 💾 The storage form (separator intact). Round-trips through [`RecordKey::from_stored`].
    pub fn as_stored(&self) -> &str {
        &self.0
    }

    pub fn from_stored(stored: impl Into<String>) -> Self {
        Self(stored.into())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace(KEY_SEPARATOR, "/"))
    }
}

impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 🏷️ Version tag mixed into every checksum. Bump it and every record looks changed once.
pub const CHECKSUM_FORMAT: &str = "dix-record-v1";

/// 🔐 Lowercase hex SHA-256 over the canonical encoding of a record's fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Checksum(String);

impl Checksum {
    pub fn compute(entity: EntityKind, fields: &Fields) -> Self {
        use sha2::{Digest, Sha256};

        let mut canonical = String::with_capacity(64 * fields.len().max(1));
        canonical.push_str(CHECKSUM_FORMAT);
        canonical.push('\n');
        canonical.push_str("entity=");
        canonical.push_str(entity.name());
        canonical.push('\n');
        for (name, value) in fields.iter() {
            canonical.push_str(name);
            canonical.push('=');
            value.encode_canonical(&mut canonical);
            canonical.push('\n');
        }

        let digest = Sha256::digest(canonical.as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_stored(stored: impl Into<String>) -> Self {
        Self(stored.into())
    }
}

// ============================================================
// ✅ ValidatedRecord
// ============================================================

/// ✅ A row that survived validation. Knows its entity, key, partition and fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub entity: EntityKind,
    pub row_number: usize,
    pub key: RecordKey,
    /// 🗺️ `None` for entities whose rows carry no state column; the batch partition applies.
    pub partition: Option<StateCode>,
    pub fields: Fields,
    pub checksum: Checksum,
}
