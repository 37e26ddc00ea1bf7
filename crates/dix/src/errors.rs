//! 💀 Errors: the taxonomy of everything a state data feed can do to us.
//!
//! Two families live here, and the difference matters for the report:
//! - row-level ([`ParseError`], [`ValidationError`]): collected, never stop sibling rows
//! - entity/run-level ([`ImportError`]): stop one entity, or every entity not started yet
//!
//! Plumbing (config, disk, CLI) stays on `anyhow` like the rest of the crate.
//! These are `thiserror` because the report has to sort them into "your file is wrong"
//! and "our database is wrong", and a string can't tell you which one it is. 🦆

use serde::Serialize;
use thiserror::Error;

use crate::common::{RecordKey, StateCode};
use crate::schema::EntityKind;

/// 🧾 One field that failed validation, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 📄 A row that could not even be tokenized. Collected, not fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row_number} (line {line}): {message}")]
pub struct ParseError {
    pub row_number: usize,
    pub line: usize,
    pub message: String,
}

/// 🚫 A row that tokenized fine but broke the schema. Lists every failing field, not just
/// the first, so one resubmission fixes everything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row_number}: {} field(s) failed validation", errors.len())]
pub struct ValidationError {
    pub row_number: usize,
    /// 🔑 The key, when the key columns themselves were readable. Used to protect the
    /// persisted record from deletion.
    pub key: Option<RecordKey>,
    pub errors: Vec<FieldError>,
}

/// 🧨 A store transaction that rolled back. Nothing from the plan is visible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transaction for {entity} in {partition} rolled back: {message}")]
pub struct TransactionError {
    pub entity: EntityKind,
    pub partition: StateCode,
    pub message: String,
}

/// 💀 Entity- and run-level failures. Each one ends up in the report, never in a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("file '{file_name}' does not match any known entity")]
    UnknownEntity { file_name: String },

    #[error("file '{file_name}' has an unsupported format (expected .csv, .json, .jsonl or .ndjson, optionally .gz)")]
    UnsupportedFormat { file_name: String },

    #[error("file '{file_name}' is a second upload for {entity}; only the first one is imported")]
    DuplicateEntityFile { file_name: String, entity: EntityKind },

    #[error("file '{file_name}' could not be read: {message}")]
    Unreadable { file_name: String, message: String },

    #[error("{count} rows could not be parsed, more than the limit of {limit}")]
    TooManyParseErrors { count: usize, limit: usize },

    #[error("none of the {rows} rows passed validation")]
    NoValidRows { rows: usize },

    #[error(
        "refusing to import an empty batch for {entity} in {partition}: \
         it would delete all {existing} existing records"
    )]
    SuspiciousEmptyBatch {
        entity: EntityKind,
        partition: StateCode,
        existing: usize,
    },

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("the run deadline passed before this entity was started")]
    TimedOut,

    #[error("another import holds the lock for {partition}")]
    PartitionBusy { partition: StateCode },
}

impl ImportError {
    /// 🎯 Was this the caller's input (fix the file and resubmit) or the system (call someone)?
    pub fn is_caller_error(&self) -> bool {
        match self {
            ImportError::UnknownEntity { .. }
            | ImportError::UnsupportedFormat { .. }
            | ImportError::DuplicateEntityFile { .. }
            | ImportError::Unreadable { .. }
            | ImportError::TooManyParseErrors { .. }
            | ImportError::NoValidRows { .. }
            | ImportError::SuspiciousEmptyBatch { .. } => true,
            ImportError::Transaction(_)
            | ImportError::TimedOut
            | ImportError::PartitionBusy { .. } => false,
        }
    }

    /// 🏷️ Stable machine-readable code for the report.
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::UnknownEntity { .. } => "UnknownEntity",
            ImportError::UnsupportedFormat { .. } => "UnsupportedFormat",
            ImportError::DuplicateEntityFile { .. } => "DuplicateEntityFile",
            ImportError::Unreadable { .. } => "Unreadable",
            ImportError::TooManyParseErrors { .. } => "TooManyParseErrors",
            ImportError::NoValidRows { .. } => "NoValidRows",
            ImportError::SuspiciousEmptyBatch { .. } => "SuspiciousEmptyBatch",
            ImportError::Transaction(_) => "TransactionError",
            ImportError::TimedOut => "TimedOut",
            ImportError::PartitionBusy { .. } => "PartitionBusy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_blame_is_assigned_correctly() {
        let empty = ImportError::SuspiciousEmptyBatch {
            entity: EntityKind::Client,
            partition: StateCode::US_XX,
            existing: 50,
        };
        assert!(empty.is_caller_error());
        assert_eq!(empty.code(), "SuspiciousEmptyBatch");
        assert!(empty.to_string().contains("50"));

        let rollback = ImportError::from(TransactionError {
            entity: EntityKind::Case,
            partition: StateCode::US_ID,
            message: "disk said no".into(),
        });
        assert!(!rollback.is_caller_error());
        assert_eq!(rollback.code(), "TransactionError");
        assert!(!ImportError::TimedOut.is_caller_error());
    }
}
