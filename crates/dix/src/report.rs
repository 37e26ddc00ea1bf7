//! 📊 The Import Report: what happened, per entity and per row, in words a state analyst
//! can act on and a JSON shape a handler can return as-is.
//!
//! 🎬 *[the import is over. the analyst asks one question: "did it work?"]*
//! *[the report answers with a status, forty numbers, and a list of rows to fix.]*
//!
//! 🧠 Knowledge graph:
//! - [`EntityReport`] is filled in by the orchestrator as an entity moves through its stages
//! - [`ImportReport::overall_status`] is derived, never set by hand
//! - [`ImportReport::http_status`] is what the HTTP layer answers with
//! - [`ImportReport::render_table`] is what the CLI prints
//!
//! Never persisted. Serialized camelCase.

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;

use crate::common::StateCode;
use crate::errors::{ImportError, ParseError, ValidationError};
use crate::schema::EntityKind;

/// 🏷️ Field name used for errors that belong to the whole row, not one field.
pub const ROW_FIELD: &str = "<row>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityStatus {
    Succeeded,
    /// persisted, but some rows were rejected
    CompletedWithErrors,
    Failed,
    /// never started: the run deadline passed first
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverallStatus {
    Succeeded,
    PartiallySucceeded,
    Failed,
}

/// 🧾 One row-level problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub field: String,
    pub message: String,
    pub row_number: usize,
}

impl RowError {
    pub fn from_parse(error: &ParseError) -> Self {
        Self {
            field: ROW_FIELD.to_string(),
            message: format!("line {}: {}", error.line, error.message),
            row_number: error.row_number,
        }
    }

    /// 🧾 A validation error lists several fields; each becomes its own row error.
    pub fn from_validation(error: &ValidationError) -> Vec<Self> {
        error
            .errors
            .iter()
            .map(|field_error| Self {
                field: field_error.field.clone(),
                message: field_error.message.clone(),
                row_number: error.row_number,
            })
            .collect()
    }
}

/// 💀 Why an entity (or a file) didn't make it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub code: &'static str,
    pub message: String,
    /// 🎯 fix-your-file (true) or call-someone (false)
    pub caller_error: bool,
}

impl From<&ImportError> for FailureReport {
    fn from(error: &ImportError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            caller_error: error.is_caller_error(),
        }
    }
}

/// 📋 Everything that happened to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReport {
    pub name: EntityKind,
    pub status: EntityStatus,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub retained: usize,
    pub rows_read: usize,
    /// 🧾 row errors in row order: every validation error, the first few parse errors
    pub errors: Vec<RowError>,
    /// 🔢 every row error, reported or not
    pub error_count: usize,
    pub failure: Option<FailureReport>,
    pub warnings: Vec<String>,
}

impl EntityReport {
    pub fn new(name: EntityKind) -> Self {
        Self {
            name,
            status: EntityStatus::Succeeded,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            retained: 0,
            rows_read: 0,
            errors: Vec::new(),
            error_count: 0,
            failure: None,
            warnings: Vec::new(),
        }
    }

    /// 🧾 Count and list a row error.
    pub fn push_row_error(&mut self, error: RowError) {
        self.error_count += 1;
        self.errors.push(error);
    }

    /// 🧾 Every validation error is listed. Parse errors past `parse_limit` are only counted.
    pub fn record_row_errors(
        &mut self,
        parse: Vec<RowError>,
        validation: Vec<RowError>,
        parse_limit: usize,
    ) {
        self.error_count += parse.len() + validation.len();
        let mut listed: Vec<RowError> = parse.into_iter().take(parse_limit).chain(validation).collect();
        listed.sort_by_key(|e| e.row_number);
        self.errors.extend(listed);
    }

    /// 💀 Mark the entity failed (or timed out) with nothing persisted.
    pub fn fail(&mut self, error: &ImportError) {
        self.status = match error {
            ImportError::TimedOut => EntityStatus::TimedOut,
            _ => EntityStatus::Failed,
        };
        self.inserted = 0;
        self.updated = 0;
        self.deleted = 0;
        self.failure = Some(FailureReport::from(error));
    }

    /// ✅ Mark the entity persisted; row errors make it a partial success.
    pub fn complete(&mut self) {
        self.status = if self.error_count == 0 {
            EntityStatus::Succeeded
        } else {
            EntityStatus::CompletedWithErrors
        };
    }

    pub fn persisted(&self) -> bool {
        matches!(
            self.status,
            EntityStatus::Succeeded | EntityStatus::CompletedWithErrors
        )
    }
}

/// 🚫 A file that was never imported, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: String,
    pub code: &'static str,
}

impl SkippedFile {
    pub fn new(file_name: impl Into<String>, error: &ImportError) -> Self {
        Self {
            file_name: file_name.into(),
            reason: error.to_string(),
            code: error.code(),
        }
    }
}

/// 📊 The whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub partition: StateCode,
    pub overall_status: OverallStatus,
    pub entities: Vec<EntityReport>,
    pub skipped_files: Vec<SkippedFile>,
}

impl ImportReport {
    /// 🧮 Assemble the report; the overall status is derived from the entities.
    pub fn new(
        partition: StateCode,
        entities: Vec<EntityReport>,
        skipped_files: Vec<SkippedFile>,
    ) -> Self {
        let overall_status = overall_status_of(&entities);
        Self {
            partition,
            overall_status,
            entities,
            skipped_files,
        }
    }

    pub fn entity(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.name == kind)
    }

    /// 🌐 The HTTP status for this report.
    ///
    /// `Failed` splits three ways: 409 when the partition was busy, 500 when anything
    /// failed for system reasons, 422 when every failure was the caller's input.
    pub fn http_status(&self) -> u16 {
        match self.overall_status {
            OverallStatus::Succeeded => 200,
            OverallStatus::PartiallySucceeded => 207,
            OverallStatus::Failed => {
                let failures = || self.entities.iter().filter_map(|e| e.failure.as_ref());
                if failures().any(|f| f.code == "PartitionBusy") {
                    409
                } else if failures().any(|f| !f.caller_error) {
                    500
                } else {
                    422
                }
            }
        }
    }

    /// 🍽️ The report as a terminal table, skipped files and first errors underneath.
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            "entity", "status", "rows", "inserted", "updated", "unchanged", "deleted", "retained",
            "errors",
        ]);
        for entity in &self.entities {
            let numbers = [
                entity.rows_read,
                entity.inserted,
                entity.updated,
                entity.unchanged,
                entity.deleted,
                entity.retained,
                entity.error_count,
            ];
            let mut row = vec![
                Cell::new(entity.name.name()),
                Cell::new(format!("{:?}", entity.status)),
            ];
            row.extend(
                numbers
                    .iter()
                    .map(|n| Cell::new(n).set_alignment(CellAlignment::Right)),
            );
            table.add_row(row);
        }

        let mut out = format!(
            "📊 import for {}: {:?}\n{table}\n",
            self.partition, self.overall_status
        );
        for entity in &self.entities {
            if let Some(failure) = &entity.failure {
                out.push_str(&format!("💀 {}: [{}] {}\n", entity.name, failure.code, failure.message));
            }
            for warning in &entity.warnings {
                out.push_str(&format!("⚠️  {}: {warning}\n", entity.name));
            }
            for error in &entity.errors {
                out.push_str(&format!(
                    "🧾 {} row {}: {}: {}\n",
                    entity.name, error.row_number, error.field, error.message
                ));
            }
            if entity.error_count > entity.errors.len() {
                out.push_str(&format!(
                    "🧾 {}: ...and {} more row errors\n",
                    entity.name,
                    entity.error_count - entity.errors.len()
                ));
            }
        }
        for skipped in &self.skipped_files {
            out.push_str(&format!("🚫 skipped {}: {}\n", skipped.file_name, skipped.reason));
        }
        out
    }
}

/// 🧮 Succeeded iff at least one entity ran and all succeeded; Failed iff nothing was
/// persisted; PartiallySucceeded otherwise.
pub fn overall_status_of(entities: &[EntityReport]) -> OverallStatus {
    if entities.is_empty() || !entities.iter().any(EntityReport::persisted) {
        OverallStatus::Failed
    } else if entities.iter().all(|e| e.status == EntityStatus::Succeeded) {
        OverallStatus::Succeeded
    } else {
        OverallStatus::PartiallySucceeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FieldError, TransactionError};

    fn entity(kind: EntityKind, status: EntityStatus) -> EntityReport {
        let mut report = EntityReport::new(kind);
        report.status = status;
        report
    }

    #[test]
    fn the_one_where_the_overall_status_does_the_math() {
        use EntityStatus::*;
        assert_eq!(overall_status_of(&[]), OverallStatus::Failed);
        assert_eq!(
            overall_status_of(&[entity(EntityKind::Staff, Succeeded)]),
            OverallStatus::Succeeded
        );
        assert_eq!(
            overall_status_of(&[
                entity(EntityKind::Staff, Succeeded),
                entity(EntityKind::Client, CompletedWithErrors)
            ]),
            OverallStatus::PartiallySucceeded
        );
        assert_eq!(
            overall_status_of(&[
                entity(EntityKind::Staff, Succeeded),
                entity(EntityKind::Case, TimedOut)
            ]),
            OverallStatus::PartiallySucceeded
        );
        assert_eq!(
            overall_status_of(&[
                entity(EntityKind::Staff, Failed),
                entity(EntityKind::Case, TimedOut)
            ]),
            OverallStatus::Failed
        );
    }

    #[test]
    fn the_one_where_only_parse_errors_are_cut_short() {
        let parse = (1..=4)
            .map(|row| RowError {
                field: ROW_FIELD.into(),
                message: format!("line {}: wrong number of fields", row + 1),
                row_number: row * 2,
            })
            .collect();
        let validation = (1..=150)
            .map(|row| RowError {
                field: "birthDate".into(),
                message: "expected a date (YYYY-MM-DD)".into(),
                row_number: row + 10,
            })
            .collect();

        let mut report = EntityReport::new(EntityKind::Client);
        report.record_row_errors(parse, validation, 2);
        report.complete();

        assert_eq!(report.error_count, 154);
        assert_eq!(report.errors.len(), 152);
        assert_eq!(report.errors.iter().filter(|e| e.field == ROW_FIELD).count(), 2);
        assert_eq!(report.errors.iter().filter(|e| e.field == "birthDate").count(), 150);
        assert!(report.errors.windows(2).all(|w| w[0].row_number <= w[1].row_number));
        assert_eq!(report.status, EntityStatus::CompletedWithErrors);
    }

    #[test]
    fn the_one_where_the_json_speaks_camel_case() {
        let mut clients = EntityReport::new(EntityKind::Client);
        clients.rows_read = 3;
        clients.inserted = 2;
        let rejected = ValidationError {
            row_number: 3,
            key: None,
            errors: vec![FieldError::new("externalId", "required field is missing")],
        };
        for error in RowError::from_validation(&rejected) {
            clients.push_row_error(error);
        }
        clients.complete();
        let report = ImportReport::new(StateCode::US_ID, vec![clients], Vec::new());

        let json = serde_json::to_value(&report).expect("💀 report should serialize");
        assert_eq!(json["partition"], "US_ID");
        assert_eq!(json["overallStatus"], "PartiallySucceeded");
        assert_eq!(json["entities"][0]["name"], "clients");
        assert_eq!(json["entities"][0]["status"], "CompletedWithErrors");
        assert_eq!(json["entities"][0]["rowsRead"], 3);
        assert_eq!(json["entities"][0]["errors"][0]["field"], "externalId");
        assert_eq!(json["entities"][0]["errors"][0]["rowNumber"], 3);
        assert_eq!(json["skippedFiles"], serde_json::json!([]));
        assert_eq!(report.http_status(), 207);
    }

    #[test]
    fn the_one_where_blame_picks_the_status_code() {
        let mut empty = EntityReport::new(EntityKind::Client);
        empty.fail(&ImportError::SuspiciousEmptyBatch {
            entity: EntityKind::Client,
            partition: StateCode::US_ID,
            existing: 50,
        });
        let caller = ImportReport::new(StateCode::US_ID, vec![empty.clone()], Vec::new());
        assert_eq!(caller.overall_status, OverallStatus::Failed);
        assert_eq!(caller.http_status(), 422);

        let mut rollback = EntityReport::new(EntityKind::Case);
        rollback.fail(&ImportError::from(TransactionError {
            entity: EntityKind::Case,
            partition: StateCode::US_ID,
            message: "disk full".into(),
        }));
        let system = ImportReport::new(StateCode::US_ID, vec![empty, rollback], Vec::new());
        assert_eq!(system.http_status(), 500);

        let mut busy = EntityReport::new(EntityKind::Staff);
        busy.fail(&ImportError::PartitionBusy {
            partition: StateCode::US_ID,
        });
        let busy = ImportReport::new(StateCode::US_ID, vec![busy], Vec::new());
        assert_eq!(busy.http_status(), 409);
    }

    #[test]
    fn the_one_where_the_table_mentions_everything_that_went_wrong() {
        let mut offenses = EntityReport::new(EntityKind::Offense);
        offenses.rows_read = 1;
        offenses.warnings.push("2 persisted records missing from the upload were kept".into());
        offenses.complete();
        let report = ImportReport::new(
            StateCode::US_ID,
            vec![offenses],
            vec![SkippedFile::new(
                "payroll.csv",
                &ImportError::UnknownEntity {
                    file_name: "payroll.csv".into(),
                },
            )],
        );
        let rendered = report.render_table();
        assert!(rendered.contains("offenses"));
        assert!(rendered.contains("persisted records missing"));
        assert!(rendered.contains("payroll.csv"));
    }
}
