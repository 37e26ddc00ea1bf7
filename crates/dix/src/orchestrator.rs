//! 🎬 The Import Orchestrator: one request in, one report out, no matter what.
//!
//! 🎬 COLD OPEN: INT. IMPORT HANDLER, 6:15 AM
//!
//! Three files arrive for Idaho: staff, clients, cases. The clients file has one row with a
//! blank id. The cases file references a staff member nobody has heard of. Somewhere, another
//! import for Idaho is still running. The orchestrator takes a breath, grabs the partition
//! lock, and walks every entity through the same five stages, parents first:
//!
//! ```text
//! Pending → Parsing → Validating → Planning → Persisting → Completed
//!     ╰──────────┴───────────┴──────────┴───────────┴──→ Failed
//! ```
//!
//! 🧠 Knowledge graph:
//! - row problems (parse, validation, duplicate key, wrong state) are collected, never fatal
//! - entity problems (too many parse errors, no valid rows, empty batch, rollback) fail ONE
//!   entity; the others carry on. There is no cross-entity rollback.
//! - a failed transaction is retried by re-planning against fresh persisted state, up to
//!   `runtime.transaction_retries` times
//! - once `runtime.timeout_ms` has passed, entities that haven't started are `TimedOut`
//!
//! `run_import` returns an [`ImportReport`], never an `Err`. Even a store that can't be read
//! ends up as a line in the report. 🦆

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::app_config::RuntimeConfig;
use crate::common::{RecordKey, StateCode, ValidatedRecord};
use crate::errors::{FieldError, ImportError, ParseError, TransactionError, ValidationError};
use crate::executor;
use crate::locks::PartitionLocks;
use crate::planner::{self, PlanInput, Protection, UpsertPlan};
use crate::report::{EntityReport, ImportReport, RowError, SkippedFile};
use crate::schema::{DeletePolicy, EntityKind, EntitySchema, SchemaRegistry};
use crate::sources::{self, DetectedFile, RowReader, UploadedFile};
use crate::stores::RecordStore;
use crate::validate::validate;

/// 📥 One import: a partition and the files for it.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub partition: StateCode,
    pub files: Vec<UploadedFile>,
}

/// 🚦 Where an entity is in its import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Parsing,
    Validating,
    Planning,
    Persisting,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 🎬 The importer. Holds the registry, the store handle and the partition locks; cheap to
/// clone when the store is.
#[derive(Debug, Clone)]
pub struct Importer<S> {
    registry: Arc<SchemaRegistry>,
    store: S,
    runtime: RuntimeConfig,
    locks: PartitionLocks,
}

/// 📂 A file that claimed an entity.
struct Claimed {
    file: UploadedFile,
    detected: DetectedFile,
}

/// 🎞️ One entity's trip through the stages.
struct EntityRun {
    schema: &'static EntitySchema,
    partition: StateCode,
    stage: Stage,
    report: EntityReport,
}

impl EntityRun {
    fn advance(&mut self, next: Stage) {
        debug!(
            entity = %self.schema.kind,
            partition = %self.partition,
            from = %self.stage,
            to = %next,
            "🚦 stage transition"
        );
        self.stage = next;
    }

    fn fail(mut self, error: ImportError) -> EntityReport {
        warn!(
            entity = %self.schema.kind,
            partition = %self.partition,
            stage = %self.stage,
            code = error.code(),
            "💀 {error}"
        );
        self.advance(Stage::Failed);
        self.report.fail(&error);
        self.report
    }
}

impl<S: RecordStore> Importer<S> {
    pub fn new(registry: SchemaRegistry, store: S, runtime: RuntimeConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            runtime,
            locks: PartitionLocks::new(),
        }
    }

    /// 🔒 Share partition locks with other importers (e.g. one per HTTP worker).
    pub fn with_locks(mut self, locks: PartitionLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// 🎬 Run one import. Always returns a report.
    pub async fn run_import(&self, request: ImportRequest) -> ImportReport {
        let ImportRequest { partition, files } = request;
        let deadline = self
            .runtime
            .timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        info!(%partition, files = files.len(), "📥 import started");

        let (mut claimed, skipped) = self.claim_files(files);
        if claimed.is_empty() {
            warn!(%partition, skipped = skipped.len(), "🚫 no importable files in the request");
            return ImportReport::new(partition, Vec::new(), skipped);
        }

        let lock_timeout = Duration::from_millis(self.runtime.lock_timeout_ms);
        let _guard = match self.locks.acquire(partition, lock_timeout).await {
            Ok(guard) => guard,
            Err(busy) => {
                let entities = self
                    .registry
                    .order()
                    .iter()
                    .filter(|kind| claimed.contains_key(*kind))
                    .map(|kind| {
                        let mut report = EntityReport::new(*kind);
                        report.fail(&busy);
                        report
                    })
                    .collect();
                return ImportReport::new(partition, entities, skipped);
            }
        };

        let mut entities = Vec::with_capacity(claimed.len());
        for kind in self.registry.order() {
            let Some(Claimed { file, detected }) = claimed.remove(kind) else {
                continue;
            };
            let Some(schema) = self.registry.get(*kind) else {
                continue;
            };
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(entity = %kind, %partition, "⏱️ deadline passed, entity not started");
                let mut report = EntityReport::new(*kind);
                report.fail(&ImportError::TimedOut);
                entities.push(report);
                continue;
            }
            entities.push(self.run_entity(schema, partition, &file, &detected).await);
        }

        let report = ImportReport::new(partition, entities, skipped);
        info!(
            %partition,
            status = ?report.overall_status,
            entities = report.entities.len(),
            skipped = report.skipped_files.len(),
            "🏁 import finished"
        );
        report
    }

    /// 📂 Match every file to an entity, or to the skipped list.
    fn claim_files(&self, files: Vec<UploadedFile>) -> (BTreeMap<EntityKind, Claimed>, Vec<SkippedFile>) {
        let mut claimed = BTreeMap::new();
        let mut skipped = Vec::new();
        for file in files {
            let detected = match sources::detect(&file.file_name) {
                Ok(detected) => detected,
                Err(error) => {
                    skipped.push(SkippedFile::new(&file.file_name, &error));
                    continue;
                }
            };
            let Some(kind) = self.registry.entity_for_stem(&detected.stem) else {
                let error = ImportError::UnknownEntity {
                    file_name: file.file_name.clone(),
                };
                skipped.push(SkippedFile::new(&file.file_name, &error));
                continue;
            };
            if claimed.contains_key(&kind) {
                let error = ImportError::DuplicateEntityFile {
                    file_name: file.file_name.clone(),
                    entity: kind,
                };
                skipped.push(SkippedFile::new(&file.file_name, &error));
                continue;
            }
            claimed.insert(kind, Claimed { file, detected });
        }
        (claimed, skipped)
    }

    async fn run_entity(
        &self,
        schema: &'static EntitySchema,
        partition: StateCode,
        file: &UploadedFile,
        detected: &DetectedFile,
    ) -> EntityReport {
        let mut run = EntityRun {
            schema,
            partition,
            stage: Stage::Pending,
            report: EntityReport::new(schema.kind),
        };

        // ============================================================
        // 📄 Parsing
        // ============================================================
        run.advance(Stage::Parsing);
        let bytes = match file.decoded_contents(detected) {
            Ok(bytes) => bytes,
            Err(error) => return run.fail(error),
        };
        let mut raws = Vec::new();
        let mut parse_errors: Vec<ParseError> = Vec::new();
        for row in RowReader::open(detected.format, &bytes) {
            match row {
                Ok(raw) => raws.push(raw),
                Err(error) => parse_errors.push(error),
            }
        }
        run.report.rows_read = raws.len() + parse_errors.len();

        // ============================================================
        // 🚦 Validating
        // ============================================================
        run.advance(Stage::Validating);
        let mut valid = Vec::with_capacity(raws.len());
        let mut rejects: Vec<ValidationError> = Vec::new();
        for raw in &raws {
            match validate(raw, schema) {
                Ok(record) => match partition_mismatch(&record, partition) {
                    Some(reject) => rejects.push(reject),
                    None => valid.push(record),
                },
                Err(reject) => rejects.push(reject),
            }
        }
        let (records, duplicates) = planner::dedupe(schema, valid);

        let mut protection = Protection::from_rejects(&rejects);
        // -- a row we couldn't even tokenize might be any record at all
        protection.withhold_all |= !parse_errors.is_empty();

        let parse_row_errors: Vec<RowError> = parse_errors.iter().map(RowError::from_parse).collect();
        let validation_row_errors: Vec<RowError> = rejects
            .iter()
            .chain(&duplicates)
            .flat_map(RowError::from_validation)
            .collect();
        run.report.record_row_errors(
            parse_row_errors,
            validation_row_errors,
            self.runtime.max_reported_parse_errors,
        );

        if parse_errors.len() > self.runtime.max_parse_errors {
            return run.fail(ImportError::TooManyParseErrors {
                count: parse_errors.len(),
                limit: self.runtime.max_parse_errors,
            });
        }
        if records.is_empty() && run.report.rows_read > 0 {
            let rows = run.report.rows_read;
            return run.fail(ImportError::NoValidRows { rows });
        }

        let reference_warnings = self.check_references(schema, partition, &records).await;
        run.report.warnings.extend(reference_warnings);

        // ============================================================
        // 🗺️ Planning → ✍️ Persisting, re-planned on every retry
        // ============================================================
        let mut attempt = 0u32;
        let (plan, counts) = loop {
            run.advance(Stage::Planning);
            let persisted = match self.store.fetch_checksums(schema.kind, partition).await {
                Ok(persisted) => persisted,
                Err(err) => {
                    return run.fail(ImportError::Transaction(TransactionError {
                        entity: schema.kind,
                        partition,
                        message: format!("could not read persisted records: {err:#}"),
                    }));
                }
            };
            let plan = match planner::plan(PlanInput {
                schema,
                partition,
                records: records.clone(),
                persisted: &persisted,
                protection: &protection,
            }) {
                Ok(plan) => plan,
                Err(error) => return run.fail(error),
            };

            run.advance(Stage::Persisting);
            match executor::execute(&self.store, &plan).await {
                Ok(counts) => break (plan, counts),
                Err(error) if attempt < self.runtime.transaction_retries => {
                    attempt += 1;
                    warn!(
                        entity = %schema.kind,
                        %partition,
                        attempt,
                        "🔁 transaction failed, re-planning: {}",
                        error.message
                    );
                }
                Err(error) => return run.fail(ImportError::Transaction(error)),
            }
        };

        run.report.inserted = counts.inserted;
        run.report.updated = counts.updated;
        run.report.deleted = counts.deleted;
        run.report.unchanged = plan.unchanged.len();
        run.report.retained = plan.retained.len();
        if let Some(warning) = retention_warning(schema, &plan, &protection) {
            run.report.warnings.push(warning);
        }
        run.report.complete();
        run.advance(Stage::Completed);
        info!(
            entity = %schema.kind,
            %partition,
            status = ?run.report.status,
            inserted = counts.inserted,
            updated = counts.updated,
            unchanged = run.report.unchanged,
            deleted = counts.deleted,
            retained = run.report.retained,
            errors = run.report.error_count,
            "✅ entity imported"
        );
        run.report
    }

    /// 🔗 Warn (never fail) about reference values with no matching parent in this partition.
    async fn check_references(
        &self,
        schema: &'static EntitySchema,
        partition: StateCode,
        records: &[ValidatedRecord],
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        for reference in schema.references {
            let parents = match self.store.fetch_checksums(reference.entity, partition).await {
                Ok(parents) => parents,
                Err(err) => {
                    warnings.push(format!(
                        "could not check {} against {}: {err:#}",
                        reference.field, reference.entity
                    ));
                    continue;
                }
            };
            let mut missing = records.iter().filter_map(|record| {
                let value = record.fields.get(reference.field)?.as_text()?;
                let key = RecordKey::from_parts([value]);
                (!parents.contains_key(&key)).then(|| (record.row_number, value))
            });
            if let Some((first_row, first_value)) = missing.next() {
                let count = 1 + missing.count();
                warnings.push(format!(
                    "{count} row(s) reference a {} ({}) that does not exist in {partition}, \
                     first on row {first_row} ('{first_value}'); they were imported anyway",
                    reference.entity, reference.field
                ));
            }
        }
        warnings
    }
}

/// 🗺️ A record that names a different state than the import is a row error on `stateCode`.
fn partition_mismatch(record: &ValidatedRecord, partition: StateCode) -> Option<ValidationError> {
    let own = record.partition?;
    if own == partition {
        return None;
    }
    Some(ValidationError {
        row_number: record.row_number,
        key: Some(record.key.clone()),
        errors: vec![FieldError::new(
            "stateCode",
            format!("record belongs to {own}, but this import is for {partition}"),
        )],
    })
}

/// 🧯 Explain why persisted records missing from the upload were kept.
fn retention_warning(
    schema: &EntitySchema,
    plan: &UpsertPlan,
    protection: &Protection,
) -> Option<String> {
    let retained = plan.retained.len();
    if retained == 0 {
        return None;
    }
    let reason = if schema.delete_policy == DeletePolicy::Retain {
        format!("{} are never deleted by an import", schema.kind)
    } else if protection.withhold_all {
        "some rejected rows had no readable key, so every deletion was withheld".to_string()
    } else {
        "their rows in the upload failed validation".to_string()
    };
    let sample: Vec<String> = plan.retained.iter().take(5).map(ToString::to_string).collect();
    Some(format!(
        "{retained} persisted record(s) missing from the upload were kept ({reason}): {}{}",
        sample.join(", "),
        if retained > sample.len() { ", ..." } else { "" }
    ))
}
