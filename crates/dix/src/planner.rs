//! 🗺️ The Upsert Planner: decides, never does.
//!
//! 🎬 *[INT. WAR ROOM. A batch of 1,000 validated clients on one side of the table.
//! 50 persisted clients on the other. The planner pulls out a red pen.]*
//!
//! Given the incoming records and the persisted `key → checksum` map for one entity in
//! ONE partition, [`plan`] sorts every key into exactly one bucket:
//!
//! | incoming | persisted | checksum | bucket |
//! |---|---|---|---|
//! | yes | no | - | `inserts` |
//! | yes | yes | differs | `updates` |
//! | yes | yes | equal | `unchanged` |
//! | no | yes | - | `deletes`, or `retained` if policy/protection says so |
//!
//! Two guards stand between a bad upload and a wiped partition:
//! - an empty batch over existing records is refused outright ([`ImportError::SuspiciousEmptyBatch`])
//! - rows that failed validation protect their persisted twin from deletion; if even one
//!   failed row's key was unreadable, nothing gets deleted at all
//!
//! Pure function, no I/O. The executor does the doing. 🦆

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;

use crate::common::{Checksum, RecordKey, StateCode, ValidatedRecord};
use crate::errors::{FieldError, ImportError, ValidationError};
use crate::schema::{DeletePolicy, EntityKind, EntitySchema};

/// 🧯 Which persisted keys are off-limits for deletion this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Protection {
    /// keys of rows that failed validation but whose key was readable
    pub keys: BTreeSet<RecordKey>,
    /// at least one failed row had no readable key: withhold every delete
    pub withhold_all: bool,
}

impl Protection {
    /// 🧯 Build protection from the rows that didn't make it.
    pub fn from_rejects<'e>(rejects: impl IntoIterator<Item = &'e ValidationError>) -> Self {
        let mut protection = Protection::default();
        for reject in rejects {
            match &reject.key {
                Some(key) => {
                    protection.keys.insert(key.clone());
                }
                None => protection.withhold_all = true,
            }
        }
        protection
    }
}

/// 📥 Everything [`plan`] needs. Persisted checksums must already be scoped to `partition`.
#[derive(Debug)]
pub struct PlanInput<'a> {
    pub schema: &'static EntitySchema,
    pub partition: StateCode,
    pub records: Vec<ValidatedRecord>,
    pub persisted: &'a BTreeMap<RecordKey, Checksum>,
    pub protection: &'a Protection,
}

/// 📋 The plan. Every key lands in exactly one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertPlan {
    pub entity: EntityKind,
    pub partition: StateCode,
    pub inserts: Vec<ValidatedRecord>,
    pub updates: Vec<ValidatedRecord>,
    pub unchanged: Vec<RecordKey>,
    pub deletes: Vec<RecordKey>,
    /// 🧯 would have been deleted, kept by policy or protection
    pub retained: Vec<RecordKey>,
    /// 🔏 the persisted checksum each update and delete was planned against. A store refuses
    /// to touch a record whose checksum has moved since. Keys without an entry are unconditional.
    pub expected: BTreeMap<RecordKey, Checksum>,
}

impl UpsertPlan {
    pub fn empty(entity: EntityKind, partition: StateCode) -> Self {
        Self {
            entity,
            partition,
            inserts: Vec::new(),
            updates: Vec::new(),
            unchanged: Vec::new(),
            deletes: Vec::new(),
            retained: Vec::new(),
            expected: BTreeMap::new(),
        }
    }

    /// ✍️ Number of writes `apply` will perform.
    pub fn write_count(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }
}

/// 🔁 Enforce key uniqueness inside one batch. First occurrence wins; every later
/// duplicate becomes a row error pointing back at the row that won.
pub fn dedupe(
    schema: &EntitySchema,
    records: Vec<ValidatedRecord>,
) -> (Vec<ValidatedRecord>, Vec<ValidationError>) {
    let mut first_seen: HashMap<RecordKey, usize> = HashMap::with_capacity(records.len());
    let mut kept = Vec::with_capacity(records.len());
    let mut duplicates = Vec::new();
    let key_field = schema.key.join("+");

    for record in records {
        match first_seen.get(&record.key) {
            Some(first_row) => duplicates.push(ValidationError {
                row_number: record.row_number,
                key: Some(record.key.clone()),
                errors: vec![FieldError::new(
                    key_field.clone(),
                    format!("duplicate key '{}', first seen on row {first_row}", record.key),
                )],
            }),
            None => {
                first_seen.insert(record.key.clone(), record.row_number);
                kept.push(record);
            }
        }
    }
    (kept, duplicates)
}

/// 🗺️ Compute the upsert plan for one entity in one partition.
pub fn plan(input: PlanInput<'_>) -> Result<UpsertPlan, ImportError> {
    let PlanInput {
        schema,
        partition,
        records,
        persisted,
        protection,
    } = input;
    let entity = schema.kind;

    if records.is_empty() {
        if persisted.is_empty() {
            return Ok(UpsertPlan::empty(entity, partition));
        }
        // -- 🚨 an empty file over a populated partition is an export bug, not a mass exodus
        warn!(
            %entity,
            %partition,
            existing = persisted.len(),
            "🚨 empty batch over existing records, refusing to plan deletes"
        );
        return Err(ImportError::SuspiciousEmptyBatch {
            entity,
            partition,
            existing: persisted.len(),
        });
    }

    let mut out = UpsertPlan::empty(entity, partition);
    let mut incoming = BTreeSet::new();
    for record in records {
        incoming.insert(record.key.clone());
        match persisted.get(&record.key) {
            None => out.inserts.push(record),
            Some(existing) if *existing != record.checksum => {
                out.expected.insert(record.key.clone(), existing.clone());
                out.updates.push(record);
            }
            Some(_) => out.unchanged.push(record.key),
        }
    }

    for (key, checksum) in persisted.iter().filter(|(key, _)| !incoming.contains(*key)) {
        let keep = schema.delete_policy == DeletePolicy::Retain
            || protection.withhold_all
            || protection.keys.contains(key);
        if keep {
            out.retained.push(key.clone());
        } else {
            out.expected.insert(key.clone(), checksum.clone());
            out.deletes.push(key.clone());
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FieldValue, Fields};

    fn record(entity: EntityKind, key: &str, version: i64, row: usize) -> ValidatedRecord {
        let mut fields = Fields::new();
        fields.push("externalId", FieldValue::Text(key.into()));
        fields.push("version", FieldValue::Integer(version));
        let checksum = Checksum::compute(entity, &fields);
        ValidatedRecord {
            entity,
            row_number: row,
            key: RecordKey::from_parts([key]),
            partition: Some(StateCode::US_XX),
            fields,
            checksum,
        }
    }

    fn persisted(records: &[ValidatedRecord]) -> BTreeMap<RecordKey, Checksum> {
        records
            .iter()
            .map(|r| (r.key.clone(), r.checksum.clone()))
            .collect()
    }

    fn keys(keys: &[RecordKey]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn the_one_where_every_key_finds_its_bucket() {
        let kind = EntityKind::Client;
        let before = persisted(&[
            record(kind, "same", 1, 1),
            record(kind, "changed", 1, 2),
            record(kind, "gone", 1, 3),
        ]);
        let incoming = vec![
            record(kind, "same", 1, 1),
            record(kind, "changed", 2, 2),
            record(kind, "new", 1, 3),
        ];
        let protection = Protection::default();
        let plan = plan(PlanInput {
            schema: kind.schema(),
            partition: StateCode::US_XX,
            records: incoming,
            persisted: &before,
            protection: &protection,
        })
        .expect("💀 plan should build");

        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(keys(&plan.unchanged), vec!["same"]);
        assert_eq!(keys(&plan.deletes), vec!["gone"]);
        assert!(plan.retained.is_empty());
        assert_eq!(plan.write_count(), 3);
        // -- the update and the delete remember what they saw; the insert had nothing to see
        let seen: Vec<String> = plan.expected.keys().map(ToString::to_string).collect();
        assert_eq!(seen, vec!["changed", "gone"]);
        for key in plan.updates.iter().map(|r| &r.key).chain(&plan.deletes) {
            assert_eq!(plan.expected.get(key), before.get(key), "{key} planned blind");
        }
    }

    #[test]
    fn the_one_where_an_empty_batch_is_treated_as_a_crime_scene() {
        let kind = EntityKind::Client;
        let before = persisted(&[record(kind, "a", 1, 1), record(kind, "b", 1, 2)]);
        let protection = Protection::default();
        let result = plan(PlanInput {
            schema: kind.schema(),
            partition: StateCode::US_XX,
            records: Vec::new(),
            persisted: &before,
            protection: &protection,
        });
        assert_eq!(
            result,
            Err(ImportError::SuspiciousEmptyBatch {
                entity: kind,
                partition: StateCode::US_XX,
                existing: 2,
            })
        );

        let nothing = BTreeMap::new();
        let empty = plan(PlanInput {
            schema: kind.schema(),
            partition: StateCode::US_XX,
            records: Vec::new(),
            persisted: &nothing,
            protection: &protection,
        })
        .expect("💀 empty over empty is fine");
        assert_eq!(empty.write_count(), 0);
    }

    #[test]
    fn the_one_where_cases_are_never_deleted_only_retained() {
        let kind = EntityKind::Case;
        let before = persisted(&[record(kind, "k-1", 1, 1), record(kind, "k-2", 1, 2)]);
        let protection = Protection::default();
        let plan = plan(PlanInput {
            schema: kind.schema(),
            partition: StateCode::US_XX,
            records: vec![record(kind, "k-1", 1, 1)],
            persisted: &before,
            protection: &protection,
        })
        .expect("💀 plan should build");
        assert!(plan.deletes.is_empty());
        assert_eq!(keys(&plan.retained), vec!["k-2"]);
    }

    #[test]
    fn the_one_where_a_broken_row_shields_its_persisted_twin() {
        let kind = EntityKind::Client;
        let before = persisted(&[
            record(kind, "keep", 1, 1),
            record(kind, "broken", 1, 2),
            record(kind, "gone", 1, 3),
        ]);
        let reject = ValidationError {
            row_number: 2,
            key: Some(RecordKey::from_parts(["broken"])),
            errors: vec![FieldError::new("birthDate", "nope")],
        };
        let protection = Protection::from_rejects([&reject]);
        let plan = plan(PlanInput {
            schema: kind.schema(),
            partition: StateCode::US_XX,
            records: vec![record(kind, "keep", 1, 1)],
            persisted: &before,
            protection: &protection,
        })
        .expect("💀 plan should build");
        assert_eq!(keys(&plan.deletes), vec!["gone"]);
        assert_eq!(keys(&plan.retained), vec!["broken"]);

        let anonymous = ValidationError {
            row_number: 3,
            key: None,
            errors: vec![FieldError::new("externalId", "required field is missing")],
        };
        let protection = Protection::from_rejects([&reject, &anonymous]);
        assert!(protection.withhold_all);
    }

    #[test]
    fn the_one_where_the_first_duplicate_wins() {
        let kind = EntityKind::Staff;
        let (kept, dupes) = dedupe(
            kind.schema(),
            vec![
                record(kind, "s-1", 1, 1),
                record(kind, "s-2", 1, 2),
                record(kind, "s-1", 2, 3),
            ],
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].row_number, 1);
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].row_number, 3);
        assert_eq!(dupes[0].errors[0].field, "externalId");
        assert!(dupes[0].errors[0].message.contains("first seen on row 1"));
    }
}
