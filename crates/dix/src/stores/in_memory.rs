//! # Previously, on dix...
//!
//! 🎬 The records had nowhere to live. No disk. No database. Just a test that needed
//! to know whether an import was idempotent, and a heap with room to spare.
//!
//! `InMemoryStore` keeps one table per `(entity, partition)` behind an
//! `Arc<tokio::sync::Mutex<..>>`. Clone it, hand one copy to the importer, keep the
//! other for assertions. Same tables, shared, like a group project where the
//! data actually shows up.
//!
//! `apply` copies the target table, writes into the copy, and swaps it in only when
//! every operation succeeded. The original is never touched mid-plan, so a failure
//! leaves the table exactly as it was. [`InMemoryStore::failing_after`] arms a fault
//! that trips after N operations, which is how the atomicity tests break things on purpose.
//!
//! ⚠️ Not for production. Everything here is gone when the process is. 🦆

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::trace;

use crate::common::{Checksum, RecordKey, StateCode, ValidatedRecord};
use crate::planner::UpsertPlan;
use crate::schema::EntityKind;
use crate::stores::{AppliedCounts, RecordStore, StoredRecord};

/// ⚙️ `[store.InMemory]`. Nothing to configure; RAM is RAM.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryStoreConfig {}

type Table = BTreeMap<RecordKey, StoredRecord>;

/// 💣 An armed fault: fail once `after_ops` operations of a plan have been written,
/// for the next `remaining` plans.
#[derive(Debug, Clone, Copy)]
struct Fault {
    after_ops: usize,
    remaining: usize,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<(EntityKind, StateCode), Table>,
    fault: Option<Fault>,
}

/// 📦 Tables in RAM. Cloning shares them.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💣 A store whose next `times` applies fail after `after_ops` writes each.
    pub fn failing_after(after_ops: usize, times: usize) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.try_lock() {
            state.fault = Some(Fault {
                after_ops,
                remaining: times,
            });
        }
        store
    }

    /// 💣 Arm (or re-arm) the fault on an existing store.
    pub async fn arm_fault(&self, after_ops: usize, times: usize) {
        self.state.lock().await.fault = Some(Fault {
            after_ops,
            remaining: times,
        });
    }

    /// 🔢 How many records of one entity live in one partition.
    pub async fn count(&self, entity: EntityKind, partition: StateCode) -> usize {
        self.state
            .lock()
            .await
            .tables
            .get(&(entity, partition))
            .map_or(0, BTreeMap::len)
    }
}

fn stored(record: &ValidatedRecord) -> StoredRecord {
    StoredRecord {
        key: record.key.clone(),
        checksum: record.checksum.clone(),
        payload: record.fields.to_json(),
    }
}

/// ✍️ Inserts, then updates, then deletes, into the staged table. Inserting an existing
/// key or updating a missing one is a conflict, same as a primary key would say. So is
/// touching a record whose checksum no longer matches the one the plan expected.
fn write_plan(staged: &mut Table, plan: &UpsertPlan, fault: Option<Fault>) -> Result<AppliedCounts> {
    let mut ops = 0usize;
    let mut tick = || -> Result<()> {
        if let Some(fault) = fault {
            if ops >= fault.after_ops {
                bail!("💣 injected fault after {} operations", fault.after_ops);
            }
        }
        ops += 1;
        Ok(())
    };

    let mut counts = AppliedCounts::default();
    for record in &plan.inserts {
        tick()?;
        if staged.contains_key(&record.key) {
            bail!("insert of '{}' collides with an existing record", record.key);
        }
        staged.insert(record.key.clone(), stored(record));
        counts.inserted += 1;
    }
    for record in &plan.updates {
        tick()?;
        let Some(current) = staged.get(&record.key) else {
            bail!("update of '{}' found no record to update", record.key);
        };
        if moved_since_planning(plan, &record.key, current) {
            bail!("update of '{}' found the record changed since it was planned", record.key);
        }
        staged.insert(record.key.clone(), stored(record));
        counts.updated += 1;
    }
    for key in &plan.deletes {
        tick()?;
        if let Some(current) = staged.get(key) {
            if moved_since_planning(plan, key, current) {
                bail!("delete of '{key}' found the record changed since it was planned");
            }
            staged.remove(key);
            counts.deleted += 1;
        }
    }
    Ok(counts)
}

fn moved_since_planning(plan: &UpsertPlan, key: &RecordKey, current: &StoredRecord) -> bool {
    plan.expected
        .get(key)
        .is_some_and(|expected| *expected != current.checksum)
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn fetch_checksums(
        &self,
        entity: EntityKind,
        partition: StateCode,
    ) -> Result<BTreeMap<RecordKey, Checksum>> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(&(entity, partition))
            .map(|table| {
                table
                    .iter()
                    .map(|(key, record)| (key.clone(), record.checksum.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_record(
        &self,
        entity: EntityKind,
        partition: StateCode,
        key: &RecordKey,
    ) -> Result<Option<StoredRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(&(entity, partition))
            .and_then(|table| table.get(key))
            .cloned())
    }

    async fn apply(&self, plan: &UpsertPlan) -> Result<AppliedCounts> {
        let mut state = self.state.lock().await;
        let table_id = (plan.entity, plan.partition);
        // -- 🎭 the understudy. all writes go here; the lead only steps aside on success.
        let mut staged = state.tables.get(&table_id).cloned().unwrap_or_default();
        let outcome = write_plan(&mut staged, plan, state.fault);

        let counts = match outcome {
            Ok(counts) => counts,
            Err(err) => {
                if let Some(fault) = state.fault.as_mut() {
                    fault.remaining = fault.remaining.saturating_sub(1);
                    if fault.remaining == 0 {
                        state.fault = None;
                    }
                }
                trace!(entity = %plan.entity, partition = %plan.partition, "🎭 staged table discarded");
                return Err(err);
            }
        };

        state.tables.insert(table_id, staged);
        Ok(counts)
    }
}
