//! 🗄️ Stores: the only code in dix allowed to change persisted state.
//!
//! 🎬 *[the planner hands over a clipboard. the store reads it, nods, and either does ALL
//! of it or NONE of it. there is no third option. the third option was fired.]*
//!
//! [`RecordStore`] is the seam; [`StoreBackend`] is the enum that dispatches to a
//! concrete backend, same shape as every other backend enum in the house:
//! - [`InMemoryStore`]: tables in RAM behind a tokio mutex. Tests, demos, fault injection.
//! - [`SqliteStore`]: one `records` table in a SQLite file, one transaction per plan.
//!
//! Rows are keyed by `(entity, partition, record_key)`. Every read and write is scoped to
//! one partition, so an import for `US_ID` cannot see, let alone touch, `US_TN`. 🦆

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::common::{Checksum, RecordKey, StateCode};
use crate::planner::UpsertPlan;
use crate::schema::EntityKind;

pub(crate) mod in_memory;
pub(crate) mod sqlite;

pub use in_memory::{InMemoryStore, InMemoryStoreConfig};
pub use sqlite::{SqliteStore, SqliteStoreConfig};

/// 💾 A persisted record, as the store hands it back.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: RecordKey,
    pub checksum: Checksum,
    pub payload: Value,
}

/// 🧮 What an applied plan actually wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedCounts {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// 🗄️ A place records live between imports.
///
/// # Contract
/// - reads are scoped to one `(entity, partition)`
/// - `apply` is all-or-nothing: on `Err`, nothing from the plan is visible
#[async_trait]
pub trait RecordStore: std::fmt::Debug + Send + Sync {
    /// 🔐 `key → checksum` for every persisted record of one entity in one partition.
    async fn fetch_checksums(
        &self,
        entity: EntityKind,
        partition: StateCode,
    ) -> Result<BTreeMap<RecordKey, Checksum>>;

    /// 🔍 One persisted record, for inspection.
    async fn fetch_record(
        &self,
        entity: EntityKind,
        partition: StateCode,
        key: &RecordKey,
    ) -> Result<Option<StoredRecord>>;

    /// ✍️ Apply a plan in one transaction.
    async fn apply(&self, plan: &UpsertPlan) -> Result<AppliedCounts>;
}

/// ⚙️ Which store to build, straight from config (`[store.Sqlite]` or `[store.InMemory]`).
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    InMemory(InMemoryStoreConfig),
    Sqlite(SqliteStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::InMemory(InMemoryStoreConfig::default())
    }
}

/// 🎭 The concrete store, picked at startup. Cloning shares the underlying tables/connection.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    InMemory(InMemoryStore),
    Sqlite(SqliteStore),
}

impl StoreBackend {
    /// 🏗️ Build the store the config asks for.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::InMemory(_) => Ok(StoreBackend::InMemory(InMemoryStore::new())),
            StoreConfig::Sqlite(sqlite) => Ok(StoreBackend::Sqlite(SqliteStore::open(sqlite).await?)),
        }
    }
}

#[async_trait]
impl RecordStore for StoreBackend {
    async fn fetch_checksums(
        &self,
        entity: EntityKind,
        partition: StateCode,
    ) -> Result<BTreeMap<RecordKey, Checksum>> {
        match self {
            StoreBackend::InMemory(store) => store.fetch_checksums(entity, partition).await,
            StoreBackend::Sqlite(store) => store.fetch_checksums(entity, partition).await,
        }
    }

    async fn fetch_record(
        &self,
        entity: EntityKind,
        partition: StateCode,
        key: &RecordKey,
    ) -> Result<Option<StoredRecord>> {
        match self {
            StoreBackend::InMemory(store) => store.fetch_record(entity, partition, key).await,
            StoreBackend::Sqlite(store) => store.fetch_record(entity, partition, key).await,
        }
    }

    async fn apply(&self, plan: &UpsertPlan) -> Result<AppliedCounts> {
        match self {
            StoreBackend::InMemory(store) => store.apply(plan).await,
            StoreBackend::Sqlite(store) => store.apply(plan).await,
        }
    }
}
