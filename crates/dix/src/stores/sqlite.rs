use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Deserialize;
use tracing::debug;

use crate::common::{Checksum, RecordKey, StateCode};
use crate::planner::UpsertPlan;
use crate::schema::EntityKind;
use crate::stores::{AppliedCounts, RecordStore, StoredRecord};

// -- 🗄️ SqliteStoreConfig: lives next to the store that reads it. `[store.Sqlite]` in TOML.
#[derive(Debug, Deserialize, Clone)]
pub struct SqliteStoreConfig {
    pub path: PathBuf,
    /// ⏳ how long a write waits on another process's lock before SQLite gives up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records(
    entity      TEXT NOT NULL,
    partition   TEXT NOT NULL,
    record_key  TEXT NOT NULL,
    checksum    TEXT NOT NULL,
    payload     TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (entity, partition, record_key)
);
";

/// 🗄️ Records in one SQLite file. Every call hops onto a blocking thread, because
/// rusqlite is synchronous and the runtime has better things to do than wait on fsync.
///
/// One connection behind a `std::sync::Mutex`. Across processes, `apply` takes SQLite's
/// write lock up front (`BEGIN IMMEDIATE`) and every update or delete is conditional on the
/// checksum the plan was computed against, so a plan another process made stale fails
/// whole and gets re-planned instead of overwriting what it never saw.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// 🚀 Open (or create) the database file and make sure the table exists.
    pub async fn open(config: &SqliteStoreConfig) -> Result<Self> {
        let path = config.path.clone();
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let conn = tokio::task::spawn_blocking({
            let path = path.clone();
            move || -> Result<Connection> {
                let conn = Connection::open(&path)?;
                conn.busy_timeout(busy_timeout)?;
                conn.execute_batch(SCHEMA)?;
                Ok(conn)
            }
        })
        .await
        .context("💀 the thread opening the SQLite store never came back")?
        .with_context(|| {
            format!(
                "💀 Could not open the SQLite store at '{}'. Does the directory exist? \
                Can we write to it? Is another process holding it hostage?",
                path.display()
            )
        })?;
        debug!(path = %path.display(), "🗄️ sqlite store open");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// 🧵 Run `work` with the connection on a blocking thread.
    async fn with_conn<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard: MutexGuard<'_, Connection> = conn
                .lock()
                .map_err(|_| anyhow!("💀 the sqlite connection mutex is poisoned"))?;
            work(&mut guard)
        })
        .await
        .context("💀 the sqlite worker thread panicked or was cancelled")?
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn fetch_checksums(
        &self,
        entity: EntityKind,
        partition: StateCode,
    ) -> Result<BTreeMap<RecordKey, Checksum>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT record_key, checksum FROM records WHERE entity = ?1 AND partition = ?2",
            )?;
            let rows = stmt.query_map(params![entity.name(), partition.as_str()], |row| {
                Ok((
                    RecordKey::from_stored(row.get::<_, String>(0)?),
                    Checksum::from_stored(row.get::<_, String>(1)?),
                ))
            })?;
            let mut checksums = BTreeMap::new();
            for row in rows {
                let (key, checksum) = row?;
                checksums.insert(key, checksum);
            }
            Ok(checksums)
        })
        .await
    }

    async fn fetch_record(
        &self,
        entity: EntityKind,
        partition: StateCode,
        key: &RecordKey,
    ) -> Result<Option<StoredRecord>> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT checksum, payload FROM records \
                     WHERE entity = ?1 AND partition = ?2 AND record_key = ?3",
                    params![entity.name(), partition.as_str(), key.as_stored()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;
            let Some((checksum, payload)) = found else {
                return Ok(None);
            };
            let payload = serde_json::from_str(&payload)
                .with_context(|| format!("💀 stored payload for '{key}' is not JSON"))?;
            Ok(Some(StoredRecord {
                key,
                checksum: Checksum::from_stored(checksum),
                payload,
            }))
        })
        .await
    }

    async fn apply(&self, plan: &UpsertPlan) -> Result<AppliedCounts> {
        let plan = plan.clone();
        self.with_conn(move |conn| {
            let entity = plan.entity.name();
            let partition = plan.partition.as_str();
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            let mut counts = AppliedCounts::default();

            // -- 🧯 dropped without commit = rolled back. every `?` below is a rollback.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO records(entity, partition, record_key, checksum, payload, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for record in &plan.inserts {
                    let payload = serde_json::to_string(&record.fields.to_json())?;
                    insert
                        .execute(params![
                            entity,
                            partition,
                            record.key.as_stored(),
                            record.checksum.as_str(),
                            payload,
                            now
                        ])
                        .with_context(|| format!("insert of '{}' failed", record.key))?;
                    counts.inserted += 1;
                }

                // -- ?7 NULL = unconditional, otherwise the row must still carry the planned checksum
                let mut update = tx.prepare(
                    "UPDATE records SET checksum = ?4, payload = ?5, updated_at = ?6 \
                     WHERE entity = ?1 AND partition = ?2 AND record_key = ?3 \
                     AND (?7 IS NULL OR checksum = ?7)",
                )?;
                for record in &plan.updates {
                    let payload = serde_json::to_string(&record.fields.to_json())?;
                    let expected = plan.expected.get(&record.key).map(Checksum::as_str);
                    let changed = update.execute(params![
                        entity,
                        partition,
                        record.key.as_stored(),
                        record.checksum.as_str(),
                        payload,
                        now,
                        expected
                    ])?;
                    if changed != 1 {
                        bail!(
                            "update of '{}' found no record carrying the checksum it was planned against",
                            record.key
                        );
                    }
                    counts.updated += 1;
                }

                let mut delete = tx.prepare(
                    "DELETE FROM records WHERE entity = ?1 AND partition = ?2 AND record_key = ?3 \
                     AND (?4 IS NULL OR checksum = ?4)",
                )?;
                let mut still_there = tx.prepare(
                    "SELECT 1 FROM records WHERE entity = ?1 AND partition = ?2 AND record_key = ?3",
                )?;
                for key in &plan.deletes {
                    let expected = plan.expected.get(key).map(Checksum::as_str);
                    let removed = delete.execute(params![entity, partition, key.as_stored(), expected])?;
                    // -- gone already is fine. changed underneath us is not.
                    if removed == 0 && still_there.exists(params![entity, partition, key.as_stored()])? {
                        bail!("delete of '{key}' found the record changed since it was planned");
                    }
                    counts.deleted += removed;
                }
            }
            tx.commit()?;
            Ok(counts)
        })
        .await
    }
}
