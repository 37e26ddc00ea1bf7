//! 🔒 Partition locks: one import per state at a time.
//!
//! A map of partition → `Arc<tokio::sync::Mutex<()>>`, created lazily, shared by every run
//! of an importer. The run holds an owned guard for its whole duration; the guard drops
//! when the run ends, however it ends. Waiting is bounded: nobody queues forever behind
//! a stuck import.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::common::StateCode;
use crate::errors::ImportError;

/// 🔑 Proof that this run owns its partition. Dropping it releases the lock.
#[derive(Debug)]
pub struct PartitionGuard {
    partition: StateCode,
    _guard: OwnedMutexGuard<()>,
}

impl PartitionGuard {
    pub fn partition(&self) -> StateCode {
        self.partition
    }
}

/// 🔒 Lazily created lock per partition. Cloning shares the map.
#[derive(Debug, Clone, Default)]
pub struct PartitionLocks {
    locks: Arc<Mutex<HashMap<StateCode, Arc<AsyncMutex<()>>>>>,
}

impl PartitionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, partition: StateCode) -> Arc<AsyncMutex<()>> {
        // -- a poisoned map only means some thread panicked while inserting; the map is still fine
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(partition).or_default())
    }

    /// ⏳ Wait up to `timeout` for exclusive ownership of `partition`.
    pub async fn acquire(
        &self,
        partition: StateCode,
        timeout: Duration,
    ) -> Result<PartitionGuard, ImportError> {
        let lock = self.lock_for(partition);
        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(%partition, "🔒 partition lock acquired");
                Ok(PartitionGuard {
                    partition,
                    _guard: guard,
                })
            }
            Err(_) => {
                warn!(%partition, timeout_ms = timeout.as_millis() as u64, "⏳ partition lock not acquired");
                Err(ImportError::PartitionBusy { partition })
            }
        }
    }
}
