use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::plan::PlanKey;

/// Process-wide named mutual exclusion for plan find-or-create.
///
/// Keys are spread over a fixed number of shards by their blake3 digest, so two
/// different (year, department) pairs may share a shard; that only costs parallelism.
/// Callers must open their transaction before taking the lock and hold the guard
/// until the transaction finishes.
pub struct PlanLockTable {
    shards: Vec<Arc<Mutex<()>>>,
}

pub struct PlanLockGuard {
    shard: usize,
    _guard: OwnedMutexGuard<()>,
}

impl PlanLockGuard {
    pub fn shard(&self) -> usize {
        self.shard
    }
}

impl fmt::Debug for PlanLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanLockGuard").field("shard", &self.shard).finish()
    }
}

impl Default for PlanLockTable {
    fn default() -> Self {
        Self::new(64)
    }
}

impl fmt::Debug for PlanLockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanLockTable").field("shards", &self.shards.len()).finish()
    }
}

impl PlanLockTable {
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Arc::new(Mutex::new(()))).collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_for(&self, key: &PlanKey) -> usize {
        (key.lock_digest() % self.shards.len() as u64) as usize
    }

    pub async fn lock(&self, key: &PlanKey) -> PlanLockGuard {
        let shard = self.shard_for(key);
        let guard = Arc::clone(&self.shards[shard]).lock_owned().await;
        PlanLockGuard { shard, _guard: guard }
    }
}
