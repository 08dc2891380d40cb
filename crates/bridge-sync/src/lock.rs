//! # Sync Lock
//!
//! Mutual exclusion for full sync runs, shared between manual triggers and
//! the scheduler through the KV store.
//!
//! Acquisition rides on the KV store's atomic `put_if_absent`: exactly one
//! caller wins the row, everyone else sees the holder's info. The 10-minute
//! TTL bounds the damage of a crashed holder; an expired row is stolen by
//! the next acquirer.

use std::time::Duration;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use bridge_core::{SyncLockInfo, SyncSource};
use bridge_db::KvStore;

/// KV key holding the lock row.
const LOCK_KEY: &str = "sync_lock";

/// A crashed holder's lock outlives it by at most this long.
pub(crate) const LOCK_TTL: Duration = Duration::from_secs(600);

/// Handle to the shared sync lock.
#[derive(Debug, Clone)]
pub struct SyncLock {
    kv: KvStore,
}

impl SyncLock {
    pub fn new(kv: KvStore) -> Self {
        SyncLock { kv }
    }

    /// Attempts to take the lock. Fails fast with the current holder's
    /// description when it is held and unexpired; never waits.
    pub async fn acquire(
        &self,
        source: SyncSource,
        user_id: Option<i64>,
    ) -> SyncResult<SyncLockGuard> {
        let info = SyncLockInfo {
            started_at: chrono::Utc::now(),
            source,
            user_id,
        };

        let won = self.kv.put_if_absent(LOCK_KEY, &info, Some(LOCK_TTL)).await?;
        if !won {
            let holder = self
                .kv
                .get::<SyncLockInfo>(LOCK_KEY)
                .await?
                .map(|held| format!("{} at {}", held.source, held.started_at))
                .unwrap_or_else(|| "unknown".to_string());
            warn!(%holder, "Sync lock is held, aborting");
            return Err(SyncError::SyncAlreadyRunning { holder });
        }

        info!(%source, "Sync lock acquired");
        Ok(SyncLockGuard { kv: self.kv.clone() })
    }

    /// Returns the current holder's info, if the lock is held.
    pub async fn holder(&self) -> SyncResult<Option<SyncLockInfo>> {
        Ok(self.kv.get(LOCK_KEY).await?)
    }
}

/// Proof of lock ownership. Call [`release`](Self::release) when the run
/// finishes, success or error; a dropped guard leaves the row to its TTL.
#[derive(Debug)]
pub struct SyncLockGuard {
    kv: KvStore,
}

impl SyncLockGuard {
    /// Releases the lock row.
    pub async fn release(self) -> SyncResult<()> {
        self.kv.delete(LOCK_KEY).await?;
        info!("Sync lock released");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
