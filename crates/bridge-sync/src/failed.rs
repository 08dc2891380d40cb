//! # Failed Order Queue
//!
//! Durable record of orders whose upload exhausted its retries. One KV row
//! per order (`failed_order:<id>`), created on first exhaustion,
//! incremented on repeat failure, removed on a successful retry or an
//! explicit clear. This queue is the administrator-visible surface for
//! terminal order failures.

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use bridge_core::FailedOrderEntry;
use bridge_db::KvStore;

const KEY_PREFIX: &str = "failed_order:";

/// Queue of failed order uploads, backed by the KV store.
#[derive(Debug, Clone)]
pub struct FailedOrderQueue {
    kv: KvStore,
}

impl FailedOrderQueue {
    pub fn new(kv: KvStore) -> Self {
        FailedOrderQueue { kv }
    }

    fn key(order_id: i64) -> String {
        format!("{KEY_PREFIX}{order_id}")
    }

    /// Records a terminal failure: creates the entry with `retry_count = 1`
    /// or increments an existing one, refreshing kind, detail, and
    /// timestamp to the latest failure.
    pub async fn record_failure(
        &self,
        order_id: i64,
        error: &SyncError,
    ) -> SyncResult<FailedOrderEntry> {
        let previous: Option<FailedOrderEntry> = self.kv.get(&Self::key(order_id)).await?;
        let entry = FailedOrderEntry {
            order_id,
            error_kind: error.kind().to_string(),
            error_detail: error.to_string(),
            failed_at: Utc::now(),
            retry_count: previous.map(|p| p.retry_count).unwrap_or(0) + 1,
        };

        self.kv.put(&Self::key(order_id), &entry, None).await?;
        warn!(
            order_id,
            retry_count = entry.retry_count,
            error_kind = %entry.error_kind,
            "Order upload failed, queued"
        );
        Ok(entry)
    }

    pub async fn get(&self, order_id: i64) -> SyncResult<Option<FailedOrderEntry>> {
        Ok(self.kv.get(&Self::key(order_id)).await?)
    }

    /// Removes the entry, typically after a successful retry.
    pub async fn remove(&self, order_id: i64) -> SyncResult<()> {
        self.kv.delete(&Self::key(order_id)).await?;
        Ok(())
    }

    /// All queued entries, oldest failure first.
    pub async fn list(&self) -> SyncResult<Vec<FailedOrderEntry>> {
        let keys = self.kv.keys_with_prefix(KEY_PREFIX).await?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.kv.get::<FailedOrderEntry>(&key).await? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|entry| entry.failed_at);
        Ok(entries)
    }

    /// Clears the whole queue, returning how many entries were dropped.
    pub async fn clear(&self) -> SyncResult<usize> {
        let keys = self.kv.keys_with_prefix(KEY_PREFIX).await?;
        let count = keys.len();
        for key in keys {
            self.kv.delete(&key).await?;
        }
        info!(count, "Failed order queue cleared");
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_db::{Database, DbConfig};

    async fn queue() -> FailedOrderQueue {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        FailedOrderQueue::new(db.kv())
    }

    #[tokio::test]
    async fn test_lifecycle_create_increment_remove() {
        let queue = queue().await;
        let error = SyncError::ServerError { status: 503 };

        let first = queue.record_failure(55, &error).await.unwrap();
        assert_eq!(first.retry_count, 1);
        assert_eq!(first.error_kind, "server_error");

        let second = queue.record_failure(55, &error).await.unwrap();
        assert_eq!(second.retry_count, 2);

        queue.remove(55).await.unwrap();
        assert!(queue.get(55).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_clear_scope_to_queue_keys() {
        let queue = queue().await;
        let error = SyncError::Timeout("30s".into());

        queue.record_failure(1, &error).await.unwrap();
        queue.record_failure(2, &error).await.unwrap();

        let entries = queue.list().await.unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(queue.clear().await.unwrap(), 2);
        assert!(queue.list().await.unwrap().is_empty());
    }
}
