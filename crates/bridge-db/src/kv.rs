//! # Persistent Key/Value Option Store
//!
//! A small key/value table with TTL semantics. This store backs everything
//! the bridge shares across independent invocations:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        kv_store consumers                               │
//! │                                                                         │
//! │  option:*         configuration overrides (OAuth tokens, toggles)      │
//! │  rate_limiter     token bucket state      TTL = 2× bucket window       │
//! │  sync_lock        full-sync mutex         TTL = 10 minutes             │
//! │  order_lock:<id>  per-order upload lock   TTL = 2 minutes              │
//! │  failed_order:<id> failed-order queue     no TTL                       │
//! │  sync_progress    progress snapshot       TTL = lock TTL               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expired rows read as absent and are swept lazily via [`KvStore::purge_expired`];
//! nothing depends on eager deletion. Values are JSON so callers get typed
//! reads through serde.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Persistent key/value store with per-entry TTLs.
#[derive(Debug, Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    /// Creates a new KvStore over the shared pool.
    pub fn new(pool: SqlitePool) -> Self {
        KvStore { pool }
    }

    /// Reads a value. Expired or missing entries both read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let now = Utc::now().timestamp();

        let row = sqlx::query(
            "SELECT value FROM kv_store \
             WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                let value = serde_json::from_str(&raw)
                    .map_err(|e| DbError::invalid_value(key, e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Reads a value, falling back to a default when absent.
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> DbResult<T> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Writes a value, replacing any previous entry. `ttl = None` means the
    /// entry never expires.
    pub async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> DbResult<()> {
        let now = Utc::now();
        let expires_at = ttl.map(|t| now.timestamp() + t.as_secs() as i64);
        let raw = serde_json::to_string(value)
            .map_err(|e| DbError::invalid_value(key, e.to_string()))?;

        sqlx::query(
            "INSERT INTO kv_store (key, value, expires_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (key) DO UPDATE SET \
                 value = excluded.value, \
                 expires_at = excluded.expires_at, \
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(raw)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Atomically writes a value only when no live entry exists.
    ///
    /// Returns `true` when the entry was written (the caller now "holds" the
    /// key), `false` when a live entry is already present. An expired entry
    /// counts as absent and is overwritten. This is the lock-acquisition
    /// primitive for the sync lock and the per-order upload locks.
    pub async fn put_if_absent<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> DbResult<bool> {
        let now = Utc::now();
        let now_ts = now.timestamp();
        let expires_at = ttl.map(|t| now_ts + t.as_secs() as i64);
        let raw = serde_json::to_string(value)
            .map_err(|e| DbError::invalid_value(key, e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO kv_store (key, value, expires_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (key) DO UPDATE SET \
                 value = excluded.value, \
                 expires_at = excluded.expires_at, \
                 updated_at = excluded.updated_at \
             WHERE kv_store.expires_at IS NOT NULL AND kv_store.expires_at <= ?5",
        )
        .bind(key)
        .bind(raw)
        .bind(expires_at)
        .bind(now)
        .bind(now_ts)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes an entry. Deleting a missing key is not an error.
    pub async fn delete(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Lists live keys starting with the given prefix, oldest first.
    pub async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let now = Utc::now().timestamp();
        // LIKE special characters in prefixes are escaped so a literal '_'
        // in a key (e.g. "failed_order:") does not act as a wildcard.
        let pattern = format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );

        let rows = sqlx::query(
            "SELECT key FROM kv_store \
             WHERE key LIKE ?1 ESCAPE '\\' AND (expires_at IS NULL OR expires_at > ?2) \
             ORDER BY updated_at ASC",
        )
        .bind(pattern)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("key").map_err(DbError::from))
            .collect()
    }

    /// Removes all expired entries. Safe to call at any time.
    pub async fn purge_expired(&self) -> DbResult<u64> {
        let now = Utc::now().timestamp();

        let result = sqlx::query("DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "Purged expired KV entries");
        }
        Ok(purged)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Marker {
        owner: String,
    }

    async fn store() -> KvStore {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.kv()
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let kv = store().await;
        let value: Option<Marker> = kv.get("nope").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let kv = store().await;
        let marker = Marker { owner: "manual".into() };

        kv.put("sync_lock", &marker, None).await.unwrap();
        let read: Option<Marker> = kv.get("sync_lock").await.unwrap();
        assert_eq!(read, Some(marker));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let kv = store().await;
        let marker = Marker { owner: "scheduled".into() };

        // Zero TTL expires immediately (expires_at == now).
        kv.put("ephemeral", &marker, Some(Duration::from_secs(0))).await.unwrap();
        let read: Option<Marker> = kv.get("ephemeral").await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_put_if_absent_mutual_exclusion() {
        let kv = store().await;
        let first = Marker { owner: "manual".into() };
        let second = Marker { owner: "scheduled".into() };

        assert!(kv.put_if_absent("sync_lock", &first, Some(Duration::from_secs(600))).await.unwrap());
        // A live entry blocks the second writer.
        assert!(!kv.put_if_absent("sync_lock", &second, Some(Duration::from_secs(600))).await.unwrap());

        let held: Marker = kv.get("sync_lock").await.unwrap().unwrap();
        assert_eq!(held.owner, "manual");
    }

    #[tokio::test]
    async fn test_put_if_absent_steals_expired_entry() {
        let kv = store().await;
        let stale = Marker { owner: "crashed".into() };
        let fresh = Marker { owner: "scheduled".into() };

        kv.put("sync_lock", &stale, Some(Duration::from_secs(0))).await.unwrap();
        assert!(kv.put_if_absent("sync_lock", &fresh, Some(Duration::from_secs(600))).await.unwrap());

        let held: Marker = kv.get("sync_lock").await.unwrap().unwrap();
        assert_eq!(held.owner, "scheduled");
    }

    #[tokio::test]
    async fn test_delete_releases_key() {
        let kv = store().await;
        let marker = Marker { owner: "manual".into() };

        kv.put("sync_lock", &marker, None).await.unwrap();
        kv.delete("sync_lock").await.unwrap();

        let read: Option<Marker> = kv.get("sync_lock").await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_prefix_scan_skips_other_keys() {
        let kv = store().await;
        let marker = Marker { owner: "x".into() };

        kv.put("failed_order:11", &marker, None).await.unwrap();
        kv.put("failed_order:12", &marker, None).await.unwrap();
        kv.put("failedXorder:13", &marker, None).await.unwrap();
        kv.put("option:site_id", &marker, None).await.unwrap();

        let keys = kv.keys_with_prefix("failed_order:").await.unwrap();
        assert_eq!(keys, vec!["failed_order:11".to_string(), "failed_order:12".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_expired_only_removes_dead_rows() {
        let kv = store().await;
        let marker = Marker { owner: "x".into() };

        kv.put("dead", &marker, Some(Duration::from_secs(0))).await.unwrap();
        kv.put("alive", &marker, None).await.unwrap();

        let purged = kv.purge_expired().await.unwrap();
        assert_eq!(purged, 1);

        let alive: Option<Marker> = kv.get("alive").await.unwrap();
        assert!(alive.is_some());
    }
}
