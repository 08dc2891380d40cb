//! # Catalog Repository
//!
//! Database operations for the local catalog mirror.
//!
//! ## Key Operations
//! - Import upserts keyed by remote item id
//! - The one-query remote-id map that keeps inventory sync at O(1) lookups
//! - Oldest-stale-first selection for the product sync pass
//!
//! ## The Remote-Id Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Legacy per-item lookup vs. map lookup                      │
//! │                                                                         │
//! │  ❌ N queries: for each remote entry → SELECT ... WHERE remote_id = ?  │
//! │  ✅ 1 query:   SELECT all live rows → HashMap<remote_item_id, row>     │
//! │                                                                         │
//! │  With a 10k-item catalog the map turns an inventory pass from          │
//! │  10k round trips into one.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult};
use bridge_core::CatalogItem;

/// Columns selected for every CatalogItem read; keep in sync with the struct.
const ITEM_COLUMNS: &str = "id, remote_item_id, sku, name, description, tags, \
     storefront_product_id, last_imported_at, last_synced_at, is_synced, is_deleted";

/// Input record for a catalog import upsert.
#[derive(Debug, Clone)]
pub struct ImportedItem {
    pub remote_item_id: i64,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Repository for catalog item operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets a catalog item by its local id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Gets a live catalog item by its remote item id.
    pub async fn get_by_remote_id(&self, remote_item_id: i64) -> DbResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items \
             WHERE remote_item_id = ?1 AND is_deleted = 0"
        ))
        .bind(remote_item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Gets a live catalog item by its storefront product mapping.
    pub async fn get_by_storefront_product(
        &self,
        storefront_product_id: i64,
    ) -> DbResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items \
             WHERE storefront_product_id = ?1 AND is_deleted = 0"
        ))
        .bind(storefront_product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Creates or refreshes a catalog item from a remote import record.
    ///
    /// The remote item id is the upsert key; an existing live row is updated
    /// in place, otherwise a new row is inserted with `last_imported_at = now`.
    pub async fn upsert_from_import(&self, import: &ImportedItem) -> DbResult<CatalogItem> {
        let now = Utc::now();
        let tags = CatalogItem::encode_tags(&import.tags);

        match self.get_by_remote_id(import.remote_item_id).await? {
            Some(existing) => {
                sqlx::query(
                    "UPDATE catalog_items SET \
                         sku = ?2, name = ?3, description = ?4, tags = ?5, \
                         last_imported_at = ?6 \
                     WHERE id = ?1",
                )
                .bind(existing.id)
                .bind(&import.sku)
                .bind(&import.name)
                .bind(&import.description)
                .bind(&tags)
                .bind(now)
                .execute(&self.pool)
                .await?;

                debug!(id = existing.id, remote_item_id = import.remote_item_id, "Refreshed catalog item");
                self.get_by_id(existing.id)
                    .await?
                    .ok_or_else(|| DbError::not_found("CatalogItem", existing.id.to_string()))
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO catalog_items \
                         (remote_item_id, sku, name, description, tags, last_imported_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .bind(import.remote_item_id)
                .bind(&import.sku)
                .bind(&import.name)
                .bind(&import.description)
                .bind(&tags)
                .bind(now)
                .execute(&self.pool)
                .await?;

                let id = result.last_insert_rowid();
                debug!(id, remote_item_id = import.remote_item_id, "Imported catalog item");
                self.get_by_id(id)
                    .await?
                    .ok_or_else(|| DbError::not_found("CatalogItem", id.to_string()))
            }
        }
    }

    /// Loads all live, remote-mapped items into a map keyed by remote item id.
    ///
    /// One query, not N. Inventory reconciliation resolves every remote entry
    /// against this map instead of re-querying per item.
    pub async fn map_by_remote_id(&self) -> DbResult<HashMap<i64, CatalogItem>> {
        let items = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items \
             WHERE is_deleted = 0 AND remote_item_id IS NOT NULL"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(items
            .into_iter()
            .filter_map(|item| item.remote_item_id.map(|rid| (rid, item)))
            .collect())
    }

    /// Selects items eligible for the product sync pass: synced at least
    /// once, mapped to a storefront product, oldest sync timestamp first.
    pub async fn eligible_for_product_sync(&self, limit: u32) -> DbResult<Vec<CatalogItem>> {
        let items = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items \
             WHERE is_deleted = 0 \
               AND is_synced = 1 \
               AND storefront_product_id IS NOT NULL \
             ORDER BY last_synced_at ASC \
             LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Stamps the last-sync timestamp and the synced flag.
    ///
    /// Called unconditionally on every sync visit, whether or not any field
    /// changed; the stamp is what rotates oldest-first ordering through the
    /// whole catalog.
    pub async fn touch_synced(&self, id: i64, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE catalog_items SET last_synced_at = ?2, is_synced = 1 WHERE id = ?1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CatalogItem", id.to_string()));
        }
        Ok(())
    }

    /// Maps (or unmaps) an item to a storefront product.
    pub async fn set_storefront_product(
        &self,
        id: i64,
        storefront_product_id: Option<i64>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE catalog_items SET storefront_product_id = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(storefront_product_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CatalogItem", id.to_string()));
        }
        Ok(())
    }

    /// Soft-deletes an item, freeing its remote id for re-import.
    pub async fn soft_delete(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE catalog_items SET is_deleted = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CatalogItem", id.to_string()));
        }
        Ok(())
    }

    /// Removes empty/invalid records (no SKU, no remote mapping). This is the
    /// only hard-delete path.
    pub async fn cleanup_empty(&self) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM catalog_items WHERE sku = '' AND remote_item_id IS NULL",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Counts live catalog items.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items WHERE is_deleted = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
