//! # Inventory Repository
//!
//! Per-site stock levels and prices for catalog items, plus the batched
//! write paths the sync passes lean on.
//!
//! ## Batched Writes
//! Reconciliation produces row updates in bulk. `apply_updates` runs them
//! as conditional per-row UPDATEs and reports how many actually landed;
//! rows that vanished mid-pass simply count as zero rather than failing
//! the whole batch.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::DbResult;
use bridge_core::{ItemPrice, ItemShopStock, Money};

/// A pending write against a stock or price row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowUpdate {
    Stock {
        catalog_item_id: i64,
        site_id: i64,
        quantity: f64,
    },
    Price {
        catalog_item_id: i64,
        site_id: i64,
        amount: Money,
    },
}

/// New stock level row for bulk insertion.
#[derive(Debug, Clone)]
pub struct NewStockLevel {
    pub catalog_item_id: i64,
    pub site_id: i64,
    pub quantity: f64,
}

/// New price row for bulk insertion.
#[derive(Debug, Clone)]
pub struct NewPrice {
    pub catalog_item_id: i64,
    pub site_id: i64,
    pub amount: Money,
}

/// Repository for per-site stock and price rows.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    // =========================================================================
    // Single-row reads and upserts
    // =========================================================================

    /// Gets the stock row for an item at a site.
    pub async fn stock_for(
        &self,
        catalog_item_id: i64,
        site_id: i64,
    ) -> DbResult<Option<ItemShopStock>> {
        let row = sqlx::query_as::<_, ItemShopStock>(
            "SELECT id, catalog_item_id, site_id, quantity, updated_at \
             FROM item_shop_stocks WHERE catalog_item_id = ?1 AND site_id = ?2",
        )
        .bind(catalog_item_id)
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Gets the price row for an item at a site.
    pub async fn price_for(
        &self,
        catalog_item_id: i64,
        site_id: i64,
    ) -> DbResult<Option<ItemPrice>> {
        let row = sqlx::query_as::<_, ItemPrice>(
            "SELECT id, catalog_item_id, site_id, amount_cents, updated_at \
             FROM item_prices WHERE catalog_item_id = ?1 AND site_id = ?2",
        )
        .bind(catalog_item_id)
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Creates or replaces the stock row for an item at a site.
    pub async fn upsert_stock(
        &self,
        catalog_item_id: i64,
        site_id: i64,
        quantity: f64,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO item_shop_stocks (catalog_item_id, site_id, quantity, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(catalog_item_id, site_id) \
             DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at",
        )
        .bind(catalog_item_id)
        .bind(site_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Creates or replaces the price row for an item at a site.
    pub async fn upsert_price(
        &self,
        catalog_item_id: i64,
        site_id: i64,
        amount: Money,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO item_prices (catalog_item_id, site_id, amount_cents, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(catalog_item_id, site_id) \
             DO UPDATE SET amount_cents = excluded.amount_cents, updated_at = excluded.updated_at",
        )
        .bind(catalog_item_id)
        .bind(site_id)
        .bind(amount.cents())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Batched writes
    // =========================================================================

    /// Applies a batch of row updates as conditional UPDATEs.
    ///
    /// Returns the number of updates that matched an existing row. Updates
    /// never create rows; rows are created at import time, so a miss here
    /// means the target disappeared and is skipped.
    pub async fn apply_updates(&self, updates: &[RowUpdate]) -> DbResult<usize> {
        let mut applied = 0usize;

        for update in updates {
            let result = match update {
                RowUpdate::Stock {
                    catalog_item_id,
                    site_id,
                    quantity,
                } => {
                    sqlx::query(
                        "UPDATE item_shop_stocks \
                         SET quantity = ?3, updated_at = ?4 \
                         WHERE catalog_item_id = ?1 AND site_id = ?2",
                    )
                    .bind(catalog_item_id)
                    .bind(site_id)
                    .bind(quantity)
                    .bind(Utc::now())
                    .execute(&self.pool)
                    .await
                }
                RowUpdate::Price {
                    catalog_item_id,
                    site_id,
                    amount,
                } => {
                    sqlx::query(
                        "UPDATE item_prices \
                         SET amount_cents = ?3, updated_at = ?4 \
                         WHERE catalog_item_id = ?1 AND site_id = ?2",
                    )
                    .bind(catalog_item_id)
                    .bind(site_id)
                    .bind(amount.cents())
                    .bind(Utc::now())
                    .execute(&self.pool)
                    .await
                }
            };

            match result {
                Ok(r) if r.rows_affected() > 0 => applied += 1,
                Ok(_) => {
                    debug!(?update, "Row update matched no row, skipping");
                }
                Err(e) => {
                    warn!(?update, error = %e, "Row update failed, skipping");
                }
            }
        }

        Ok(applied)
    }

    /// Inserts new stock rows one by one, counting successes. Conflicting
    /// rows (already present for that item/site) are skipped.
    pub async fn insert_stock_levels(&self, rows: &[NewStockLevel]) -> DbResult<usize> {
        let mut inserted = 0usize;

        for row in rows {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO item_shop_stocks \
                     (catalog_item_id, site_id, quantity, updated_at) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(row.catalog_item_id)
            .bind(row.site_id)
            .bind(row.quantity)
            .bind(Utc::now())
            .execute(&self.pool)
            .await;

            match result {
                Ok(r) if r.rows_affected() > 0 => inserted += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        catalog_item_id = row.catalog_item_id,
                        site_id = row.site_id,
                        error = %e,
                        "Stock insert failed, skipping"
                    );
                }
            }
        }

        Ok(inserted)
    }

    /// Inserts new price rows one by one, counting successes.
    pub async fn insert_prices(&self, rows: &[NewPrice]) -> DbResult<usize> {
        let mut inserted = 0usize;

        for row in rows {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO item_prices \
                     (catalog_item_id, site_id, amount_cents, updated_at) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(row.catalog_item_id)
            .bind(row.site_id)
            .bind(row.amount.cents())
            .bind(Utc::now())
            .execute(&self.pool)
            .await;

            match result {
                Ok(r) if r.rows_affected() > 0 => inserted += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        catalog_item_id = row.catalog_item_id,
                        site_id = row.site_id,
                        error = %e,
                        "Price insert failed, skipping"
                    );
                }
            }
        }

        Ok(inserted)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::catalog::ImportedItem;

    async fn seeded() -> (Database, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let item = db
            .catalog()
            .upsert_from_import(&ImportedItem {
                remote_item_id: 1,
                sku: "SKU-A".to_string(),
                name: "Item A".to_string(),
                description: None,
                tags: vec![],
            })
            .await
            .unwrap();
        (db, item.id)
    }

    #[tokio::test]
    async fn test_stock_upsert_and_read_back() {
        let (db, item_id) = seeded().await;
        let inv = db.inventory();

        inv.upsert_stock(item_id, 4, 12.0).await.unwrap();
        inv.upsert_stock(item_id, 4, 7.5).await.unwrap();

        let stock = inv.stock_for(item_id, 4).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 7.5);
    }

    #[tokio::test]
    async fn test_apply_updates_counts_only_matched_rows() {
        let (db, item_id) = seeded().await;
        let inv = db.inventory();

        inv.upsert_stock(item_id, 4, 1.0).await.unwrap();
        inv.upsert_price(item_id, 4, Money::from_cents(1099)).await.unwrap();

        let applied = inv
            .apply_updates(&[
                RowUpdate::Stock {
                    catalog_item_id: item_id,
                    site_id: 4,
                    quantity: 3.0,
                },
                RowUpdate::Price {
                    catalog_item_id: item_id,
                    site_id: 4,
                    amount: Money::from_cents(1299),
                },
                // No row exists for site 99; counts as a miss, not an error
                RowUpdate::Stock {
                    catalog_item_id: item_id,
                    site_id: 99,
                    quantity: 5.0,
                },
            ])
            .await
            .unwrap();

        assert_eq!(applied, 2);
        let stock = inv.stock_for(item_id, 4).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 3.0);
        let price = inv.price_for(item_id, 4).await.unwrap().unwrap();
        assert_eq!(price.amount(), Money::from_cents(1299));
        assert!(inv.stock_for(item_id, 99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bulk_insert_skips_existing_rows() {
        let (db, item_id) = seeded().await;
        let inv = db.inventory();

        inv.upsert_stock(item_id, 4, 1.0).await.unwrap();

        let inserted = inv
            .insert_stock_levels(&[
                NewStockLevel {
                    catalog_item_id: item_id,
                    site_id: 4,
                    quantity: 9.0,
                },
                NewStockLevel {
                    catalog_item_id: item_id,
                    site_id: 5,
                    quantity: 2.0,
                },
            ])
            .await
            .unwrap();

        // Existing (item, site 4) row is untouched
        assert_eq!(inserted, 1);
        assert_eq!(inv.stock_for(item_id, 4).await.unwrap().unwrap().quantity, 1.0);
        assert_eq!(inv.stock_for(item_id, 5).await.unwrap().unwrap().quantity, 2.0);
    }
}
