//! # Domain Types
//!
//! Core domain types for the Kounta Bridge.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Domain Types                                   │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐      │
//! │  │   CatalogItem    │  │  ItemShopStock   │  │    ItemPrice     │      │
//! │  │  ──────────────  │  │  ──────────────  │  │  ──────────────  │      │
//! │  │  id (local PK)   │  │  catalog_item_id │  │  catalog_item_id │      │
//! │  │  remote_item_id  │  │  site_id         │  │  site_id         │      │
//! │  │  storefront_     │  │  quantity        │  │  amount_cents    │      │
//! │  │    product_id    │  │                  │  │                  │      │
//! │  └──────────────────┘  └──────────────────┘  └──────────────────┘      │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐      │
//! │  │   SyncLockInfo   │  │ FailedOrderEntry │  │   SyncProgress   │      │
//! │  │  mutual exclusion│  │  durable queue   │  │  polling snapshot│      │
//! │  └──────────────────┘  └──────────────────┘  └──────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! A catalog item carries three identities:
//! - `id`: local primary key, used for foreign keys
//! - `remote_item_id`: the Kounta product id (unique among live rows)
//! - `storefront_product_id`: the storefront product, `None` until mapped

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Catalog Item
// =============================================================================

/// Local mirror row for one remote Kounta product.
///
/// Created on catalog import, mutated on every sync pass. Never hard-deleted
/// except via explicit cleanup of empty/invalid records; `is_deleted` marks
/// rows excluded from the remote-id uniqueness invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CatalogItem {
    /// Local primary key.
    pub id: i64,

    /// Remote Kounta product id. Unique among non-deleted rows.
    pub remote_item_id: Option<i64>,

    /// Stock Keeping Unit as reported by the remote catalog.
    pub sku: String,

    /// Product name.
    pub name: String,

    /// Optional long description.
    pub description: Option<String>,

    /// Tags/categories, serialized as a JSON array of strings.
    pub tags: String,

    /// Storefront product id. `None` means "not yet mapped".
    pub storefront_product_id: Option<i64>,

    /// When this row was created/refreshed by catalog import.
    pub last_imported_at: DateTime<Utc>,

    /// When the sync service last visited this row. Stamped unconditionally
    /// on every visit so oldest-first ordering rotates through the catalog.
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Whether this row has completed at least one sync pass.
    pub is_synced: bool,

    /// Soft-delete marker.
    pub is_deleted: bool,
}

impl CatalogItem {
    /// Whether this item is mapped to a storefront product.
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.storefront_product_id.is_some()
    }

    /// Deserializes the tag set.
    pub fn tag_set(&self) -> Result<Vec<String>, CoreError> {
        serde_json::from_str(&self.tags)
            .map_err(|e| CoreError::InvalidTags { item_id: self.id, detail: e.to_string() })
    }

    /// Serializes a tag set into the stored representation.
    pub fn encode_tags(tags: &[String]) -> String {
        // Vec<String> never fails to serialize
        serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
    }

    /// An empty/invalid record has neither a SKU nor a remote mapping; these
    /// are the only rows the explicit cleanup pass removes.
    pub fn is_empty_record(&self) -> bool {
        self.sku.is_empty() && self.remote_item_id.is_none()
    }
}

// =============================================================================
// Inventory Rows
// =============================================================================

/// Per-site quantity on hand for one catalog item.
///
/// At most one row per (catalog_item_id, site_id) pair. Quantities are f64
/// because the remote reports fractional stock for weighed goods.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ItemShopStock {
    pub id: i64,
    pub catalog_item_id: i64,
    pub site_id: i64,
    pub quantity: f64,
    pub updated_at: DateTime<Utc>,
}

/// Per-site price for one catalog item, in cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ItemPrice {
    pub id: i64,
    pub catalog_item_id: i64,
    pub site_id: i64,
    pub amount_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl ItemPrice {
    /// Returns the price as a Money value.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Price Reconciliation
// =============================================================================

/// Outcome of reconciling the storefront price pair with a remote price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceUpdate {
    /// A sale is running and the remote price undercuts it: move only the
    /// sale price, leave the regular price alone.
    SetSale(Money),

    /// The remote price caught up with the sale: clear the sale price and
    /// set the regular price to the remote amount.
    SetRegularClearSale(Money),

    /// No sale price involved: set the regular price.
    SetRegular(Money),

    /// Prices already agree; skip the write.
    Unchanged,
}

/// Decides how a remote price lands on the storefront price pair.
///
/// ## Rules
/// ```text
/// sale present, remote < sale   → SetSale(remote)
/// sale present, remote >= sale  → SetRegularClearSale(remote)
/// no sale, remote != regular    → SetRegular(remote)
/// no sale, remote == regular    → Unchanged
/// ```
///
/// All comparisons are exact integer cents; a remote price that survives the
/// round trip unchanged never triggers a write.
pub fn reconcile_price(regular: Money, sale: Option<Money>, remote: Money) -> PriceUpdate {
    match sale {
        Some(sale_price) => {
            if remote == sale_price && remote < regular {
                PriceUpdate::Unchanged
            } else if remote < sale_price {
                PriceUpdate::SetSale(remote)
            } else {
                PriceUpdate::SetRegularClearSale(remote)
            }
        }
        None => {
            if remote == regular {
                PriceUpdate::Unchanged
            } else {
                PriceUpdate::SetRegular(remote)
            }
        }
    }
}

// =============================================================================
// Sync Lock
// =============================================================================

/// Where a sync run was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    /// Triggered by an operator.
    Manual,
    /// Triggered by the recurring scheduler.
    Scheduled,
}

impl std::fmt::Display for SyncSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncSource::Manual => write!(f, "manual"),
            SyncSource::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Mutual-exclusion marker preventing concurrent full-catalog sync runs.
///
/// Persisted with a bounded TTL; treated as expired/absent after the TTL
/// regardless of explicit deletion, so a crashed process cannot wedge sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLockInfo {
    pub started_at: DateTime<Utc>,
    pub source: SyncSource,
    pub user_id: Option<i64>,
}

// =============================================================================
// Failed Order Queue
// =============================================================================

/// Durable record of an order upload that exhausted its retries.
///
/// Keyed by storefront order id. Created on first exhaustion, incremented on
/// repeat failure, removed on successful retry or explicit clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedOrderEntry {
    pub order_id: i64,
    pub error_kind: String,
    pub error_detail: String,
    pub failed_at: DateTime<Utc>,
    pub retry_count: u32,
}

// =============================================================================
// Sync Progress
// =============================================================================

/// Phase of a running sync, for progress polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Inventory,
    Products,
}

/// Ephemeral snapshot published during a running sync; absent when idle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProgress {
    pub active: bool,
    pub phase: SyncPhase,
    pub total: u64,
    pub processed: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn m(cents: i64) -> Money {
        Money::from_cents(cents)
    }

    #[test]
    fn test_sale_price_undercut_moves_sale_only() {
        // Regular 100.00, sale 80.00, remote 70.00 → only sale moves
        let update = reconcile_price(m(10000), Some(m(8000)), m(7000));
        assert_eq!(update, PriceUpdate::SetSale(m(7000)));
    }

    #[test]
    fn test_remote_catching_sale_clears_it() {
        // Regular 100.00, sale 80.00, remote 90.00 → sale cleared, regular 90
        let update = reconcile_price(m(10000), Some(m(8000)), m(9000));
        assert_eq!(update, PriceUpdate::SetRegularClearSale(m(9000)));
    }

    #[test]
    fn test_no_sale_sets_regular() {
        let update = reconcile_price(m(9500), None, m(10000));
        assert_eq!(update, PriceUpdate::SetRegular(m(10000)));
    }

    #[test]
    fn test_equal_prices_skip_the_write() {
        assert_eq!(reconcile_price(m(10000), None, m(10000)), PriceUpdate::Unchanged);
        // Sale already at the remote amount and still a genuine discount
        assert_eq!(
            reconcile_price(m(10000), Some(m(7000)), m(7000)),
            PriceUpdate::Unchanged,
        );
    }

    #[test]
    fn test_remote_equal_to_sale_but_not_discounted_clears() {
        // Sale equals regular: no real discount, remote at that amount
        // collapses the pair back to a plain regular price.
        let update = reconcile_price(m(8000), Some(m(8000)), m(8000));
        assert_eq!(update, PriceUpdate::SetRegularClearSale(m(8000)));
    }

    #[test]
    fn test_tag_round_trip() {
        let tags = vec!["coffee".to_string(), "beans".to_string()];
        let item = CatalogItem {
            id: 1,
            remote_item_id: Some(42),
            sku: "SKU-1".into(),
            name: "Espresso Beans".into(),
            description: None,
            tags: CatalogItem::encode_tags(&tags),
            storefront_product_id: Some(7),
            last_imported_at: Utc::now(),
            last_synced_at: None,
            is_synced: false,
            is_deleted: false,
        };
        assert_eq!(item.tag_set().unwrap(), tags);
        assert!(item.is_mapped());
        assert!(!item.is_empty_record());
    }

    #[test]
    fn test_empty_record_detection() {
        let item = CatalogItem {
            id: 2,
            remote_item_id: None,
            sku: String::new(),
            name: String::new(),
            description: None,
            tags: "[]".into(),
            storefront_product_id: None,
            last_imported_at: Utc::now(),
            last_synced_at: None,
            is_synced: false,
            is_deleted: false,
        };
        assert!(item.is_empty_record());
    }
}
