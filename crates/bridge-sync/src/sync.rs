//! # Sync Service
//!
//! The reconciliation engine: two independent passes sharing one
//! infrastructure stack.
//!
//! ## The Two Passes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  INVENTORY PASS (cheap, whole site)                                     │
//! │                                                                         │
//! │   paginated remote inventory ──► catalog map (ONE query)               │
//! │                │                        │                               │
//! │                └──── stage stock row updates ──► batched apply          │
//! │                                                                         │
//! │  PRODUCT PASS (expensive, throttled, oldest-stale-first)               │
//! │                                                                         │
//! │   eligible items (synced once + mapped) ──► batches of 50              │
//! │      per item: 300s refresh throttle ─ skip                             │
//! │                fetch remote detail ─ stock / price / title /            │
//! │                image / description ─ storefront writes                  │
//! │                ALWAYS stamp last_synced_at                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A full run is guarded by the [`SyncLock`]; a held lock aborts the run
//! immediately with the holder's description and performs zero writes.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::batch::BatchProcessor;
use crate::client::PosApi;
use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::lock::SyncLock;
use crate::storefront::{Storefront, SyncOutcome};
use bridge_core::{
    reconcile_price, CatalogItem, PriceUpdate, SyncPhase, SyncProgress, SyncSource,
};
use bridge_db::{Database, RowUpdate};

/// KV key holding the live progress snapshot while a run is active.
const PROGRESS_KEY: &str = "sync_progress";

// =============================================================================
// Reports
// =============================================================================

/// Outcome of one inventory pass.
#[derive(Debug, Clone)]
pub struct InventorySyncReport {
    /// Remote inventory entries fetched.
    pub total: usize,
    /// Entries with a live catalog mapping.
    pub matched: usize,
    /// Stock rows whose conditional update landed.
    pub updated: usize,
    pub duration: Duration,
}

/// Outcome of one product pass.
#[derive(Debug, Clone, Default)]
pub struct ProductSyncReport {
    /// Items selected for the pass.
    pub total: usize,
    /// Items where at least one field changed.
    pub updated: usize,
    /// Items skipped by the refresh throttle.
    pub skipped: usize,
    /// Items that errored (fetch or write).
    pub errors: usize,
    pub duration: Duration,
}

/// Outcome of a full lock-guarded run.
#[derive(Debug, Clone)]
pub struct FullSyncReport {
    pub inventory: InventorySyncReport,
    pub products: ProductSyncReport,
}

/// What one product visit did; feeds the aggregate report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemVisit {
    Updated,
    Unchanged,
    Throttled,
}

// =============================================================================
// SyncService
// =============================================================================

/// Reconciles remote POS state with the local mirror and the storefront.
pub struct SyncService {
    db: Database,
    api: Arc<dyn PosApi>,
    storefront: Arc<dyn Storefront>,
    settings: SyncSettings,
    lock: SyncLock,
    batch: BatchProcessor,
}

impl SyncService {
    pub fn new(
        db: Database,
        api: Arc<dyn PosApi>,
        storefront: Arc<dyn Storefront>,
        settings: SyncSettings,
    ) -> Self {
        let lock = SyncLock::new(db.kv());
        let batch = BatchProcessor::new(settings.batch_max_concurrent);
        SyncService {
            db,
            api,
            storefront,
            settings,
            lock,
            batch,
        }
    }

    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }

    // =========================================================================
    // Inventory Pass
    // =========================================================================

    /// Reconciles site stock levels into the local mirror.
    ///
    /// One remote pagination walk, one catalog query, one batched apply.
    /// A fetch failure surfaces before any write is staged.
    pub async fn sync_inventory(&self) -> SyncResult<InventorySyncReport> {
        let started = Instant::now();
        let site_id = self.settings.site_id;

        let levels = self.api.get_inventory(site_id).await?;
        let catalog = self.db.catalog().map_by_remote_id().await?;

        let updates: Vec<RowUpdate> = levels
            .iter()
            .filter_map(|level| {
                catalog.get(&level.id).map(|item| RowUpdate::Stock {
                    catalog_item_id: item.id,
                    site_id,
                    quantity: level.stock,
                })
            })
            .collect();

        let matched = updates.len();
        let updated = self.db.inventory().apply_updates(&updates).await?;

        let report = InventorySyncReport {
            total: levels.len(),
            matched,
            updated,
            duration: started.elapsed(),
        };
        info!(
            site_id,
            total = report.total,
            matched = report.matched,
            updated = report.updated,
            duration_ms = report.duration.as_millis() as u64,
            "Inventory pass complete"
        );
        Ok(report)
    }

    // =========================================================================
    // Product Pass
    // =========================================================================

    /// Visits up to `limit` eligible items, oldest sync first, pushing
    /// remote changes to the storefront. Every visited item gets its
    /// last-sync stamp whether or not anything changed.
    pub async fn sync_products(&self, limit: u32) -> SyncResult<ProductSyncReport> {
        let started = Instant::now();
        let items = self.db.catalog().eligible_for_product_sync(limit).await?;
        let mut report = ProductSyncReport {
            total: items.len(),
            ..ProductSyncReport::default()
        };

        for batch in items.chunks(self.settings.product_batch_size.max(1) as usize) {
            let outcome = self
                .batch
                .process(batch.to_vec(), |item| self.sync_one_product(item))
                .await;

            for visit in &outcome.succeeded {
                match visit {
                    ItemVisit::Updated => report.updated += 1,
                    ItemVisit::Unchanged => {}
                    ItemVisit::Throttled => report.skipped += 1,
                }
            }
            for failure in &outcome.failed {
                warn!(error = %failure.error, "Product visit failed");
                report.errors += 1;
            }
        }

        report.duration = started.elapsed();
        info!(
            total = report.total,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors,
            duration_ms = report.duration.as_millis() as u64,
            "Product pass complete"
        );
        Ok(report)
    }

    /// One product visit. Returns how the visit ended; errors bubble to the
    /// batch outcome without aborting siblings.
    async fn sync_one_product(&self, item: CatalogItem) -> SyncResult<ItemVisit> {
        // Refresh throttle bounds API volume per pass
        if let Some(last) = item.last_synced_at {
            let age = Utc::now() - last;
            if age < ChronoDuration::seconds(self.settings.min_refresh_secs) {
                debug!(item_id = item.id, "Recently refreshed, skipping");
                return Ok(ItemVisit::Throttled);
            }
        }

        let (remote_id, storefront_id) = match (item.remote_item_id, item.storefront_product_id) {
            (Some(remote), Some(storefront)) => (remote, storefront),
            _ => {
                return Err(SyncError::Internal(format!(
                    "item {} selected without full mapping",
                    item.id
                )))
            }
        };

        let remote = self.api.get_product(remote_id).await?;
        let current = self
            .storefront
            .get_product(storefront_id)
            .await?
            .ok_or_else(|| {
                SyncError::Internal(format!("storefront product {storefront_id} missing"))
            })?;

        let mut changed = false;
        let site_id = self.settings.site_id;

        // Stock, when the product is ranged at our site
        if let Some(stock) = remote.site(site_id).and_then(|site| site.stock) {
            self.db
                .inventory()
                .upsert_stock(item.id, site_id, stock)
                .await?;
            if current.stock_quantity != Some(stock) {
                self.storefront.set_stock(storefront_id, stock).await?;
                changed = true;
            }
        }

        // Price, under the global toggle
        if self.settings.sync_prices {
            if let Some(remote_price) = remote.price_at(site_id) {
                self.db
                    .inventory()
                    .upsert_price(item.id, site_id, remote_price)
                    .await?;

                let update = match current.regular_price {
                    Some(regular) => reconcile_price(regular, current.sale_price, remote_price),
                    None => PriceUpdate::SetRegular(remote_price),
                };
                match update {
                    PriceUpdate::SetSale(price) => {
                        self.storefront
                            .set_sale_price(storefront_id, Some(price))
                            .await?;
                        changed = true;
                    }
                    PriceUpdate::SetRegularClearSale(price) => {
                        self.storefront.set_sale_price(storefront_id, None).await?;
                        self.storefront.set_regular_price(storefront_id, price).await?;
                        changed = true;
                    }
                    PriceUpdate::SetRegular(price) => {
                        self.storefront.set_regular_price(storefront_id, price).await?;
                        changed = true;
                    }
                    PriceUpdate::Unchanged => {}
                }
            }
        }

        // Title, under its toggle
        if self.settings.sync_titles && current.title != remote.name {
            self.storefront.set_title(storefront_id, &remote.name).await?;
            changed = true;
        }

        // Delegated hooks; a Skipped outcome is not a failure
        if let Some(image) = &remote.image {
            match self
                .storefront
                .sync_image(storefront_id, image, self.settings.overwrite_images)
                .await?
            {
                SyncOutcome::Updated => changed = true,
                SyncOutcome::Skipped => {}
                SyncOutcome::Failed(reason) => {
                    warn!(item_id = item.id, reason, "Image sync hook failed");
                }
            }
        }
        if let Some(description) = &remote.description {
            match self
                .storefront
                .sync_description(
                    storefront_id,
                    description,
                    self.settings.overwrite_descriptions,
                )
                .await?
            {
                SyncOutcome::Updated => changed = true,
                SyncOutcome::Skipped => {}
                SyncOutcome::Failed(reason) => {
                    warn!(item_id = item.id, reason, "Description sync hook failed");
                }
            }
        }

        // Stamped unconditionally so oldest-first rotates the catalog
        self.db.catalog().touch_synced(item.id, Utc::now()).await?;

        Ok(if changed {
            ItemVisit::Updated
        } else {
            ItemVisit::Unchanged
        })
    }

    // =========================================================================
    // Full Run
    // =========================================================================

    /// Lock-guarded inventory-then-product run. A held lock aborts before
    /// any read or write; the lock is always released afterwards, success
    /// or error.
    pub async fn run_full(
        &self,
        source: SyncSource,
        user_id: Option<i64>,
    ) -> SyncResult<FullSyncReport> {
        let guard = self.lock.acquire(source, user_id).await?;

        let result = self.run_phases().await;

        // Progress row and lock must go even when a phase failed
        if let Err(err) = self.db.kv().delete(PROGRESS_KEY).await {
            warn!(error = %err, "Failed to clear sync progress");
        }
        guard.release().await?;

        result
    }

    async fn run_phases(&self) -> SyncResult<FullSyncReport> {
        let started_at = Utc::now();
        self.publish_progress(SyncPhase::Inventory, started_at, None)
            .await;

        let inventory = self.sync_inventory().await?;

        self.publish_progress(SyncPhase::Products, started_at, Some(&inventory))
            .await;
        let products = self.sync_products(self.settings.product_sync_limit).await?;

        Ok(FullSyncReport { inventory, products })
    }

    /// Best-effort progress snapshot for pollers; never fails the run.
    async fn publish_progress(
        &self,
        phase: SyncPhase,
        started_at: chrono::DateTime<Utc>,
        inventory: Option<&InventorySyncReport>,
    ) {
        let progress = SyncProgress {
            active: true,
            phase,
            total: inventory.map(|r| r.total as u64).unwrap_or(0),
            processed: inventory.map(|r| r.matched as u64).unwrap_or(0),
            updated: inventory.map(|r| r.updated as u64).unwrap_or(0),
            skipped: 0,
            errors: 0,
            started_at,
        };
        // Same TTL as the lock: a killed process leaves neither a stuck
        // lock nor a stale "active" snapshot
        if let Err(err) = self
            .db
            .kv()
            .put(PROGRESS_KEY, &progress, Some(crate::lock::LOCK_TTL))
            .await
        {
            warn!(error = %err, "Failed to publish sync progress");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PosApi;
    use crate::remote::{
        NewCustomer, NewOrder, RemoteCategory, RemoteCustomer, RemoteInventoryLevel,
        RemoteOrderSummary, RemoteProduct, RemoteProductSite, RemoteSite,
    };
    use crate::storefront::{InMemoryStorefront, StorefrontProduct};
    use async_trait::async_trait;
    use bridge_core::{Money, SyncSource};
    use bridge_db::{DbConfig, ImportedItem};
    use chrono::DateTime;
    use std::collections::HashMap;

    /// Canned [`PosApi`] for service tests.
    #[derive(Default)]
    struct FakeApi {
        inventory: Vec<RemoteInventoryLevel>,
        products: HashMap<i64, RemoteProduct>,
    }

    #[async_trait]
    impl PosApi for FakeApi {
        async fn get_sites(&self) -> SyncResult<Vec<RemoteSite>> {
            Ok(vec![])
        }
        async fn get_inventory(&self, _site_id: i64) -> SyncResult<Vec<RemoteInventoryLevel>> {
            Ok(self.inventory.clone())
        }
        async fn get_product(&self, product_id: i64) -> SyncResult<RemoteProduct> {
            self.products.get(&product_id).cloned().ok_or(SyncError::ApiStatus {
                status: 404,
                body: "no such product".to_string(),
            })
        }
        async fn get_categories(&self) -> SyncResult<Vec<RemoteCategory>> {
            Ok(vec![])
        }
        async fn find_customer_by_email(
            &self,
            _email: &str,
        ) -> SyncResult<Option<RemoteCustomer>> {
            Ok(None)
        }
        async fn find_customer_by_name(
            &self,
            _first_name: &str,
            _last_name: &str,
            _phone: Option<&str>,
        ) -> SyncResult<Option<RemoteCustomer>> {
            Ok(None)
        }
        async fn create_customer(&self, _customer: &NewCustomer) -> SyncResult<RemoteCustomer> {
            Err(SyncError::Internal("not used".to_string()))
        }
        async fn create_order(
            &self,
            _order: &NewOrder,
        ) -> SyncResult<Option<RemoteOrderSummary>> {
            Err(SyncError::Internal("not used".to_string()))
        }
        async fn search_orders(
            &self,
            _created_since: DateTime<Utc>,
        ) -> SyncResult<Vec<RemoteOrderSummary>> {
            Ok(vec![])
        }
    }

    fn remote_product(id: i64, name: &str, price: f64) -> RemoteProduct {
        RemoteProduct {
            id,
            name: name.to_string(),
            description: None,
            code: Some(format!("SKU-{id}")),
            unit_price: Some(price),
            tags: vec![],
            image: None,
            sites: vec![RemoteProductSite {
                site_id: 4,
                stock: Some(10.0),
                unit_price: None,
            }],
        }
    }

    fn storefront_product(
        id: i64,
        regular_cents: i64,
        sale_cents: Option<i64>,
    ) -> StorefrontProduct {
        StorefrontProduct {
            id,
            sku: format!("SKU-{id}"),
            title: "Widget".to_string(),
            regular_price: Some(Money::from_cents(regular_cents)),
            sale_price: sale_cents.map(Money::from_cents),
            stock_quantity: Some(10.0),
            description: None,
            has_image: false,
        }
    }

    async fn service_with(
        api: FakeApi,
        storefront: InMemoryStorefront,
    ) -> (SyncService, Arc<InMemoryStorefront>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let storefront = Arc::new(storefront);
        let settings = SyncSettings {
            site_id: 4,
            ..SyncSettings::default()
        };
        let service = SyncService::new(db, Arc::new(api), storefront.clone(), settings);
        (service, storefront)
    }

    /// Import an item, map it, and mark it synced long enough ago to be
    /// past the refresh throttle.
    async fn seed_item(service: &SyncService, remote_id: i64, storefront_id: i64) -> i64 {
        let item = service
            .db
            .catalog()
            .upsert_from_import(&ImportedItem {
                remote_item_id: remote_id,
                sku: format!("SKU-{remote_id}"),
                name: "Widget".to_string(),
                description: None,
                tags: vec![],
            })
            .await
            .unwrap();
        service
            .db
            .catalog()
            .set_storefront_product(item.id, Some(storefront_id))
            .await
            .unwrap();
        service
            .db
            .catalog()
            .touch_synced(item.id, Utc::now() - ChronoDuration::hours(1))
            .await
            .unwrap();
        item.id
    }

    #[tokio::test]
    async fn test_inventory_pass_updates_only_mapped_rows() {
        let api = FakeApi {
            inventory: vec![
                RemoteInventoryLevel { id: 100, stock: 7.0 },
                RemoteInventoryLevel { id: 999, stock: 3.0 }, // no mapping
            ],
            ..FakeApi::default()
        };
        let (service, _) = service_with(api, InMemoryStorefront::new()).await;

        let item_id = seed_item(&service, 100, 50).await;
        service
            .db
            .inventory()
            .upsert_stock(item_id, 4, 1.0)
            .await
            .unwrap();

        let report = service.sync_inventory().await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.matched, 1);
        assert_eq!(report.updated, 1);

        let stock = service
            .db
            .inventory()
            .stock_for(item_id, 4)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stock.quantity, 7.0);
    }

    #[tokio::test]
    async fn test_remote_below_sale_adjusts_only_sale_price() {
        // Regular 100.00, sale 80.00, remote 70.00
        let mut api = FakeApi::default();
        api.products.insert(100, remote_product(100, "Widget", 70.0));
        let storefront =
            InMemoryStorefront::new().with_product(storefront_product(50, 10_000, Some(8_000)));
        let (service, store) = service_with(api, storefront).await;
        seed_item(&service, 100, 50).await;

        let report = service.sync_products(10).await.unwrap();
        assert_eq!(report.updated, 1);

        let product = store.get_product(50).await.unwrap().unwrap();
        assert_eq!(product.sale_price, Some(Money::from_cents(7_000)));
        assert_eq!(product.regular_price, Some(Money::from_cents(10_000)));
    }

    #[tokio::test]
    async fn test_remote_above_sale_clears_sale_and_sets_regular() {
        // Regular 100.00, sale 80.00, remote 90.00
        let mut api = FakeApi::default();
        api.products.insert(100, remote_product(100, "Widget", 90.0));
        let storefront =
            InMemoryStorefront::new().with_product(storefront_product(50, 10_000, Some(8_000)));
        let (service, store) = service_with(api, storefront).await;
        seed_item(&service, 100, 50).await;

        service.sync_products(10).await.unwrap();

        let product = store.get_product(50).await.unwrap().unwrap();
        assert_eq!(product.sale_price, None);
        assert_eq!(product.regular_price, Some(Money::from_cents(9_000)));
    }

    #[tokio::test]
    async fn test_remote_equal_regular_no_sale_touches_nothing() {
        // Regular 100.00, no sale, remote 100.00
        let mut api = FakeApi::default();
        api.products.insert(100, remote_product(100, "Widget", 100.0));
        let storefront =
            InMemoryStorefront::new().with_product(storefront_product(50, 10_000, None));
        let (service, store) = service_with(api, storefront).await;
        seed_item(&service, 100, 50).await;

        let report = service.sync_products(10).await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.errors, 0);

        let product = store.get_product(50).await.unwrap().unwrap();
        assert_eq!(product.regular_price, Some(Money::from_cents(10_000)));
        assert_eq!(product.sale_price, None);
    }

    #[tokio::test]
    async fn test_second_pass_is_throttled_and_stamps_once_per_pass() {
        let mut api = FakeApi::default();
        api.products.insert(100, remote_product(100, "Widget", 100.0));
        api.products.insert(101, remote_product(101, "Gadget", 50.0));
        let storefront = InMemoryStorefront::new()
            .with_product(storefront_product(50, 10_000, None))
            .with_product(storefront_product(51, 5_000, None));
        let (service, _) = service_with(api, storefront).await;
        let a = seed_item(&service, 100, 50).await;
        let b = seed_item(&service, 101, 51).await;

        let first = service.sync_products(10).await.unwrap();
        assert_eq!(first.total, 2);
        assert_eq!(first.skipped, 0);

        let stamp_a = service.db.catalog().get_by_id(a).await.unwrap().unwrap().last_synced_at;
        let stamp_b = service.db.catalog().get_by_id(b).await.unwrap().unwrap().last_synced_at;

        // Immediate second pass: every item inside the refresh window
        let second = service.sync_products(10).await.unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(second.skipped, 2);

        let after_a = service.db.catalog().get_by_id(a).await.unwrap().unwrap().last_synced_at;
        let after_b = service.db.catalog().get_by_id(b).await.unwrap().unwrap().last_synced_at;
        assert_eq!(stamp_a, after_a);
        assert_eq!(stamp_b, after_b);
    }

    #[tokio::test]
    async fn test_full_run_visits_beyond_one_batch() {
        let mut api = FakeApi::default();
        let mut storefront = InMemoryStorefront::new();
        for n in 0..5 {
            api.products
                .insert(100 + n, remote_product(100 + n, "Widget", 10.0));
            storefront = storefront.with_product(storefront_product(50 + n, 1_000, None));
        }
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let storefront = Arc::new(storefront);
        let settings = SyncSettings {
            site_id: 4,
            product_batch_size: 2,
            product_sync_limit: 5,
            ..SyncSettings::default()
        };
        let service = SyncService::new(db, Arc::new(api), storefront, settings);
        for n in 0..5 {
            seed_item(&service, 100 + n, 50 + n).await;
        }

        // The per-run selection limit, not the chunk size, bounds the pass
        let report = service.run_full(SyncSource::Manual, None).await.unwrap();
        assert_eq!(report.products.total, 5);
        assert_eq!(report.products.skipped, 0);
        assert_eq!(report.products.errors, 0);
    }

    #[tokio::test]
    async fn test_progress_snapshot_expires_with_the_lock() {
        let (service, _) = service_with(FakeApi::default(), InMemoryStorefront::new()).await;

        let started_at = Utc::now();
        service
            .publish_progress(SyncPhase::Inventory, started_at, None)
            .await;

        // The snapshot must self-expire like the lock does, so a killed
        // process never leaves a permanent "active" row behind
        let expires_at: Option<i64> =
            sqlx::query_scalar("SELECT expires_at FROM kv_store WHERE key = ?1")
                .bind(PROGRESS_KEY)
                .fetch_one(service.db.pool())
                .await
                .unwrap();
        let expires_at = expires_at.expect("progress snapshot has no expiry");
        let now = Utc::now().timestamp();
        assert!(expires_at > now);
        assert!(expires_at <= now + crate::lock::LOCK_TTL.as_secs() as i64 + 1);
    }

    #[tokio::test]
    async fn test_held_lock_aborts_run_with_zero_writes() {
        let mut api = FakeApi::default();
        api.inventory = vec![RemoteInventoryLevel { id: 100, stock: 9.0 }];
        api.products.insert(100, remote_product(100, "Widget", 20.0));
        let storefront =
            InMemoryStorefront::new().with_product(storefront_product(50, 1_000, None));
        let (service, store) = service_with(api, storefront).await;
        seed_item(&service, 100, 50).await;

        let guard = service
            .lock()
            .acquire(SyncSource::Manual, Some(1))
            .await
            .unwrap();

        let denied = service.run_full(SyncSource::Scheduled, None).await;
        assert!(matches!(denied, Err(SyncError::SyncAlreadyRunning { .. })));
        assert_eq!(store.write_count(), 0);

        guard.release().await.unwrap();
        let report = service.run_full(SyncSource::Manual, Some(1)).await.unwrap();
        assert_eq!(report.inventory.matched, 1);
        // Lock released after the run
        assert!(service.lock().holder().await.unwrap().is_none());
    }
}
