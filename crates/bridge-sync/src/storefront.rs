//! # Storefront Contract
//!
//! The storefront side of the bridge, behind a trait so the sync and order
//! services never touch a concrete shop platform. A real deployment plugs
//! in an HTTP-backed implementation; tests use [`InMemoryStorefront`].
//!
//! Product writes are keyed by storefront product id, order reads by
//! storefront order id. Image and description sync are delegated hooks
//! with a tri-state outcome, so a "left alone on purpose" is never counted
//! as a failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{SyncError, SyncResult};
use bridge_core::Money;

// =============================================================================
// Storefront Data
// =============================================================================

/// A storefront product as the bridge sees it.
#[derive(Debug, Clone)]
pub struct StorefrontProduct {
    pub id: i64,
    pub sku: String,
    pub title: String,
    pub regular_price: Option<Money>,
    pub sale_price: Option<Money>,
    pub stock_quantity: Option<f64>,
    pub description: Option<String>,
    pub has_image: bool,
}

/// One line of a storefront order.
#[derive(Debug, Clone)]
pub struct StorefrontOrderLine {
    /// Storefront product, `None` for ad-hoc fee lines.
    pub storefront_product_id: Option<i64>,
    pub name: String,
    pub quantity: f64,
    pub unit_price: Money,
}

/// A storefront order as the bridge sees it.
#[derive(Debug, Clone)]
pub struct StorefrontOrder {
    pub id: i64,
    /// Storefront-visible order number, combined with the configured prefix
    /// to form the remote sale number.
    pub number: String,
    pub total: Money,
    pub shipping_total: Money,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub customer_email: Option<String>,
    pub billing_first_name: String,
    pub billing_last_name: String,
    pub billing_phone: Option<String>,
    pub lines: Vec<StorefrontOrderLine>,
    /// Set once the order exists on the remote side.
    pub remote_order_id: Option<i64>,
}

/// Result of a delegated image/description sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The storefront content was replaced.
    Updated,
    /// Existing content kept (overwrite disabled); not a failure.
    Skipped,
    /// The hook itself failed.
    Failed(String),
}

// =============================================================================
// Storefront Trait
// =============================================================================

/// Read/write access to the storefront, by storefront ids.
#[async_trait]
pub trait Storefront: Send + Sync {
    async fn get_product(&self, product_id: i64) -> SyncResult<Option<StorefrontProduct>>;

    async fn set_stock(&self, product_id: i64, quantity: f64) -> SyncResult<()>;

    async fn set_regular_price(&self, product_id: i64, price: Money) -> SyncResult<()>;

    /// Sets the sale price; `None` clears it.
    async fn set_sale_price(&self, product_id: i64, price: Option<Money>) -> SyncResult<()>;

    async fn set_title(&self, product_id: i64, title: &str) -> SyncResult<()>;

    /// Delegated image sync; keeps existing images unless `overwrite`.
    async fn sync_image(
        &self,
        product_id: i64,
        image_url: &str,
        overwrite: bool,
    ) -> SyncResult<SyncOutcome>;

    /// Delegated description sync; keeps existing text unless `overwrite`.
    async fn sync_description(
        &self,
        product_id: i64,
        description: &str,
        overwrite: bool,
    ) -> SyncResult<SyncOutcome>;

    async fn get_order(&self, order_id: i64) -> SyncResult<Option<StorefrontOrder>>;

    /// Persists the remote order id and upload timestamp on the order.
    async fn record_remote_order(
        &self,
        order_id: i64,
        remote_order_id: i64,
        uploaded_at: DateTime<Utc>,
    ) -> SyncResult<()>;

    /// Appends an operator-visible note to the order.
    async fn add_order_note(&self, order_id: i64, note: &str) -> SyncResult<()>;

    /// Emails the operator about an order that exhausted its upload
    /// retries. Delivery goes through the platform's own mailer.
    async fn notify_order_failure(
        &self,
        recipient: &str,
        order_id: i64,
        detail: &str,
    ) -> SyncResult<()>;
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// Map-backed [`Storefront`] used by tests and demos. Counts every write so
/// tests can assert zero-write invariants.
#[derive(Default)]
pub struct InMemoryStorefront {
    products: Mutex<HashMap<i64, StorefrontProduct>>,
    orders: Mutex<HashMap<i64, StorefrontOrder>>,
    notes: Mutex<Vec<(i64, String)>>,
    notifications: Mutex<Vec<(String, i64, String)>>,
    writes: AtomicUsize,
}

impl InMemoryStorefront {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(self, product: StorefrontProduct) -> Self {
        self.products.lock().unwrap().insert(product.id, product);
        self
    }

    pub fn with_order(self, order: StorefrontOrder) -> Self {
        self.orders.lock().unwrap().insert(order.id, order);
        self
    }

    /// Total mutating calls since construction.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Notes appended so far, in call order.
    pub fn notes(&self) -> Vec<(i64, String)> {
        self.notes.lock().unwrap().clone()
    }

    /// Failure notifications sent so far: (recipient, order id, detail).
    pub fn notifications(&self) -> Vec<(String, i64, String)> {
        self.notifications.lock().unwrap().clone()
    }

    fn mutate_product<R>(
        &self,
        product_id: i64,
        f: impl FnOnce(&mut StorefrontProduct) -> R,
    ) -> SyncResult<R> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut products = self.products.lock().unwrap();
        let product = products.get_mut(&product_id).ok_or_else(|| {
            SyncError::Internal(format!("no storefront product {product_id}"))
        })?;
        Ok(f(product))
    }
}

#[async_trait]
impl Storefront for InMemoryStorefront {
    async fn get_product(&self, product_id: i64) -> SyncResult<Option<StorefrontProduct>> {
        Ok(self.products.lock().unwrap().get(&product_id).cloned())
    }

    async fn set_stock(&self, product_id: i64, quantity: f64) -> SyncResult<()> {
        self.mutate_product(product_id, |p| p.stock_quantity = Some(quantity))
    }

    async fn set_regular_price(&self, product_id: i64, price: Money) -> SyncResult<()> {
        self.mutate_product(product_id, |p| p.regular_price = Some(price))
    }

    async fn set_sale_price(&self, product_id: i64, price: Option<Money>) -> SyncResult<()> {
        self.mutate_product(product_id, |p| p.sale_price = price)
    }

    async fn set_title(&self, product_id: i64, title: &str) -> SyncResult<()> {
        self.mutate_product(product_id, |p| p.title = title.to_string())
    }

    async fn sync_image(
        &self,
        product_id: i64,
        _image_url: &str,
        overwrite: bool,
    ) -> SyncResult<SyncOutcome> {
        self.mutate_product(product_id, |p| {
            if p.has_image && !overwrite {
                SyncOutcome::Skipped
            } else {
                p.has_image = true;
                SyncOutcome::Updated
            }
        })
    }

    async fn sync_description(
        &self,
        product_id: i64,
        description: &str,
        overwrite: bool,
    ) -> SyncResult<SyncOutcome> {
        self.mutate_product(product_id, |p| {
            if p.description.is_some() && !overwrite {
                SyncOutcome::Skipped
            } else {
                p.description = Some(description.to_string());
                SyncOutcome::Updated
            }
        })
    }

    async fn get_order(&self, order_id: i64) -> SyncResult<Option<StorefrontOrder>> {
        Ok(self.orders.lock().unwrap().get(&order_id).cloned())
    }

    async fn record_remote_order(
        &self,
        order_id: i64,
        remote_order_id: i64,
        _uploaded_at: DateTime<Utc>,
    ) -> SyncResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| SyncError::Internal(format!("no storefront order {order_id}")))?;
        order.remote_order_id = Some(remote_order_id);
        Ok(())
    }

    async fn add_order_note(&self, order_id: i64, note: &str) -> SyncResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.notes.lock().unwrap().push((order_id, note.to_string()));
        Ok(())
    }

    async fn notify_order_failure(
        &self,
        recipient: &str,
        order_id: i64,
        detail: &str,
    ) -> SyncResult<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((recipient.to_string(), order_id, detail.to_string()));
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
