//! # Order Service
//!
//! Idempotent upload of storefront orders to the remote POS.
//!
//! ## Per-Order State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   UNSYNCED ──lock won──► UPLOADING ──success──► SYNCED (remote id)      │
//! │      │                      │    ▲                   │                   │
//! │      │ lock held            │    └── retried ──┐     │ repeat attempt    │
//! │      ▼                      ▼                  │     ▼                   │
//! │   DuplicateUpload       retries exhausted   FAILED  "already exists"    │
//! │   (rejected, no queue)        └───────────► queue   (terminal, not an   │
//! │                                        retry_count   error)             │
//! │                                        ceiling: 10                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The upload itself searches the remote for an existing match before
//! creating (±1 day, ±5 cents, sale-number prefix), so a lost response on
//! a prior attempt never produces a duplicate order.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::PosApi;
use crate::config::OrderSettings;
use crate::error::{SyncError, SyncResult};
use crate::failed::FailedOrderQueue;
use crate::remote::{NewCustomer, NewOrder, NewOrderLine, NewOrderPayment, RemoteOrderSummary};
use crate::retry::RetryStrategy;
use crate::storefront::{Storefront, StorefrontOrder};
use bridge_core::Money;
use bridge_db::{Database, KvStore};

/// Transient per-order upload lock; bounds a crashed uploader.
const ORDER_LOCK_TTL: Duration = Duration::from_secs(120);

/// Idempotency search window around the storefront placement time.
fn search_window() -> ChronoDuration {
    ChronoDuration::days(1)
}

/// Total-amount tolerance for an idempotency match.
const AMOUNT_TOLERANCE: Money = Money::from_cents(5);

/// Wait before re-searching after an empty create response.
const AMBIGUOUS_RECHECK_WAIT: Duration = Duration::from_secs(2);

/// Result of a (possibly short-circuited) order upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUploadResult {
    pub remote_order_id: i64,
    /// True when no remote create happened: the order was already synced
    /// or an existing remote match was found.
    pub already_existed: bool,
}

/// Aggregate result of a failed-queue sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

// =============================================================================
// OrderService
// =============================================================================

/// Uploads storefront orders to the remote POS, exactly once each.
pub struct OrderService {
    db: Database,
    api: Arc<dyn PosApi>,
    storefront: Arc<dyn Storefront>,
    settings: OrderSettings,
    site_id: i64,
    queue: FailedOrderQueue,
    retry: RetryStrategy,
    kv: KvStore,
}

impl OrderService {
    pub fn new(
        db: Database,
        api: Arc<dyn PosApi>,
        storefront: Arc<dyn Storefront>,
        settings: OrderSettings,
        site_id: i64,
    ) -> Self {
        let queue = FailedOrderQueue::new(db.kv());
        let kv = db.kv();
        OrderService {
            db,
            api,
            storefront,
            settings,
            site_id,
            queue,
            retry: RetryStrategy::default(),
            kv,
        }
    }

    /// Replaces the default retry strategy.
    pub fn with_retry_strategy(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    pub fn failed_queue(&self) -> &FailedOrderQueue {
        &self.queue
    }

    fn sale_number(&self, order: &StorefrontOrder) -> String {
        format!("{}{}", self.settings.sale_number_prefix, order.number)
    }

    fn lock_key(order_id: i64) -> String {
        format!("order_lock:{order_id}")
    }

    // =========================================================================
    // Single-Order Upload
    // =========================================================================

    /// Uploads one order through the retry strategy. Terminal failures are
    /// recorded in the failed queue; an already-synced order returns its
    /// existing remote id without touching the remote at all.
    pub async fn create_order_with_retry(&self, order_id: i64) -> SyncResult<OrderUploadResult> {
        let order = self
            .storefront
            .get_order(order_id)
            .await?
            .ok_or_else(|| SyncError::OrderPreparation {
                order_id,
                detail: "storefront order not found".to_string(),
            })?;

        // Terminal short-circuit, not an error
        if let Some(remote_id) = order.remote_order_id {
            debug!(order_id, remote_id, "Order already synced");
            return Ok(OrderUploadResult {
                remote_order_id: remote_id,
                already_existed: true,
            });
        }

        // Transient per-order lock: a concurrent attempt is rejected, never
        // queued
        let lock_key = Self::lock_key(order_id);
        let won = self
            .kv
            .put_if_absent(&lock_key, &Utc::now(), Some(ORDER_LOCK_TTL))
            .await?;
        if !won {
            return Err(SyncError::DuplicateUpload { order_id });
        }

        let result = self.upload_locked(&order).await;

        if let Err(err) = self.kv.delete(&lock_key).await {
            warn!(order_id, error = %err, "Failed to clear order upload lock");
        }

        match result {
            Ok(upload) => {
                self.storefront
                    .record_remote_order(order_id, upload.remote_order_id, Utc::now())
                    .await?;
                let note = if upload.already_existed {
                    format!("POS order already exists (#{})", upload.remote_order_id)
                } else {
                    format!("Uploaded to POS (#{})", upload.remote_order_id)
                };
                self.storefront.add_order_note(order_id, &note).await?;
                self.queue.remove(order_id).await?;
                info!(
                    order_id,
                    remote_order_id = upload.remote_order_id,
                    already_existed = upload.already_existed,
                    "Order upload complete"
                );
                Ok(upload)
            }
            Err(err) => {
                let entry = self.queue.record_failure(order_id, &err).await?;
                let note = format!(
                    "POS upload failed (attempt {}): {}",
                    entry.retry_count, entry.error_detail
                );
                if let Err(note_err) = self.storefront.add_order_note(order_id, &note).await {
                    warn!(order_id, error = %note_err, "Failed to annotate order");
                }
                // Fires exactly once, when the ceiling is reached
                if entry.retry_count == self.settings.max_retry_count {
                    if let Some(recipient) = &self.settings.notification_email {
                        if let Err(mail_err) = self
                            .storefront
                            .notify_order_failure(recipient, order_id, &entry.error_detail)
                            .await
                        {
                            warn!(order_id, error = %mail_err, "Failure notification not sent");
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// The locked section: prepare once, then search-or-create under the
    /// retry strategy.
    async fn upload_locked(&self, order: &StorefrontOrder) -> SyncResult<OrderUploadResult> {
        let payload = self.prepare_payload(order).await?;

        self.retry
            .execute("order_upload", || self.search_or_create(order, &payload))
            .await
    }

    /// One upload attempt: idempotency search first, create second,
    /// re-search on an ambiguous empty response.
    async fn search_or_create(
        &self,
        order: &StorefrontOrder,
        payload: &NewOrder,
    ) -> SyncResult<OrderUploadResult> {
        if let Some(existing) = self.find_existing(order).await? {
            info!(
                order_id = order.id,
                remote_order_id = existing.id,
                "Idempotency search found existing remote order"
            );
            return Ok(OrderUploadResult {
                remote_order_id: existing.id,
                already_existed: true,
            });
        }

        match self.api.create_order(payload).await? {
            Some(created) => Ok(OrderUploadResult {
                remote_order_id: created.id,
                already_existed: false,
            }),
            None => {
                // Ambiguous success: the create may have landed without a
                // body. Give the remote a moment, then trust the search.
                tokio::time::sleep(AMBIGUOUS_RECHECK_WAIT).await;
                match self.find_existing(order).await? {
                    Some(existing) => Ok(OrderUploadResult {
                        remote_order_id: existing.id,
                        already_existed: false,
                    }),
                    None => Err(SyncError::VerificationAmbiguous { order_id: order.id }),
                }
            }
        }
    }

    /// Searches remote orders in a ±1 day window for a match: the exact
    /// expected sale number, or a prefix match with the total within ±5
    /// cents.
    async fn find_existing(
        &self,
        order: &StorefrontOrder,
    ) -> SyncResult<Option<RemoteOrderSummary>> {
        let since = order.created_at - search_window();
        let until = order.created_at + search_window();
        let expected = self.sale_number(order);
        let prefix = &self.settings.sale_number_prefix;

        let candidates = self.api.search_orders(since).await?;
        let mut fallback: Option<RemoteOrderSummary> = None;

        for candidate in candidates {
            if !within_window(&candidate, until) {
                continue;
            }
            let Some(sale_number) = candidate.sale_number.as_deref() else {
                continue;
            };
            if sale_number == expected {
                return Ok(Some(candidate));
            }
            let amount_close = candidate
                .total_amount()
                .is_some_and(|total| total.abs_diff(order.total) <= AMOUNT_TOLERANCE);
            if fallback.is_none() && sale_number.starts_with(prefix.as_str()) && amount_close {
                fallback = Some(candidate);
            }
        }
        Ok(fallback)
    }

    // =========================================================================
    // Payload Preparation
    // =========================================================================

    /// Builds the remote order payload. All failures here are terminal.
    async fn prepare_payload(&self, order: &StorefrontOrder) -> SyncResult<NewOrder> {
        let customer_id = self.resolve_customer(order).await?;

        let mut lines = Vec::new();
        for line in &order.lines {
            let Some(storefront_product_id) = line.storefront_product_id else {
                debug!(order_id = order.id, line = %line.name, "Ad-hoc line dropped");
                continue;
            };
            let mapped = self
                .db
                .catalog()
                .get_by_storefront_product(storefront_product_id)
                .await?
                .and_then(|item| item.remote_item_id);
            match mapped {
                Some(remote_product_id) => lines.push(NewOrderLine {
                    product_id: remote_product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price.to_remote(),
                    notes: None,
                }),
                None => {
                    warn!(
                        order_id = order.id,
                        storefront_product_id,
                        line = %line.name,
                        "Line has no remote product mapping, dropped"
                    );
                }
            }
        }

        if lines.is_empty() {
            return Err(SyncError::OrderPreparation {
                order_id: order.id,
                detail: "no line item has a remote product mapping".to_string(),
            });
        }

        if !order.shipping_total.is_zero() {
            match self.settings.shipping_product_id {
                Some(shipping_product_id) => lines.push(NewOrderLine {
                    product_id: shipping_product_id,
                    quantity: 1.0,
                    unit_price: order.shipping_total.to_remote(),
                    notes: Some("Shipping".to_string()),
                }),
                None => warn!(
                    order_id = order.id,
                    "Order has shipping cost but no shipping product is configured"
                ),
            }
        }

        let method_id = self
            .settings
            .payment_methods
            .get(&order.payment_method)
            .copied()
            .or(self.settings.default_payment_method)
            .ok_or_else(|| SyncError::OrderPreparation {
                order_id: order.id,
                detail: format!("no payment method mapping for '{}'", order.payment_method),
            })?;

        Ok(NewOrder {
            sale_number: self.sale_number(order),
            status: "COMPLETE".to_string(),
            site_id: self.site_id,
            customer_id,
            notes: None,
            lines,
            payments: vec![NewOrderPayment {
                method_id,
                amount: order.total.to_remote(),
            }],
        })
    }

    /// Resolves a remote customer: email match, then name match, then
    /// create. Orders without identity upload as guest sales.
    async fn resolve_customer(&self, order: &StorefrontOrder) -> SyncResult<Option<i64>> {
        if let Some(email) = &order.customer_email {
            if let Some(customer) = self.api.find_customer_by_email(email).await? {
                return Ok(Some(customer.id));
            }
        }

        let has_name =
            !order.billing_first_name.is_empty() || !order.billing_last_name.is_empty();
        if has_name {
            if let Some(customer) = self
                .api
                .find_customer_by_name(
                    &order.billing_first_name,
                    &order.billing_last_name,
                    order.billing_phone.as_deref(),
                )
                .await?
            {
                return Ok(Some(customer.id));
            }
        }

        if order.customer_email.is_none() && !has_name {
            return Ok(None);
        }

        let created = self
            .api
            .create_customer(&NewCustomer {
                email: order.customer_email.clone(),
                first_name: order.billing_first_name.clone(),
                last_name: order.billing_last_name.clone(),
                phone: order.billing_phone.clone(),
            })
            .await?;
        Ok(Some(created.id))
    }

    // =========================================================================
    // Failed-Queue Sweep
    // =========================================================================

    /// Re-runs the upload for up to `limit` queued orders, skipping any
    /// past the retry ceiling. Successes leave the queue inside the
    /// single-order path.
    pub async fn retry_failed_orders(&self, limit: usize) -> SyncResult<RetryReport> {
        let entries = self.queue.list().await?;
        let mut report = RetryReport::default();

        for entry in entries.into_iter().take(limit) {
            if entry.retry_count > self.settings.max_retry_count {
                debug!(
                    order_id = entry.order_id,
                    retry_count = entry.retry_count,
                    "Past retry ceiling, skipped"
                );
                report.skipped += 1;
                continue;
            }
            match self.create_order_with_retry(entry.order_id).await {
                Ok(_) => report.success += 1,
                Err(err) => {
                    warn!(order_id = entry.order_id, error = %err, "Queued retry failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            success = report.success,
            failed = report.failed,
            skipped = report.skipped,
            "Failed-order sweep complete"
        );
        Ok(report)
    }
}

fn within_window(candidate: &RemoteOrderSummary, until: DateTime<Utc>) -> bool {
    match candidate.created_at {
        Some(created) => created <= until,
        // No timestamp from the remote: keep it as a candidate
        None => true,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
