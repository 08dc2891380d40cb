//! # Sync Scheduler
//!
//! Drives periodic full sync cycles and on-demand triggers.
//!
//! ## Scheduler Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Scheduler Loop                                   │
//! │                                                                         │
//! │   interval tick ──────┐                                                 │
//! │   (every 3600s)       │                                                 │
//! │                       ├──► run_full(source)                             │
//! │   trigger_now() ──────┘        │                                        │
//! │   (operator request)           ├── lock won ──► inventory + products    │
//! │                                │                + failed-order sweep    │
//! │                                └── lock held ─► log and wait for the    │
//! │                                                 next tick               │
//! │   shutdown() ────────────────► drain and stop                           │
//! │                                                                         │
//! │  A tick that fires while a cycle is still running is delayed, never     │
//! │  stacked: MissedTickBehavior::Delay.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use bridge_core::SyncSource;

use crate::error::{SyncError, SyncResult};
use crate::orders::OrderService;
use crate::sync::SyncService;

/// How many queued orders one scheduled sweep will re-attempt.
const FAILED_SWEEP_LIMIT: usize = 25;

// =============================================================================
// Scheduler
// =============================================================================

/// Runs full sync cycles on an interval, plus on-demand triggers.
pub struct SyncScheduler {
    sync: Arc<SyncService>,
    orders: Option<Arc<OrderService>>,
    interval: Duration,

    /// Receiver for on-demand trigger requests.
    trigger_rx: mpsc::Receiver<()>,

    /// Shutdown receiver.
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Requests an immediate sync cycle.
    pub async fn trigger_now(&self) -> SyncResult<()> {
        self.trigger_tx
            .send(())
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }
}

impl SyncScheduler {
    /// Creates a scheduler and returns a handle for triggering and shutdown.
    pub fn new(
        sync: Arc<SyncService>,
        orders: Option<Arc<OrderService>>,
        interval: Duration,
    ) -> (Self, SchedulerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let scheduler = SyncScheduler {
            sync,
            orders,
            interval,
            trigger_rx,
            shutdown_rx,
        };

        let handle = SchedulerHandle {
            trigger_tx,
            shutdown_tx,
        };

        (scheduler, handle)
    }

    /// Runs the scheduler loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so startup does not
        // race an operator-triggered cycle.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle(SyncSource::Scheduled).await;
                }

                Some(()) = self.trigger_rx.recv() => {
                    self.run_cycle(SyncSource::Manual).await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Scheduler shutting down");
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// One full cycle: inventory + product sync, then the failed-order
    /// sweep. A cycle that loses the sync lock is logged and dropped.
    async fn run_cycle(&self, source: SyncSource) {
        match self.sync.run_full(source, None).await {
            Ok(report) => {
                info!(
                    %source,
                    inventory_updated = report.inventory.updated,
                    products_updated = report.products.updated,
                    products_skipped = report.products.skipped,
                    product_errors = report.products.errors,
                    "Sync cycle complete"
                );
            }
            Err(SyncError::SyncAlreadyRunning { holder }) => {
                warn!(%source, %holder, "Sync already running, cycle skipped");
                return;
            }
            Err(e) => {
                error!(%source, error = %e, "Sync cycle failed");
                return;
            }
        }

        if let Some(orders) = &self.orders {
            match orders.retry_failed_orders(FAILED_SWEEP_LIMIT).await {
                Ok(report) if report.success + report.failed + report.skipped > 0 => {
                    info!(
                        success = report.success,
                        failed = report.failed,
                        skipped = report.skipped,
                        "Failed-order sweep complete"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Failed-order sweep errored"),
            }
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
    use crate::config::SyncSettings;
    use crate::remote::{
        NewCustomer, NewOrder, RemoteCategory, RemoteCustomer, RemoteInventoryLevel,
        RemoteOrderSummary, RemoteProduct, RemoteSite,
    };
    use crate::storefront::InMemoryStorefront;
    use async_trait::async_trait;
    use bridge_db::{Database, DbConfig};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Counts inventory fetches; one per cycle.
    #[derive(Default)]
    struct CountingApi {
        inventory_calls: AtomicU32,
    }

    #[async_trait]
    impl PosApi for CountingApi {
        async fn get_sites(&self) -> SyncResult<Vec<RemoteSite>> {
            Ok(vec![])
        }
        async fn get_inventory(&self, _site_id: i64) -> SyncResult<Vec<RemoteInventoryLevel>> {
            self.inventory_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
        async fn get_product(&self, _product_id: i64) -> SyncResult<RemoteProduct> {
            Err(SyncError::Internal("not used".to_string()))
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

    async fn scheduler_fixture(
        interval: Duration,
    ) -> (SyncScheduler, SchedulerHandle, Arc<CountingApi>, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let api = Arc::new(CountingApi::default());
        let sync = Arc::new(SyncService::new(
            db.clone(),
            api.clone(),
            Arc::new(InMemoryStorefront::new()),
            SyncSettings::default(),
        ));
        let (scheduler, handle) = SyncScheduler::new(sync, None, interval);
        (scheduler, handle, api, db)
    }

    #[tokio::test]
    async fn test_trigger_now_runs_a_cycle() {
        // A long interval keeps the periodic tick out of the way
        let (scheduler, handle, api, db) = scheduler_fixture(Duration::from_secs(3600)).await;
        let task = tokio::spawn(scheduler.run());

        handle.trigger_now().await.unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(api.inventory_calls.load(Ordering::SeqCst), 1);
        // Cycle finished: lock released
        let lock = db
            .kv()
            .get::<bridge_core::SyncLockInfo>("sync_lock")
            .await
            .unwrap();
        assert!(lock.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let (scheduler, handle, api, _db) = scheduler_fixture(Duration::from_secs(3600)).await;
        let task = tokio::spawn(scheduler.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(api.inventory_calls.load(Ordering::SeqCst), 0);
        // Further triggers fail once the receiver is gone
        assert!(handle.trigger_now().await.is_err());
    }
}
