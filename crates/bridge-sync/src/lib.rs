//! # bridge-sync: Sync Engine for the Kounta Bridge
//!
//! This crate provides the synchronization layer between the Kounta POS
//! API and a storefront, built around a local SQLite mirror.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Engine Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   SyncScheduler (Orchestrator)                   │  │
//! │  │                                                                  │  │
//! │  │  Spawned as a Tokio task by the bridged daemon                   │  │
//! │  │  Interval ticks + on-demand triggers + graceful shutdown         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  SyncService   │  │  OrderService  │  │  ApiClient             │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Inventory pass │  │ Idempotent     │  │ OAuth2 + rate-limited  │    │
//! │  │ Product pass   │  │ order upload,  │  │ HTTP, pagination,      │    │
//! │  │ Lock-guarded   │  │ failed queue   │  │ single 401 refresh     │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  SHARED INFRASTRUCTURE:                                                │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  RateLimiter   │  │ RetryStrategy  │  │  BatchProcessor        │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Token bucket   │  │ Exponential    │  │ Bounded concurrency,   │    │
//! │  │ persisted in   │  │ backoff with   │  │ per-item failure       │    │
//! │  │ the KV store   │  │ jitter         │  │ isolation              │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  The [`Storefront`] trait is the seam toward the selling platform:     │
//! │  the sync core never speaks the storefront's protocol directly.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Core Services
//! - [`sync`] - Inventory and product reconciliation passes
//! - [`orders`] - Idempotent order upload and the failed-order queue
//! - [`scheduler`] - Interval-driven orchestration with manual triggers
//! - [`client`] - Kounta API client (auth, rate limiting, pagination)
//!
//! ### Infrastructure
//! - [`config`] - TOML configuration with KV-backed token hydration
//! - [`error`] - Sync error taxonomy and retryability classification
//! - [`ratelimit`] - Persistent token-bucket rate limiter
//! - [`retry`] - Exponential backoff with jitter
//! - [`batch`] - Bounded-concurrency batch processing
//! - [`lock`] - Global sync lock over the KV store
//! - [`failed`] - Failed-order queue over the KV store
//! - [`remote`] - Kounta API wire types
//! - [`storefront`] - Storefront seam trait and in-memory test double
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_sync::{ApiClient, BridgeConfig, RateLimiter, SyncScheduler, SyncService};
//! use bridge_db::{Database, DbConfig};
//!
//! let config = BridgeConfig::load("bridge.toml")?;
//! let db = Database::new(DbConfig::new(&config.database.path)).await?;
//!
//! let limiter = RateLimiter::new(db.kv(), 60, Duration::from_secs(60));
//! let api = Arc::new(ApiClient::new(&config.api, db.kv(), limiter)?);
//!
//! let sync = Arc::new(SyncService::new(db, api, storefront, config.sync));
//! let (scheduler, handle) = SyncScheduler::new(sync, None, interval);
//! tokio::spawn(scheduler.run());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Core services
pub mod client;
pub mod orders;
pub mod scheduler;
pub mod sync;

// Infrastructure
pub mod batch;
pub mod config;
pub mod error;
pub mod failed;
pub mod lock;
pub mod ratelimit;
pub mod remote;
pub mod retry;
pub mod storefront;

// =============================================================================
// Re-exports
// =============================================================================

// Core types
pub use client::{ApiClient, PosApi};
pub use orders::{OrderService, OrderUploadResult, RetryReport};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use sync::{FullSyncReport, InventorySyncReport, ProductSyncReport, SyncService};

// Infrastructure types
pub use batch::{BatchOutcome, BatchProcessor};
pub use config::{ApiConfig, BridgeConfig, DatabaseSettings, OrderSettings, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use failed::FailedOrderQueue;
pub use lock::{SyncLock, SyncLockGuard};
pub use ratelimit::RateLimiter;
pub use retry::RetryStrategy;
pub use storefront::{
    InMemoryStorefront, Storefront, StorefrontOrder, StorefrontOrderLine, StorefrontProduct,
    SyncOutcome,
};
