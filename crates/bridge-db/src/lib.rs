//! # bridge-db: Local Store for the POS Bridge
//!
//! SQLite persistence for the bridge: the catalog mirror of the POS, per-site
//! stock and price rows, and a TTL-aware key/value store used for tokens,
//! rate-limiter state, locks, and the failed-order queue.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Bridge Data Flow                                  │
//! │                                                                         │
//! │  Sync pass (bridge-sync)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bridge-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (catalog.rs)  │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ CatalogRepo   │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │◄───│ InventoryRepo │    │              │  │   │
//! │  │   │ Management    │    │ KvStore       │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (bridge.db, WAL mode)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`kv`] - TTL-aware key/value store
//! - [`repository`] - Repository implementations (catalog, inventory)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/bridge.db")).await?;
//!
//! let items = db.catalog().map_by_remote_id().await?;
//! db.kv().put("sync_progress", &progress, None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod kv;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use kv::KvStore;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::{CatalogRepository, ImportedItem};
pub use repository::inventory::{InventoryRepository, NewPrice, NewStockLevel, RowUpdate};
