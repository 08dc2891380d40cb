//! # bridge-core: Pure Domain Types for Kounta Bridge
//!
//! This crate is the heart of the bridge: the domain model and the pure
//! reconciliation rules, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Kounta Bridge Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                bridge-sync (Synchronization Core)               │   │
//! │  │    rate limiter ─ retry ─ API client ─ sync/order services      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 ★ bridge-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐   ┌───────────┐   ┌────────────────────────┐   │   │
//! │  │   │   types   │   │   money   │   │        error           │   │   │
//! │  │   │CatalogItem│   │   Money   │   │      CoreError         │   │   │
//! │  │   │StockRow.. │   │ cents i64 │   │                        │   │   │
//! │  │   └───────────┘   └───────────┘   └────────────────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                   bridge-db (Database Layer)                    │   │
//! │  │        SQLite queries, migrations, repositories, KV store       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (CatalogItem, ItemShopStock, locks, queues)
//! - [`money`] - Money type with integer-cent arithmetic
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: deterministic, no side effects
//! 2. **Integer Money**: remote decimal prices normalize to cents once, at
//!    the API boundary; every comparison afterwards is exact
//! 3. **Explicit Errors**: typed errors, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::CoreError;
pub use money::Money;
pub use types::{
    reconcile_price, CatalogItem, FailedOrderEntry, ItemPrice, ItemShopStock, PriceUpdate,
    SyncLockInfo, SyncPhase, SyncProgress, SyncSource,
};
