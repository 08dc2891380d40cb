//! # Repository Module
//!
//! Database repository implementations for the bridge.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Sync pass                                                             │
//! │       │                                                                 │
//! │       │  db.catalog().map_by_remote_id()                               │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  CatalogRepository                                                     │
//! │  ├── upsert_from_import(&self, import)                                 │
//! │  ├── map_by_remote_id(&self)                                           │
//! │  ├── eligible_for_product_sync(&self, limit)                           │
//! │  └── touch_synced(&self, id, at)                                       │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Clean separation of concerns                                        │
//! │  • Easy to test against an in-memory database                          │
//! │  • SQL is isolated in one place                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`catalog::CatalogRepository`] - Catalog item import, mapping, and sync bookkeeping
//! - [`inventory::InventoryRepository`] - Per-site stock and price rows, batched writes

pub mod catalog;
pub mod inventory;
