//! # Error Types
//!
//! Domain-level error types for bridge-core.
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (item id, site id, etc.)
//! 3. Errors are enum variants, never bare strings
//!
//! Database failures live in `bridge-db::DbError` and everything the
//! synchronization core can hit lives in `bridge-sync::SyncError`; this enum
//! only covers violations of the pure domain rules.

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The stored tag set is not a valid JSON array of strings.
    #[error("Catalog item {item_id} has an invalid tag set: {detail}")]
    InvalidTags { item_id: i64, detail: String },

    /// A quantity that must be finite and non-negative was not.
    #[error("Invalid quantity {quantity} for catalog item {item_id}")]
    InvalidQuantity { item_id: i64, quantity: f64 },
}
