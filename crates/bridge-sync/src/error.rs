//! # Sync Error Types
//!
//! Error types for bridge sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Bridge Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     API                 │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  RateLimited            │ │
//! │  │  ConfigLoad     │  │  Timeout        │  │  AuthFailed             │ │
//! │  │  MissingCreds   │  │                 │  │  ApiStatus/ServerError  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │     Orders      │  │      Coordination       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DatabaseError  │  │  Preparation    │  │  SyncAlreadyRunning     │ │
//! │  │                 │  │  DuplicateUpload│  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all bridge failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized so the retry strategy can tell transient from
///   terminal without string matching
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid bridge configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// No API credentials configured.
    #[error("API credentials not configured. Set client id/secret or an OAuth token pair.")]
    MissingCredentials,

    /// Invalid API URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to reach the remote API.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    // =========================================================================
    // API Errors
    // =========================================================================
    /// Remote returned 429. Carries the server's Retry-After hint when sent.
    #[error("Rate limited by remote API (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Authentication rejected, including after a token refresh attempt.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// OAuth token refresh failed.
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// Remote returned a non-retryable client error status.
    #[error("API returned {status}: {body}")]
    ApiStatus { status: u16, body: String },

    /// Remote returned a server error status (retryable).
    #[error("API server error: {status}")]
    ServerError { status: u16 },

    /// Failed to serialize a request payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to decode a response body.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Order Errors
    // =========================================================================
    /// Order payload could not be prepared (terminal, do not retry).
    #[error("Order {order_id} preparation failed: {detail}")]
    OrderPreparation { order_id: i64, detail: String },

    /// Another upload of the same order is in flight.
    #[error("Order {order_id} upload already in progress")]
    DuplicateUpload { order_id: i64 },

    /// Create returned no body and the follow-up search found nothing.
    /// Retryable: a fresh attempt or a fresh search may resolve it.
    #[error("Order {order_id} upload could not be verified")]
    VerificationAmbiguous { order_id: i64 },

    // =========================================================================
    // Coordination Errors
    // =========================================================================
    /// A sync run is already holding the lock.
    #[error("Sync already running (started by {holder})")]
    SyncAlreadyRunning { holder: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal bridge error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The service is shutting down.
    #[error("Bridge is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<bridge_db::DbError> for SyncError {
    fn from(err: bridge_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_connect() {
            SyncError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and the operation can be
    /// retried.
    ///
    /// ## Retryable Errors
    /// - Connection failures and timeouts
    /// - 429 rate limiting
    /// - Server-side 5xx responses
    ///
    /// ## Non-Retryable Errors
    /// - Configuration and credential problems
    /// - 4xx rejections (the request itself is wrong)
    /// - Order preparation failures
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_)
                | SyncError::Timeout(_)
                | SyncError::RateLimited { .. }
                | SyncError::ServerError { .. }
                | SyncError::VerificationAmbiguous { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::MissingCredentials
                | SyncError::InvalidUrl(_)
        )
    }

    /// Short machine-readable kind tag, used by the failed-order queue.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidConfig(_) => "invalid_config",
            SyncError::ConfigLoadFailed(_) => "config_load_failed",
            SyncError::MissingCredentials => "missing_credentials",
            SyncError::InvalidUrl(_) => "invalid_url",
            SyncError::ConnectionFailed(_) => "connection_failed",
            SyncError::Timeout(_) => "timeout",
            SyncError::RateLimited { .. } => "rate_limited",
            SyncError::AuthFailed(_) => "auth_failed",
            SyncError::TokenRefreshFailed(_) => "token_refresh_failed",
            SyncError::ApiStatus { .. } => "api_status",
            SyncError::ServerError { .. } => "server_error",
            SyncError::SerializationFailed(_) => "serialization_failed",
            SyncError::DeserializationFailed(_) => "deserialization_failed",
            SyncError::DatabaseError(_) => "database_error",
            SyncError::OrderPreparation { .. } => "order_preparation",
            SyncError::DuplicateUpload { .. } => "duplicate_upload",
            SyncError::VerificationAmbiguous { .. } => "verification_ambiguous",
            SyncError::SyncAlreadyRunning { .. } => "sync_already_running",
            SyncError::Internal(_) => "internal",
            SyncError::ShuttingDown => "shutting_down",
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
