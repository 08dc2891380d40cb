//! # Bridge Configuration
//!
//! Configuration management for the sync core.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. KV Option Store (highest priority)                                 │
//! │     Rotated OAuth tokens persisted by the client after a refresh       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     bridge.toml next to the database, or the path passed to bridged    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Kounta production base URL, 60 req/60s bucket, hourly schedule     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # bridge.toml
//! [api]
//! base_url = "https://api.kounta.com/v1/"
//! company_id = 12345
//! client_id = "abc"
//! client_secret = "shh"
//!
//! [sync]
//! site_id = 4
//! rate_limit_max_requests = 60
//! rate_limit_window_secs = 60
//! interval_secs = 3600
//!
//! [orders]
//! sale_number_prefix = "WC-"
//! payment_methods = { stripe = 7, cod = 1 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

use crate::error::{SyncError, SyncResult};
use bridge_db::KvStore;

/// KV keys for persisted OAuth tokens. The client writes these after a
/// refresh; loading prefers them over the file copy.
pub const KV_ACCESS_TOKEN: &str = "option:access_token";
pub const KV_REFRESH_TOKEN: &str = "option:refresh_token";

// =============================================================================
// API Settings
// =============================================================================

/// Remote API connection and credential settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the remote API. Company-scoped paths are joined onto it.
    pub base_url: String,

    /// OAuth token endpoint.
    pub token_url: String,

    /// Remote company (account) id, interpolated into endpoint paths.
    pub company_id: i64,

    /// OAuth client id, also used for Basic auth when no token pair is set.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: String,

    /// OAuth access token. Optional; Basic auth is used without it.
    pub access_token: Option<String>,

    /// OAuth refresh token, required for automatic 401 recovery.
    pub refresh_token: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Bound on back-to-back 429 retries for a single logical request.
    pub max_rate_limit_retries: u32,

    /// Page size for cursor-paginated collection endpoints.
    pub page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://api.kounta.com/v1/".to_string(),
            token_url: "https://api.kounta.com/v1/token".to_string(),
            company_id: 0,
            client_id: String::new(),
            client_secret: String::new(),
            access_token: None,
            refresh_token: None,
            timeout_secs: 30,
            max_rate_limit_retries: 3,
            page_size: 100,
        }
    }
}

impl ApiConfig {
    /// Returns true when an OAuth token pair is configured.
    pub fn has_token_pair(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Settings for the inventory and product passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Remote site whose stock and prices this bridge mirrors.
    pub site_id: i64,

    /// Token-bucket capacity.
    pub rate_limit_max_requests: u32,

    /// Token-bucket refill window in seconds.
    pub rate_limit_window_secs: u64,

    /// Concurrent operations per batch chunk.
    pub batch_max_concurrent: usize,

    /// Chunk size within a product pass; each chunk runs through the
    /// batch processor before the next starts.
    pub product_batch_size: u32,

    /// Stale items selected per full run, across all chunks.
    pub product_sync_limit: u32,

    /// Skip items refreshed more recently than this many seconds ago.
    pub min_refresh_secs: i64,

    /// Scheduler interval between full runs, in seconds.
    pub interval_secs: u64,

    /// Push remote price changes to the storefront.
    pub sync_prices: bool,

    /// Push remote name changes to the storefront title.
    pub sync_titles: bool,

    /// Allow the image hook to replace existing storefront images.
    pub overwrite_images: bool,

    /// Allow the description hook to replace existing descriptions.
    pub overwrite_descriptions: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            site_id: 0,
            rate_limit_max_requests: 60,
            rate_limit_window_secs: 60,
            batch_max_concurrent: 5,
            product_batch_size: 50,
            product_sync_limit: 200,
            min_refresh_secs: 300,
            interval_secs: 3600,
            sync_prices: true,
            sync_titles: false,
            overwrite_images: false,
            overwrite_descriptions: false,
        }
    }
}

// =============================================================================
// Order Settings
// =============================================================================

/// Settings for the order upload path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderSettings {
    /// Whether storefront orders are uploaded at all.
    pub enabled: bool,

    /// Prefix prepended to storefront order numbers to form the remote
    /// sale number, and matched during idempotency search.
    pub sale_number_prefix: String,

    /// Storefront payment method slug -> remote payment method id.
    pub payment_methods: HashMap<String, i64>,

    /// Remote payment method used when the slug has no mapping.
    pub default_payment_method: Option<i64>,

    /// Remote product representing shipping; a synthetic line is added
    /// when an order carries shipping cost and this is set.
    pub shipping_product_id: Option<i64>,

    /// Failed-queue retry ceiling; entries past it are skipped.
    pub max_retry_count: u32,

    /// Recipient for a one-time email when an order exhausts its retries.
    pub notification_email: Option<String>,
}

impl Default for OrderSettings {
    fn default() -> Self {
        OrderSettings {
            enabled: true,
            sale_number_prefix: "WC-".to_string(),
            payment_methods: HashMap::new(),
            default_payment_method: None,
            shipping_product_id: None,
            max_retry_count: 10,
            notification_email: None,
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Local store settings, consumed by the daemon at bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file.
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: "bridge.db".to_string(),
        }
    }
}

// =============================================================================
// Bridge Config
// =============================================================================

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub api: ApiConfig,
    pub sync: SyncSettings,
    pub orders: OrderSettings,
    pub database: DatabaseSettings,
}

impl BridgeConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&raw)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded bridge configuration");
        Ok(config)
    }

    /// Validates cross-field constraints the type system cannot express.
    pub fn validate(&self) -> SyncResult<()> {
        Url::parse(&self.api.base_url)?;
        Url::parse(&self.api.token_url)?;

        if self.api.client_id.is_empty() && !self.api.has_token_pair() {
            return Err(SyncError::MissingCredentials);
        }
        if self.sync.rate_limit_max_requests == 0 {
            return Err(SyncError::InvalidConfig(
                "rate_limit_max_requests must be at least 1".to_string(),
            ));
        }
        if self.sync.rate_limit_window_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "rate_limit_window_secs must be at least 1".to_string(),
            ));
        }
        if self.sync.batch_max_concurrent == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlays tokens persisted in the KV option store over the file copy.
    ///
    /// The client rotates tokens on refresh and persists them; stored
    /// tokens always win over the (possibly stale) file pair.
    pub async fn hydrate_tokens(&mut self, kv: &KvStore) -> SyncResult<()> {
        if let Some(token) = kv.get::<String>(KV_ACCESS_TOKEN).await? {
            debug!("Using access token from option store");
            self.api.access_token = Some(token);
        }
        if let Some(token) = kv.get::<String>(KV_REFRESH_TOKEN).await? {
            self.api.refresh_token = Some(token);
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
