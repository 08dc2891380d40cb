//! # API Client
//!
//! Rate-limited, retry-aware HTTP client for the remote POS API.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      make_request pipeline                              │
//! │                                                                         │
//! │  wait_if_needed ──► build request (auth header) ──► send ──► record    │
//! │                                                          │              │
//! │                             ┌────────────────────────────┘              │
//! │                             ▼                                           │
//! │   2xx ── decode JSON (empty body → Null)                                │
//! │   429 ── drain bucket, sleep hint, re-send (bounded, max 3)             │
//! │   401 ── refresh token ONCE, re-send; otherwise AuthFailed              │
//! │   5xx ── ServerError (retryable at the strategy layer)                  │
//! │   4xx ── ApiStatus (terminal)                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Services depend on the [`PosApi`] trait, not the concrete client, so
//! tests can substitute an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ApiConfig, KV_ACCESS_TOKEN, KV_REFRESH_TOKEN};
use crate::error::{SyncError, SyncResult};
use crate::ratelimit::RateLimiter;
use crate::remote::{
    NewCustomer, NewOrder, RemoteCategory, RemoteCustomer, RemoteInventoryLevel, RemoteOrderSummary,
    RemoteProduct, RemoteSite, TokenRefreshRequest, TokenResponse,
};
use bridge_db::KvStore;

// =============================================================================
// PosApi Trait
// =============================================================================

/// The remote POS API surface the services consume.
#[async_trait]
pub trait PosApi: Send + Sync {
    /// Lists the company's sites.
    async fn get_sites(&self) -> SyncResult<Vec<RemoteSite>>;

    /// Fetches the complete inventory of a site, following pagination.
    async fn get_inventory(&self, site_id: i64) -> SyncResult<Vec<RemoteInventoryLevel>>;

    /// Fetches one product by remote id.
    async fn get_product(&self, product_id: i64) -> SyncResult<RemoteProduct>;

    /// Lists the company's categories.
    async fn get_categories(&self) -> SyncResult<Vec<RemoteCategory>>;

    /// Finds a customer by exact email.
    async fn find_customer_by_email(&self, email: &str) -> SyncResult<Option<RemoteCustomer>>;

    /// Finds a customer by name, the fallback when no email matched. When a
    /// phone number is given, only a candidate with the same number counts
    /// as a match.
    async fn find_customer_by_name(
        &self,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
    ) -> SyncResult<Option<RemoteCustomer>>;

    /// Creates a customer.
    async fn create_customer(&self, customer: &NewCustomer) -> SyncResult<RemoteCustomer>;

    /// Creates an order. `None` means the remote accepted the request but
    /// returned no body; the caller must re-search to confirm.
    async fn create_order(&self, order: &NewOrder) -> SyncResult<Option<RemoteOrderSummary>>;

    /// Lists orders created at or after the given instant.
    async fn search_orders(&self, created_since: DateTime<Utc>)
        -> SyncResult<Vec<RemoteOrderSummary>>;
}

// =============================================================================
// ApiClient
// =============================================================================

/// HTTP implementation of [`PosApi`] against the Kounta-style API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token_url: Url,
    company_id: i64,
    client_id: String,
    client_secret: String,
    tokens: RwLock<TokenPair>,
    kv: KvStore,
    limiter: RateLimiter,
    max_rate_limit_retries: u32,
    page_size: usize,
}

#[derive(Debug, Clone, Default)]
struct TokenPair {
    access: Option<String>,
    refresh: Option<String>,
}

impl ApiClient {
    /// Builds a client from settings. The per-request timeout comes from
    /// `config.timeout_secs`.
    pub fn new(config: &ApiConfig, kv: KvStore, limiter: RateLimiter) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(ApiClient {
            http,
            base_url: Url::parse(&config.base_url)?,
            token_url: Url::parse(&config.token_url)?,
            company_id: config.company_id,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            tokens: RwLock::new(TokenPair {
                access: config.access_token.clone(),
                refresh: config.refresh_token.clone(),
            }),
            kv,
            limiter,
            max_rate_limit_retries: config.max_rate_limit_retries,
            page_size: config.page_size.max(1),
        })
    }

    fn company_path(&self, suffix: &str) -> String {
        format!("companies/{}/{}", self.company_id, suffix)
    }

    /// Sends one logical request, absorbing bounded 429 loops and a single
    /// 401 token refresh. Returns the decoded JSON body; an empty body
    /// decodes to `Value::Null` (no content, not an error).
    async fn send_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> SyncResult<serde_json::Value> {
        let url = self.base_url.join(path)?;
        let mut refreshed = false;
        let mut rate_limit_hits = 0u32;

        loop {
            self.limiter.wait_if_needed().await?;

            let mut request = self.http.request(method.clone(), url.clone());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            request = match self.tokens.read().await.access.as_deref() {
                Some(token) => request.bearer_auth(token),
                None => request.basic_auth(&self.client_id, Some(&self.client_secret)),
            };

            let response = request
                .header("Accept", "application/json")
                .send()
                .await?;
            self.limiter.record_request().await?;

            let status = response.status();
            match status {
                s if s.is_success() => {
                    let text = response.text().await?;
                    if text.trim().is_empty() {
                        return Ok(serde_json::Value::Null);
                    }
                    return serde_json::from_str(&text)
                        .map_err(|e| SyncError::DeserializationFailed(e.to_string()));
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    rate_limit_hits += 1;
                    let retry_after = parse_retry_after(&response);
                    if rate_limit_hits > self.max_rate_limit_retries {
                        return Err(SyncError::RateLimited {
                            retry_after_secs: retry_after.map(|d| d.as_secs()),
                        });
                    }
                    debug!(path, attempt = rate_limit_hits, "429 received, re-sending");
                    self.limiter.handle_rate_limit(retry_after).await?;
                }
                StatusCode::UNAUTHORIZED => {
                    let can_refresh =
                        !refreshed && self.tokens.read().await.refresh.is_some();
                    if can_refresh {
                        refreshed = true;
                        self.refresh_access_token().await?;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(SyncError::AuthFailed(body));
                }
                s if s.is_server_error() => {
                    return Err(SyncError::ServerError { status: s.as_u16() });
                }
                s => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(SyncError::ApiStatus {
                        status: s.as_u16(),
                        body,
                    });
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        let value = self.send_json(Method::GET, path, query, None).await?;
        serde_json::from_value(value)
            .map_err(|e| SyncError::DeserializationFailed(e.to_string()))
    }

    /// Exchanges the refresh token for a new pair and persists it to the
    /// option store so a restarted process keeps the rotated credentials.
    async fn refresh_access_token(&self) -> SyncResult<()> {
        let mut tokens = self.tokens.write().await;
        let refresh = tokens
            .refresh
            .clone()
            .ok_or_else(|| SyncError::TokenRefreshFailed("no refresh token".to_string()))?;

        info!("Access token rejected, refreshing");
        let request = TokenRefreshRequest {
            grant_type: "refresh_token",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            refresh_token: &refresh,
        };

        let response = self
            .http
            .post(self.token_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncError::TokenRefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::TokenRefreshFailed(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::TokenRefreshFailed(e.to_string()))?;

        self.kv.put(KV_ACCESS_TOKEN, &token.access_token, None).await?;
        tokens.access = Some(token.access_token);
        if let Some(refresh) = token.refresh_token {
            self.kv.put(KV_REFRESH_TOKEN, &refresh, None).await?;
            tokens.refresh = Some(refresh);
        }
        Ok(())
    }
}

/// Compares phone numbers on digits only, so formatting differences
/// ("(02) 9999-0001" vs "02 9999 0001") don't block a match.
fn same_phone(a: &str, b: &str) -> bool {
    let digits = |s: &str| s.chars().filter(char::is_ascii_digit).collect::<String>();
    let (a, b) = (digits(a), digits(b));
    !a.is_empty() && a == b
}

/// Parses a `Retry-After` header in whole seconds.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("Retry-After")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// =============================================================================
// PosApi Implementation
// =============================================================================

#[async_trait]
impl PosApi for ApiClient {
    async fn get_sites(&self) -> SyncResult<Vec<RemoteSite>> {
        self.get(&self.company_path("sites"), &[]).await
    }

    async fn get_inventory(&self, site_id: i64) -> SyncResult<Vec<RemoteInventoryLevel>> {
        let path = self.company_path(&format!("sites/{site_id}/inventory"));
        let mut all = Vec::new();
        let mut start: Option<i64> = None;

        loop {
            let query: Vec<(&str, String)> = match start {
                Some(last_id) => vec![("start", last_id.to_string())],
                None => Vec::new(),
            };
            let page: Vec<RemoteInventoryLevel> = self.get(&path, &query).await?;
            let short = page.len() < self.page_size;
            start = page.last().map(|level| level.id);
            all.extend(page);

            if short || start.is_none() {
                break;
            }
        }

        debug!(site_id, levels = all.len(), "Fetched site inventory");
        Ok(all)
    }

    async fn get_product(&self, product_id: i64) -> SyncResult<RemoteProduct> {
        self.get(&self.company_path(&format!("products/{product_id}")), &[])
            .await
    }

    async fn get_categories(&self) -> SyncResult<Vec<RemoteCategory>> {
        self.get(&self.company_path("categories"), &[]).await
    }

    async fn find_customer_by_email(&self, email: &str) -> SyncResult<Option<RemoteCustomer>> {
        let matches: Vec<RemoteCustomer> = self
            .get(
                &self.company_path("customers"),
                &[("email", email.to_string())],
            )
            .await?;
        Ok(matches.into_iter().next())
    }

    async fn find_customer_by_name(
        &self,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
    ) -> SyncResult<Option<RemoteCustomer>> {
        let matches: Vec<RemoteCustomer> = self
            .get(
                &self.company_path("customers"),
                &[("search", format!("{first_name} {last_name}"))],
            )
            .await?;

        // A shared name alone is too weak a key when the order carries a
        // phone number; require it to agree
        match phone {
            Some(phone) => Ok(matches
                .into_iter()
                .find(|c| c.phone.as_deref().is_some_and(|p| same_phone(p, phone)))),
            None => Ok(matches.into_iter().next()),
        }
    }

    async fn create_customer(&self, customer: &NewCustomer) -> SyncResult<RemoteCustomer> {
        let body = serde_json::to_value(customer)?;
        let value = self
            .send_json(Method::POST, &self.company_path("customers"), &[], Some(&body))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| SyncError::DeserializationFailed(e.to_string()))
    }

    async fn create_order(&self, order: &NewOrder) -> SyncResult<Option<RemoteOrderSummary>> {
        let body = serde_json::to_value(order)?;
        let value = self
            .send_json(Method::POST, &self.company_path("orders"), &[], Some(&body))
            .await?;

        if value.is_null() {
            warn!(sale_number = %order.sale_number, "Order create returned no body");
            return Ok(None);
        }
        let summary = serde_json::from_value(value)
            .map_err(|e| SyncError::DeserializationFailed(e.to_string()))?;
        Ok(Some(summary))
    }

    async fn search_orders(
        &self,
        created_since: DateTime<Utc>,
    ) -> SyncResult<Vec<RemoteOrderSummary>> {
        self.get(
            &self.company_path("orders"),
            &[("created_gte", created_since.to_rfc3339())],
        )
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_db::{Database, DbConfig};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer, page_size: usize) -> ApiClient {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = ApiConfig {
            base_url: format!("{}/", server.uri()),
            token_url: format!("{}/token", server.uri()),
            company_id: 42,
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            access_token: Some("tok-1".to_string()),
            refresh_token: Some("ref-1".to_string()),
            page_size,
            ..ApiConfig::default()
        };
        // Generous bucket so tests never sleep on admission
        let limiter = RateLimiter::new(db.kv(), 10_000, Duration::from_secs(60));
        ApiClient::new(&config, db.kv(), limiter).unwrap()
    }

    fn inventory_page(range: std::ops::Range<i64>) -> serde_json::Value {
        serde_json::Value::Array(
            range
                .map(|id| serde_json::json!({"id": id, "stock": 1.0}))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_inventory_pagination_cursors_on_last_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/companies/42/sites/4/inventory"))
            .and(query_param("start", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(inventory_page(4..6)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/companies/42/sites/4/inventory"))
            .respond_with(ResponseTemplate::new(200).set_body_json(inventory_page(1..4)))
            .mount(&server)
            .await;

        let client = client_for(&server, 3).await;
        let levels = client.get_inventory(4).await.unwrap();

        assert_eq!(levels.len(), 5);
        assert_eq!(levels.first().unwrap().id, 1);
        assert_eq!(levels.last().unwrap().id, 5);
    }

    #[tokio::test]
    async fn test_429_is_absorbed_then_request_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/companies/42/sites"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("Retry-After", "0"),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/companies/42/sites"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"id": 4, "name": "Main"}])),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, 100).await;
        let sites = client.get_sites().await.unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].id, 4);
    }

    #[tokio::test]
    async fn test_persistent_429_surfaces_after_bound() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/companies/42/sites"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .mount(&server)
            .await;

        let client = client_for(&server, 100).await;
        let result = client.get_sites().await;
        assert!(matches!(result, Err(SyncError::RateLimited { .. })));

        // Bounded: initial attempt + max_rate_limit_retries re-sends
        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 4);
    }

    #[tokio::test]
    async fn test_401_refreshes_token_once_and_persists_it() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/companies/42/sites"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-2",
                "refresh_token": "ref-2",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/companies/42/sites"))
            .and(header("Authorization", "Bearer tok-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = client_for(&server, 100).await;
        let sites = client.get_sites().await.unwrap();
        assert!(sites.is_empty());

        // Rotated tokens land in the option store
        let stored: Option<String> = client.kv.get(KV_ACCESS_TOKEN).await.unwrap();
        assert_eq!(stored.as_deref(), Some("tok-2"));
        let refresh: Option<String> = client.kv.get(KV_REFRESH_TOKEN).await.unwrap();
        assert_eq!(refresh.as_deref(), Some("ref-2"));
    }

    #[tokio::test]
    async fn test_terminal_4xx_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/companies/42/products/9"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = client_for(&server, 100).await;
        let result = client.get_product(9).await;
        assert!(matches!(result, Err(SyncError::ApiStatus { status: 404, .. })));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_name_search_disambiguates_same_name_by_phone() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/companies/42/customers"))
            .and(query_param("search", "Jo Bloggs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "first_name": "Jo", "last_name": "Bloggs", "phone": "02 9999 0001"},
                {"id": 2, "first_name": "Jo", "last_name": "Bloggs", "phone": "(02) 9999-0002"}
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server, 100).await;

        // The second customer matches on digits despite formatting
        let found = client
            .find_customer_by_name("Jo", "Bloggs", Some("0299990002"))
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.id), Some(2));

        // An unknown phone never falls back to a name-only match
        let none = client
            .find_customer_by_name("Jo", "Bloggs", Some("0299990009"))
            .await
            .unwrap();
        assert!(none.is_none());

        // Without a phone the first name match stands
        let first = client
            .find_customer_by_name("Jo", "Bloggs", None)
            .await
            .unwrap();
        assert_eq!(first.map(|c| c.id), Some(1));
    }

    #[tokio::test]
    async fn test_empty_create_body_is_ambiguous_not_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/companies/42/orders"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server, 100).await;
        let order = NewOrder {
            sale_number: "WC-1".to_string(),
            status: "COMPLETE".to_string(),
            site_id: 4,
            customer_id: None,
            notes: None,
            lines: vec![],
            payments: vec![],
        };

        let created = client.create_order(&order).await.unwrap();
        assert!(created.is_none());
    }
}
