//! # Remote API Types
//!
//! Typed request and response payloads for the POS API. Bodies are decoded
//! into these structs once, at the client boundary; raw JSON maps never
//! cross into the services.
//!
//! Remote money amounts are decimal floats on the wire and are normalized
//! to [`Money`] (integer cents) immediately after decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bridge_core::Money;

// =============================================================================
// Authentication
// =============================================================================

/// Response from the OAuth token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Refresh-grant request body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRefreshRequest<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub refresh_token: &'a str,
}

// =============================================================================
// Catalog
// =============================================================================

/// A site (physical location) within the remote company.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSite {
    pub id: i64,
    pub name: String,
}

/// One entry of a site inventory page: item id and its stock on hand.
/// Stock can be fractional (weighed goods).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteInventoryLevel {
    pub id: i64,
    pub stock: f64,
}

/// A product as the remote reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProduct {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Remote SKU field.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    /// Per-site stock and price overrides.
    #[serde(default)]
    pub sites: Vec<RemoteProductSite>,
}

/// Site-specific sub-record of a product detail.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProductSite {
    pub site_id: i64,
    #[serde(default)]
    pub stock: Option<f64>,
    #[serde(default)]
    pub unit_price: Option<f64>,
}

impl RemoteProduct {
    /// The base unit price in cents, when the remote reports one.
    pub fn price(&self) -> Option<Money> {
        self.unit_price.map(Money::from_remote)
    }

    /// The sub-record for a site, if the product is ranged there.
    pub fn site(&self, site_id: i64) -> Option<&RemoteProductSite> {
        self.sites.iter().find(|site| site.site_id == site_id)
    }

    /// The effective price at a site: the site override when present,
    /// else the base price.
    pub fn price_at(&self, site_id: i64) -> Option<Money> {
        self.site(site_id)
            .and_then(|site| site.unit_price)
            .map(Money::from_remote)
            .or_else(|| self.price())
    }
}

/// A product category.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCategory {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub products: Vec<i64>,
}

// =============================================================================
// Customers
// =============================================================================

/// A customer record on the remote side.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCustomer {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Payload for creating a customer.
#[derive(Debug, Clone, Serialize)]
pub struct NewCustomer {
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

// =============================================================================
// Orders
// =============================================================================

/// One line of an order payload. `unit_price` is decimal on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrderLine {
    pub product_id: i64,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One payment of an order payload.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrderPayment {
    pub method_id: i64,
    pub amount: f64,
}

/// Payload for creating an order on the remote side.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub sale_number: String,
    pub status: String,
    pub site_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub lines: Vec<NewOrderLine>,
    pub payments: Vec<NewOrderPayment>,
}

/// An order as listed by the remote, used for idempotency search.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrderSummary {
    pub id: i64,
    #[serde(default)]
    pub sale_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteOrderSummary {
    /// The order total in cents, when the remote reports one.
    pub fn total_amount(&self) -> Option<Money> {
        self.total.map(Money::from_remote)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_page_decodes() {
        let page: Vec<RemoteInventoryLevel> =
            serde_json::from_str(r#"[{"id": 101, "stock": 4.5}, {"id": 102, "stock": 0}]"#)
                .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0], RemoteInventoryLevel { id: 101, stock: 4.5 });
    }

    #[test]
    fn test_product_tolerates_missing_optionals() {
        let product: RemoteProduct =
            serde_json::from_str(r#"{"id": 7, "name": "Flat White"}"#).unwrap();
        assert_eq!(product.id, 7);
        assert!(product.code.is_none());
        assert!(product.tags.is_empty());
        assert!(product.price().is_none());

        let priced: RemoteProduct =
            serde_json::from_str(r#"{"id": 8, "name": "Mocha", "unit_price": 4.5}"#).unwrap();
        assert_eq!(priced.price(), Some(Money::from_cents(450)));
    }

    #[test]
    fn test_site_override_beats_base_price() {
        let product: RemoteProduct = serde_json::from_str(
            r#"{"id": 8, "name": "Mocha", "unit_price": 4.5,
                "sites": [{"site_id": 4, "stock": 12.0, "unit_price": 5.0}]}"#,
        )
        .unwrap();

        assert_eq!(product.price_at(4), Some(Money::from_cents(500)));
        assert_eq!(product.price_at(9), Some(Money::from_cents(450)));
        assert_eq!(product.site(4).unwrap().stock, Some(12.0));
        assert!(product.site(9).is_none());
    }

    #[test]
    fn test_token_response_decodes_without_refresh_token() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc", "expires_in": 3600}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_order_summary_total_in_cents() {
        let summary: RemoteOrderSummary = serde_json::from_str(
            r#"{"id": 9001, "sale_number": "WC-1234", "total": 21.9,
                "created_at": "2026-08-01T10:30:00Z"}"#,
        )
        .unwrap();
        assert_eq!(summary.total_amount(), Some(Money::from_cents(2190)));
        assert_eq!(summary.sale_number.as_deref(), Some("WC-1234"));
    }

    #[test]
    fn test_new_order_serializes_without_empty_optionals() {
        let order = NewOrder {
            sale_number: "WC-55".to_string(),
            status: "COMPLETE".to_string(),
            site_id: 4,
            customer_id: None,
            notes: None,
            lines: vec![NewOrderLine {
                product_id: 7,
                quantity: 2.0,
                unit_price: 4.5,
                notes: None,
            }],
            payments: vec![NewOrderPayment { method_id: 1, amount: 9.0 }],
        };

        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("customer_id").is_none());
        assert_eq!(json["lines"][0]["product_id"], 7);
        assert_eq!(json["payments"][0]["amount"], 9.0);
    }
}
