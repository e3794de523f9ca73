//! External product catalogue client
//!
//! Items in the shopping collection are mirrored to a merchant catalogue.
//! Prices arrive in minor units (cents) and leave in major units.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ServiceClient;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    #[serde(rename = "in stock")]
    InStock,
    #[serde(rename = "out of stock")]
    OutOfStock,
}

impl Availability {
    pub fn from_quantity(available_quantity: i64) -> Self {
        if available_quantity > 0 {
            Availability::InStock
        } else {
            Availability::OutOfStock
        }
    }
}

/// One catalogue entry, keyed by the item id it mirrors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueProduct {
    pub id: String,
    pub sku: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_link: Option<String>,
    pub price: f64,
    pub currency: String,
    pub availability: Availability,
}

/// Digits after the decimal point for a currency
fn minor_unit_exponent(currency: &str) -> i32 {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "CLP" | "ISK" | "VND" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
        _ => 2,
    }
}

/// Convert a minor-unit amount to major units
pub fn to_major_units(minor: i64, currency: &str) -> f64 {
    minor as f64 / 10f64.powi(minor_unit_exponent(currency))
}

#[async_trait]
pub trait CatalogueClient: Send + Sync {
    async fn upsert_product(&self, product: &CatalogueProduct) -> Result<(), CoreError>;

    async fn delete_product(&self, id: &str) -> Result<(), CoreError>;
}

pub struct HttpCatalogueClient {
    client: ServiceClient,
}

impl HttpCatalogueClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        let client = ServiceClient::new(http, base_url, "catalogue");
        Self {
            client: match token {
                Some(token) => client.with_bearer(token),
                None => client,
            },
        }
    }
}

#[async_trait]
impl CatalogueClient for HttpCatalogueClient {
    async fn upsert_product(&self, product: &CatalogueProduct) -> Result<(), CoreError> {
        self.client
            .put_json(&format!("/products/{}", urlencoding::encode(&product.id)), product)
            .await
    }

    async fn delete_product(&self, id: &str) -> Result<(), CoreError> {
        self.client
            .delete(&format!("/products/{}", urlencoding::encode(id)))
            .await
    }
}
