//! Site service client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ServiceClient;
use crate::error::CoreError;

/// A front-end site served by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Short name used in emails and templates, e.g. `ethicalbuzz`
    pub name: String,
    /// Public origin, e.g. `https://ethicalbuzz.com`
    pub url: String,
}

#[async_trait]
pub trait SiteClient: Send + Sync {
    async fn sites(&self) -> Result<Vec<Site>, CoreError>;
}

pub struct HttpSiteClient {
    client: ServiceClient,
}

impl HttpSiteClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            client: ServiceClient::new(http, base_url, "sites"),
        }
    }
}

#[async_trait]
impl SiteClient for HttpSiteClient {
    async fn sites(&self) -> Result<Vec<Site>, CoreError> {
        self.client.get_json("/sites").await
    }
}
