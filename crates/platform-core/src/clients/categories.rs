//! Categories service client
//!
//! A category is a named list of labels, e.g. `cuisine -> [italian, thai]`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::ServiceClient;
use crate::error::CoreError;

/// Back-off between start-up fetch attempts
pub const STARTUP_RETRY_DELAY: Duration = Duration::from_secs(10);

#[async_trait]
pub trait CategoryClient: Send + Sync {
    /// All categories with their labels
    async fn categories(&self) -> Result<HashMap<String, Vec<String>>, CoreError>;
}

pub struct HttpCategoryClient {
    client: ServiceClient,
}

impl HttpCategoryClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            client: ServiceClient::new(http, base_url, "categories"),
        }
    }
}

#[async_trait]
impl CategoryClient for HttpCategoryClient {
    async fn categories(&self) -> Result<HashMap<String, Vec<String>>, CoreError> {
        self.client.get_json("/internal/categories").await
    }
}

/// Fetch categories, retrying until the service answers.
///
/// Only used at start-up; the service cannot validate items without them.
pub async fn fetch_until_ready(
    client: &dyn CategoryClient,
    retry_delay: Duration,
) -> HashMap<String, Vec<String>> {
    loop {
        match client.categories().await {
            Ok(categories) => {
                info!(count = categories.len(), "Loaded categories");
                return categories;
            }
            Err(e) => {
                warn!(error = %e, delay_secs = retry_delay.as_secs(), "Category fetch failed, retrying");
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}
