//! Social service client (ranks and upvotes)

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;

use super::{ids_query, ServiceClient};
use crate::error::CoreError;

#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Overall rank of an item
    async fn item_rank(&self, item_id: &str) -> Result<f64, CoreError>;

    /// Upvote totals for every item that has any
    async fn upvote_counts(&self) -> Result<HashMap<String, i64>, CoreError>;

    /// Which of `item_ids` the user has upvoted
    async fn user_upvotes(&self, user_id: &str, item_ids: &[String]) -> Result<HashSet<String>, CoreError>;
}

#[derive(Deserialize)]
struct RankResponse {
    rank: f64,
}

pub struct HttpSocialClient {
    client: ServiceClient,
}

impl HttpSocialClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            client: ServiceClient::new(http, base_url, "social"),
        }
    }
}

#[async_trait]
impl SocialClient for HttpSocialClient {
    async fn item_rank(&self, item_id: &str) -> Result<f64, CoreError> {
        let response: RankResponse = self
            .client
            .get_json(&format!("/item/{}/rank", urlencoding::encode(item_id)))
            .await?;
        Ok(response.rank)
    }

    async fn upvote_counts(&self) -> Result<HashMap<String, i64>, CoreError> {
        self.client.get_json("/upvotes/counts").await
    }

    async fn user_upvotes(&self, user_id: &str, item_ids: &[String]) -> Result<HashSet<String>, CoreError> {
        if item_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<String> = self
            .client
            .get_json(&format!(
                "/user/{}/upvotes?ids={}",
                urlencoding::encode(user_id),
                ids_query(item_ids)
            ))
            .await?;
        Ok(ids.into_iter().collect())
    }
}
