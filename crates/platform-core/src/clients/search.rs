//! Search index client (geo and full-text)
//!
//! The index itself is an external service. Lookups return item ids ordered
//! by relevance (distance for geo, score for text).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ServiceClient;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// What the index stores for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchInfo {
    pub id: String,
    pub item_type: String,
    pub lang: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub approval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

#[async_trait]
pub trait SearchIndexClient: Send + Sync {
    async fn geo(&self, point: GeoPoint, dist_km: f64) -> Result<Vec<String>, CoreError>;

    async fn full_text(&self, query: &str) -> Result<Vec<String>, CoreError>;

    async fn upsert(&self, info: &SearchInfo) -> Result<(), CoreError>;

    async fn delete(&self, item_id: &str) -> Result<(), CoreError>;
}

pub struct HttpSearchIndexClient {
    client: ServiceClient,
}

impl HttpSearchIndexClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            client: ServiceClient::new(http, base_url, "search"),
        }
    }
}

#[async_trait]
impl SearchIndexClient for HttpSearchIndexClient {
    async fn geo(&self, point: GeoPoint, dist_km: f64) -> Result<Vec<String>, CoreError> {
        self.client
            .get_json(&format!(
                "/index/geo?lat={}&lon={}&dist={}",
                point.lat, point.lon, dist_km
            ))
            .await
    }

    async fn full_text(&self, query: &str) -> Result<Vec<String>, CoreError> {
        self.client
            .get_json(&format!("/index/text?q={}", urlencoding::encode(query)))
            .await
    }

    async fn upsert(&self, info: &SearchInfo) -> Result<(), CoreError> {
        self.client
            .put_json(&format!("/index/{}", urlencoding::encode(&info.id)), info)
            .await
    }

    async fn delete(&self, item_id: &str) -> Result<(), CoreError> {
        self.client
            .delete(&format!("/index/{}", urlencoding::encode(item_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_geo_keeps_index_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index/geo"))
            .and(query_param("dist", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["i3", "i1", "i2"])))
            .mount(&server)
            .await;

        let client = HttpSearchIndexClient::new(reqwest::Client::new(), &server.uri());
        let ids = client
            .geo(GeoPoint { lat: 51.2, lon: 10.3 }, 100.0)
            .await
            .unwrap();
        assert_eq!(ids, vec!["i3", "i1", "i2"]);
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpSearchIndexClient::new(reqwest::Client::new(), &server.uri());
        client.delete("htl_gone").await.unwrap();
    }
}
