//! User service client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ids_query, ServiceClient};
use crate::error::CoreError;

/// Public card for a user or organisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A user record as returned by the login call.
///
/// Fields beyond the ones the gateway needs pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The user owning an API key, with the stored secret hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyUser {
    pub id: String,
    #[serde(default)]
    pub is_admin: bool,
    pub api_secret_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMembership {
    pub org_id: String,
    #[serde(default)]
    pub is_org_admin: bool,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    site: &'a str,
    language: &'a str,
}

#[async_trait]
pub trait UserClient: Send + Sync {
    /// Log a user in by email, creating the account on first login
    async fn login(&self, email: &str, site: &str, language: &str) -> Result<User, CoreError>;

    /// Look up the owner of an API key
    async fn api_key_user(&self, api_key: &str) -> Result<Option<ApiKeyUser>, CoreError>;

    /// Batch info for user and org ids; unknown ids are omitted
    async fn info(&self, ids: &[String]) -> Result<Vec<Info>, CoreError>;

    /// Organisations the user belongs to
    async fn orgs(&self, user_id: &str) -> Result<Vec<OrgMembership>, CoreError>;
}

pub struct HttpUserClient {
    client: ServiceClient,
}

impl HttpUserClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            client: ServiceClient::new(http, base_url, "users"),
        }
    }
}

#[async_trait]
impl UserClient for HttpUserClient {
    async fn login(&self, email: &str, site: &str, language: &str) -> Result<User, CoreError> {
        self.client
            .post_json("/internal/login", &LoginRequest { email, site, language })
            .await
    }

    async fn api_key_user(&self, api_key: &str) -> Result<Option<ApiKeyUser>, CoreError> {
        self.client
            .get_json_opt(&format!("/internal/api-key/{}", urlencoding::encode(api_key)))
            .await
    }

    async fn info(&self, ids: &[String]) -> Result<Vec<Info>, CoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        self.client.get_json(&format!("/info?ids={}", ids_query(ids))).await
    }

    async fn orgs(&self, user_id: &str) -> Result<Vec<OrgMembership>, CoreError> {
        let orgs: Option<Vec<OrgMembership>> = self
            .client
            .get_json_opt(&format!("/internal/user/{}/orgs", urlencoding::encode(user_id)))
            .await?;
        Ok(orgs.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_login_posts_and_keeps_extra_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/login"))
            .and(header("x-auth-method", "service-client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "usr_1", "email": "test@testing.com", "is_admin": false, "country": "DE"
            })))
            .mount(&server)
            .await;

        let client = HttpUserClient::new(reqwest::Client::new(), &server.uri());
        let user = client.login("test@testing.com", "ethicalbuzz", "en").await.unwrap();
        assert_eq!(user.id, "usr_1");
        assert_eq!(user.extra["country"], "DE");

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["country"], "DE");
        assert_eq!(json["is_admin"], false);
    }

    #[tokio::test]
    async fn test_unknown_api_key_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/api-key/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpUserClient::new(reqwest::Client::new(), &server.uri());
        assert!(client.api_key_user("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_info_batches_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .and(query_param("ids", "usr_1,org_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "usr_1", "name": "Ana"},
                {"id": "org_2", "name": "Green Co"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpUserClient::new(reqwest::Client::new(), &server.uri());
        let infos = client
            .info(&["usr_1".to_string(), "org_2".to_string()])
            .await
            .unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[1].name, "Green Co");
    }

    #[tokio::test]
    async fn test_server_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpUserClient::new(reqwest::Client::new(), &server.uri());
        let err = client.orgs("usr_1").await.unwrap_err();
        assert!(matches!(err, CoreError::Upstream { .. }));
    }
}
