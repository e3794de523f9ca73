//! Typed clients for the collaborator services
//!
//! Each collaborator is a trait so services can be tested against mocks; the
//! `Http*` implementations talk JSON over reqwest and identify themselves as
//! `X-Auth-Method: service-client`. None of them retry; the category
//! start-up fetch is the only retry loop.

pub mod catalogue;
pub mod categories;
pub mod search;
pub mod sites;
pub mod social;
pub mod users;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{AuthInfo, X_AUTH_IS_ADMIN, X_AUTH_METHOD};
use crate::error::CoreError;

pub use catalogue::{CatalogueClient, CatalogueProduct, HttpCatalogueClient};
pub use categories::{CategoryClient, HttpCategoryClient};
pub use search::{GeoPoint, HttpSearchIndexClient, SearchIndexClient, SearchInfo};
pub use sites::{HttpSiteClient, Site, SiteClient};
pub use social::{HttpSocialClient, SocialClient};
pub use users::{ApiKeyUser, HttpUserClient, Info, OrgMembership, User, UserClient};

/// JSON-over-HTTP access to one backend service
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    service: &'static str,
    bearer: Option<String>,
}

impl ServiceClient {
    pub fn new(http: reqwest::Client, base_url: &str, service: &'static str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
            bearer: None,
        }
    }

    /// Attach a bearer token to every call (external APIs)
    pub fn with_bearer(mut self, token: String) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let service_auth = AuthInfo::service_client();
        let mut builder = self
            .http
            .request(method, self.url(path))
            .header(X_AUTH_METHOD, service_auth.method.as_str())
            .header(X_AUTH_IS_ADMIN, "true");
        if let Some(ref token) = self.bearer {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, CoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| CoreError::upstream(self.service, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CoreError::NotFound(format!("{} {}", self.service, response.url().path())));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::upstream(self.service, format!("{}: {}", status, body)));
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, CoreError> {
        response
            .json::<T>()
            .await
            .map_err(|e| CoreError::upstream(self.service, format!("Bad response body: {}", e)))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CoreError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        self.decode(response).await
    }

    /// GET that maps 404 to `None`
    pub async fn get_json_opt<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, CoreError> {
        match self.get_json(path).await {
            Ok(value) => Ok(Some(value)),
            Err(CoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CoreError> {
        let response = self.send(self.request(Method::POST, path).json(body)).await?;
        self.decode(response).await
    }

    pub async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), CoreError> {
        self.send(self.request(Method::PUT, path).json(body)).await?;
        Ok(())
    }

    /// DELETE; a 404 counts as already deleted
    pub async fn delete(&self, path: &str) -> Result<(), CoreError> {
        match self.send(self.request(Method::DELETE, path)).await {
            Ok(_) | Err(CoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Join ids for a `?ids=` query parameter
pub(crate) fn ids_query(ids: &[String]) -> String {
    ids.iter()
        .map(|id| urlencoding::encode(id).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}
