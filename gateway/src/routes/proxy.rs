//! Reverse proxy to the backend services
//!
//! The outgoing request carries the client's headers minus hop-by-hop
//! headers, credentials and any `X-Auth-*` the client sent; the `X-Auth-*`
//! set is then written from the server-side auth value. Dropping the future
//! (client gone) drops the in-flight upstream call with it.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::HeaderMap;
use hyper::{Request, Response};
use tracing::debug;

use platform_core::auth::AUTH_HEADERS;
use platform_core::config::ServiceUrls;
use platform_core::response::read_body;
use platform_core::AuthInfo;

use super::table::Backend;
use crate::auth::context::{API_KEY_HEADER, API_SECRET_HEADER};
use crate::auth::csrf::CSRF_HEADER;
use crate::error::GatewayError;

/// Largest request body forwarded upstream
pub const MAX_BODY: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Request headers that stay at the gateway
const CREDENTIALS: [&str; 4] = ["cookie", API_KEY_HEADER, API_SECRET_HEADER, CSRF_HEADER];

/// Headers for the upstream request
pub fn outbound_headers(incoming: &HeaderMap, auth: &AuthInfo) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len());
    for (name, value) in incoming {
        let name_str = name.as_str();
        if HOP_BY_HOP.contains(&name_str)
            || CREDENTIALS.contains(&name_str)
            || name_str == "content-length"
            || name_str.starts_with("x-auth-")
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    auth.apply_to(&mut headers);
    headers
}

/// Headers passed back to the client
fn inbound_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        let name_str = name.as_str();
        if HOP_BY_HOP.contains(&name_str) || name_str == "content-length" {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

pub struct Proxy {
    http: reqwest::Client,
    services: ServiceUrls,
}

impl Proxy {
    pub fn new(http: reqwest::Client, services: ServiceUrls) -> Self {
        Self { http, services }
    }

    fn base_url(&self, backend: Backend) -> &str {
        let url = match backend {
            Backend::Users => &self.services.users_url,
            Backend::Items => &self.services.items_url,
            Backend::Search => &self.services.search_url,
            Backend::Categories => &self.services.categories_url,
            Backend::Payments => &self.services.payments_url,
        };
        url.trim_end_matches('/')
    }

    pub async fn forward<B>(
        &self,
        req: Request<B>,
        backend: Backend,
        auth: &AuthInfo,
    ) -> Result<Response<Full<Bytes>>, GatewayError>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url(backend), path_and_query);
        let body = read_body(body, MAX_BODY).await?;

        debug!(url = %url, method = %parts.method, "Proxying");
        let upstream = self
            .http
            .request(parts.method.clone(), &url)
            .headers(outbound_headers(&parts.headers, auth))
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("{:?} {}: {}", backend, url, e)))?;

        let status = upstream.status();
        let headers = inbound_headers(upstream.headers());
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(format!("{:?} {}: {}", backend, url, e)))?;

        let mut response = Response::new(Full::new(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
