//! Origin-aware CORS
//!
//! Only origins in the site registry get CORS headers, and they get them
//! with credentials allowed. A preflight from anywhere else is answered with
//! a bare 204, which the browser treats as a refusal.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
    ACCESS_CONTROL_MAX_AGE, VARY,
};
use hyper::Response;

use platform_core::response;

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE";
pub const ALLOWED_HEADERS: &str = "Content-Type, X-CSRF-Token, X-Api-Key, X-Api-Secret";
pub const EXPOSED_HEADERS: &str = "X-CSRF-Token";

/// Add the per-origin CORS headers to a response
pub fn decorate(response: &mut Response<Full<Bytes>>, origin: &str) {
    let Ok(origin) = HeaderValue::from_str(origin) else {
        return;
    };
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static(EXPOSED_HEADERS));
    headers.append(VARY, HeaderValue::from_static("Origin"));
}

/// Answer an `OPTIONS` preflight
pub fn preflight(origin: Option<&str>) -> Response<Full<Bytes>> {
    let mut response = response::no_content();

    if let Some(origin) = origin {
        decorate(&mut response, origin);
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    }
    response
}
