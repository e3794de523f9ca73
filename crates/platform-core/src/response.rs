//! HTTP response building helpers
//!
//! Every error body is `{"message": "..."}`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CoreError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize + ?Sized>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Build a `{"message": ...}` response
pub fn message(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "message": message }))
}

pub fn bad_request(msg: &str) -> Response<Full<Bytes>> {
    message(StatusCode::BAD_REQUEST, msg)
}

pub fn unauthorized() -> Response<Full<Bytes>> {
    message(StatusCode::UNAUTHORIZED, "Unauthorized")
}

pub fn forbidden(msg: &str) -> Response<Full<Bytes>> {
    message(StatusCode::FORBIDDEN, msg)
}

pub fn not_found(msg: &str) -> Response<Full<Bytes>> {
    message(StatusCode::NOT_FOUND, msg)
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    message(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub fn internal_error(msg: &str) -> Response<Full<Bytes>> {
    message(StatusCode::INTERNAL_SERVER_ERROR, msg)
}

pub fn service_unavailable(msg: &str) -> Response<Full<Bytes>> {
    message(StatusCode::SERVICE_UNAVAILABLE, msg)
}

/// Read a request body, refusing anything over `limit` bytes
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, CoreError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Limited::new(body, limit)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| CoreError::BadRequest(format!("Failed to read body: {}", e)))
}

/// Read and decode a JSON request body
pub async fn read_json<T, B>(body: B, limit: usize) -> Result<T, CoreError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = read_body(body, limit).await?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::BadRequest(format!("Invalid JSON: {}", e)))
}
