//! Error types for the gateway

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use thiserror::Error;
use tracing::error;

use platform_core::{response, CoreError};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unknown login token")]
    UnknownLoginToken,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Could not allocate a unique login token")]
    TokenExhausted,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<diesel::result::Error> for GatewayError {
    fn from(e: diesel::result::Error) -> Self {
        GatewayError::Database(e.to_string())
    }
}

/// Map an error to a `{"message": ...}` response
pub fn error_response(err: GatewayError) -> Response<Full<Bytes>> {
    match &err {
        GatewayError::UnknownLoginToken => response::bad_request("Unknown login token"),
        GatewayError::BadRequest(msg) => response::bad_request(msg),
        GatewayError::Core(CoreError::BadRequest(msg)) => response::bad_request(msg),
        GatewayError::SessionNotFound | GatewayError::Unauthorized => response::unauthorized(),
        GatewayError::Upstream(msg) => {
            error!(error = %msg, "Upstream failure");
            response::message(StatusCode::BAD_GATEWAY, "Upstream service error")
        }
        GatewayError::Core(CoreError::Upstream { .. }) => {
            error!(error = %err, "Upstream failure");
            response::message(StatusCode::BAD_GATEWAY, "Upstream service error")
        }
        _ => {
            error!(error = %err, "Request failed");
            response::internal_error("Internal server error")
        }
    }
}
