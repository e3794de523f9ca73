//! Liveness probe with a database ping

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::warn;

use platform_core::response;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
}

pub async fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let database = match state.sessions.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "Health check database ping failed");
            "unavailable"
        }
    };
    let (status, code) = match database {
        "ok" => ("ok", StatusCode::OK),
        _ => ("degraded", StatusCode::SERVICE_UNAVAILABLE),
    };
    response::json_response(
        code,
        &HealthResponse {
            status,
            database,
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}
