//! Gateway - the single public entry point of the platform
//!
//! Applies origin-aware CORS, double-submit CSRF and credential extraction
//! to every request, serves the email login flow itself, and reverse-proxies
//! everything else to the backend services with server-derived `X-Auth-*`
//! headers.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod server;
pub mod sessions;
pub mod sites;

pub use config::Args;
pub use error::GatewayError;
pub use server::{run, AppState};
