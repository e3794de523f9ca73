//! HTTP server

pub mod cors;
pub mod http;
pub mod middleware;

pub use http::{handle_request, run, AppState};
