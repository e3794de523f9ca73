//! Item service - schema-validated catalogue entries for the platform
//!
//! Stores items of every type (venues, offerings, articles, ...) with their
//! typed links, ordered collections and ownership claims. Listing queries
//! combine the local store with the external search index. The reconcilers
//! in [`reconcile`] keep the search index, item statistics and the product
//! catalogue in step with item changes.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod schema;
pub mod services;

pub use config::{Args, ReconcilerArgs};
pub use error::ItemError;
pub use http::{run, AppState};
pub use services::{Context, Services};
