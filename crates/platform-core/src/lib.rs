//! Platform core - shared building blocks for the VeganBuzz services
//!
//! Everything the gateway and the item service both need lives here:
//!
//! - [`ids`]: prefixed random ids, numeric login tokens, secret hashing
//! - [`events`]: topic publish/subscribe with fan-out or competing consumers
//! - [`cache`]: bounded user/org info caches invalidated over the event bus
//! - [`clients`]: typed HTTP clients for the collaborator services
//! - [`auth`]: the request-scoped auth value and its `X-Auth-*` header form
//! - [`db`]: the SQLite connection pool both services run on
//! - [`response`]: JSON response helpers with the `{"message": ...}` error body

pub mod auth;
pub mod cache;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ids;
pub mod logging;
pub mod response;

pub use auth::{AuthInfo, AuthMethod};
pub use error::CoreError;
pub use events::{Delivery, EventBus, Message, Subscription};
