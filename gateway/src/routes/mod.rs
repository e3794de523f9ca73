//! HTTP routes for the gateway

pub mod auth_routes;
pub mod health;
pub mod proxy;
pub mod table;

pub use auth_routes::handle_auth_request;
pub use health::health_check;
pub use proxy::Proxy;
pub use table::{Backend, RouteMatch, RouteTable};
