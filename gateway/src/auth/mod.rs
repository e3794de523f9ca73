//! Request authentication: cookies, CSRF and credential extraction

pub mod context;
pub mod cookies;
pub mod csrf;

pub use context::CredentialExtractor;
pub use csrf::Csrf;
