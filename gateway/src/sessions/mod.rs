//! Login tokens, sessions and their invalidation

pub mod fanout;
pub mod store;

pub use store::{LoginRequest, Session, SessionStore};
