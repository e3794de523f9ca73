//! Site registry

pub mod registry;

pub use registry::{start_watcher, SiteRegistry, DEFAULT_SITE};
