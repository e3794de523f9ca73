//! Repository layer
//!
//! Synchronous Diesel functions over a `SqliteConnection`. Callers run them
//! on the blocking pool through `platform_core::db::run`; every mutation
//! is one transaction that also appends to the `events` audit table.

pub mod claims;
pub mod collections;
pub mod events;
pub mod items;
pub mod links;
pub mod listing;
pub mod statistics;
