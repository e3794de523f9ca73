//! SQLite storage for items and everything hanging off them
//!
//! ## Tables
//!
//! - `items` - every item regardless of type; type-specific fields live in `attrs`
//! - `item_tags` - one row per (item, tag) for tag filtering
//! - `item_statistics` - rank and upvotes, created together with the item
//! - `item_link_types` / `item_links` - typed links, inverse rows paired by `inverse_id`
//! - `item_colls` / `item_colls_items` - named collections with gap-free 1-based `idx`
//! - `ownership_claims` - requests to take ownership of an item
//! - `events` - audit rows written in the same transaction as the change

pub mod models;
pub mod schema;

use diesel::connection::SimpleConnection;
use tracing::info;

use platform_core::db::{self as core_db, DbPool};

use crate::error::ItemError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY NOT NULL,
    item_type TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    lang TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    featured_picture TEXT NOT NULL,
    pictures TEXT NOT NULL,
    tags TEXT NOT NULL,
    urls TEXT NOT NULL,
    attrs TEXT NOT NULL,
    approval TEXT NOT NULL,
    creator TEXT NOT NULL,
    owner TEXT NOT NULL,
    ownership TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_items_type ON items(item_type);
CREATE INDEX IF NOT EXISTS idx_items_owner ON items(owner);
CREATE INDEX IF NOT EXISTS idx_items_created ON items(created_at);

CREATE TABLE IF NOT EXISTS item_tags (
    item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (item_id, tag)
);
CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag);

CREATE TABLE IF NOT EXISTS item_statistics (
    item_id TEXT PRIMARY KEY NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    rank REAL NOT NULL DEFAULT 0,
    upvotes INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS item_link_types (
    name TEXT PRIMARY KEY NOT NULL,
    origin_types TEXT NOT NULL,
    target_types TEXT NOT NULL,
    unique_origin BOOLEAN NOT NULL DEFAULT 0,
    ownership TEXT NOT NULL,
    is_inverse BOOLEAN NOT NULL DEFAULT 0,
    inverse TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS item_links (
    id TEXT PRIMARY KEY NOT NULL,
    inverse_id TEXT REFERENCES item_links(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    origin TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    target TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL REFERENCES item_link_types(name),
    owner TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_item_links_origin ON item_links(origin, link_type);
CREATE INDEX IF NOT EXISTS idx_item_links_target ON item_links(target);
CREATE INDEX IF NOT EXISTS idx_item_links_inverse ON item_links(inverse_id);

CREATE TABLE IF NOT EXISTS item_colls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    owner TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS item_colls_items (
    coll_id INTEGER NOT NULL REFERENCES item_colls(id) ON DELETE CASCADE,
    idx INTEGER NOT NULL,
    item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    PRIMARY KEY (coll_id, idx),
    UNIQUE (coll_id, item_id)
);
CREATE INDEX IF NOT EXISTS idx_item_colls_items_item ON item_colls_items(item_id);

CREATE TABLE IF NOT EXISTS ownership_claims (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_claims_owner ON ownership_claims(owner_id);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Link types every deployment starts with. Inverse rows carry the
/// ownership class seen from their own origin.
const SEED_LINK_TYPES_SQL: &str = r#"
INSERT OR IGNORE INTO item_link_types
    (name, origin_types, target_types, unique_origin, ownership, is_inverse, inverse)
VALUES
    ('product-has-offerings',
     '["fresh-food","packaged-food","cosmetics","dish","fashion","homeware"]',
     '["offering"]', 0, 'owner-to-owner', 0, 'offering-of-product'),
    ('offering-of-product',
     '["offering"]',
     '["fresh-food","packaged-food","cosmetics","dish","fashion","homeware"]',
     0, 'owner-to-owner', 1, 'product-has-offerings'),
    ('hotel-has-rooms', '["hotel"]', '["room"]', 0, 'owner-to-owner', 0, 'room-of-hotel'),
    ('room-of-hotel', '["room"]', '["hotel"]', 0, 'owner-to-owner', 1, 'hotel-has-rooms'),
    ('venue-sells-products',
     '["restaurant","hotel","shop","cafe"]',
     '["fresh-food","packaged-food","cosmetics","dish","fashion","homeware"]',
     0, 'owner-to-any', 0, 'product-sold-at'),
    ('product-sold-at',
     '["fresh-food","packaged-food","cosmetics","dish","fashion","homeware"]',
     '["restaurant","hotel","shop","cafe"]',
     0, 'any-to-owner', 1, 'venue-sells-products'),
    ('recipe-uses-products',
     '["recipe"]',
     '["fresh-food","packaged-food","cosmetics","dish","fashion","homeware"]',
     0, 'owner-to-any', 0, ''),
    ('media-mentions-item', '["job-ad","post","recipe","article"]', '[]', 0, 'owner-to-any', 0, ''),
    ('job-ad-for-venue', '["job-ad"]', '["restaurant","hotel","shop","cafe"]', 1, 'any-to-owner', 0, '');
"#;

/// Open the pool, create the tables and seed the link types
pub async fn open(database_url: &str) -> Result<DbPool, ItemError> {
    info!("Opening item database at {}", database_url);
    let pool = core_db::connect(database_url, 16)?;
    core_db::run(&pool, |conn| {
        conn.batch_execute(SCHEMA_SQL)?;
        conn.batch_execute(SEED_LINK_TYPES_SQL)?;
        Ok::<_, ItemError>(())
    })
    .await?;
    Ok(pool)
}
