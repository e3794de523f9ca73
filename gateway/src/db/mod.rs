//! SQLite storage for login tokens and sessions
//!
//! ## Tables
//!
//! - `login_tokens` - single-use 6-digit codes with an expiry
//! - `sessions` - opaque session tokens, the only record of who is logged in

pub mod models;
pub mod schema;

use diesel::connection::SimpleConnection;
use tracing::info;

use platform_core::db::{self as core_db, DbPool};

use crate::error::GatewayError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS login_tokens (
    token TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL,
    site TEXT NOT NULL,
    language TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_login_tokens_email ON login_tokens(email);
CREATE INDEX IF NOT EXISTS idx_login_tokens_expires ON login_tokens(expires_at);

CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    email TEXT NOT NULL,
    is_admin BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
"#;

/// Open the pool and make sure the tables exist
pub async fn open(database_url: &str) -> Result<DbPool, GatewayError> {
    info!("Opening gateway database at {}", database_url);
    let pool = core_db::connect(database_url, 16)?;
    core_db::run(&pool, |conn| {
        conn.batch_execute(SCHEMA_SQL).map_err(GatewayError::from)
    })
    .await?;
    Ok(pool)
}
