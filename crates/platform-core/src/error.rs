//! Error types shared by the platform crates

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Local I/O failed (randomness source or credential files)
    #[error("IO error: {0}")]
    Io(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Event bus error: {0}")]
    Bus(String),

    #[error("{service} service error: {message}")]
    Upstream { service: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Hash error: {0}")]
    Hash(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn upstream(service: &str, message: impl Into<String>) -> Self {
        CoreError::Upstream {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

impl From<diesel::result::Error> for CoreError {
    fn from(e: diesel::result::Error) -> Self {
        CoreError::Database(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for CoreError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        CoreError::Database(format!("Connection pool: {}", e))
    }
}
