//! Credential extraction
//!
//! Turns a session cookie or an API key/secret pair into an [`AuthInfo`].
//! Extraction never rejects a request; routes decide what they require.

use std::sync::Arc;

use hyper::header::HeaderMap;
use tracing::{debug, warn};

use platform_core::clients::UserClient;
use platform_core::{ids, AuthInfo};

use super::cookies::{get_cookie, SESSION_COOKIE};
use crate::error::GatewayError;
use crate::sessions::SessionStore;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_SECRET_HEADER: &str = "x-api-secret";

pub struct CredentialExtractor {
    sessions: SessionStore,
    users: Arc<dyn UserClient>,
}

impl CredentialExtractor {
    pub fn new(sessions: SessionStore, users: Arc<dyn UserClient>) -> Self {
        Self { sessions, users }
    }

    pub async fn extract(&self, headers: &HeaderMap) -> AuthInfo {
        if let Some(token) = get_cookie(headers, SESSION_COOKIE) {
            match self.sessions.lookup_session(&token).await {
                Ok(session) => return AuthInfo::session(&session.user_id, session.is_admin),
                Err(GatewayError::SessionNotFound) => debug!("Stale session cookie"),
                Err(e) => warn!(error = %e, "Session lookup failed"),
            }
        }

        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        };
        if let (Some(key), Some(secret)) = (header(API_KEY_HEADER), header(API_SECRET_HEADER)) {
            match self.users.api_key_user(key).await {
                Ok(Some(user)) if ids::compare(&user.api_secret_hash, secret) => {
                    return AuthInfo::api_key(&user.id, user.is_admin);
                }
                Ok(_) => debug!("API key or secret did not match"),
                Err(e) => warn!(error = %e, "API key lookup failed"),
            }
        }

        AuthInfo::none()
    }
}
