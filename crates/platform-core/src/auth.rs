//! Request-scoped auth value
//!
//! The gateway derives an [`AuthInfo`] from the session cookie or API key and
//! forwards it to backends as `X-Auth-*` headers. Backends read those headers
//! back with [`AuthInfo::from_headers`]; they never see client-supplied values
//! because the gateway strips them first.

use hyper::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

pub const X_AUTH_METHOD: &str = "x-auth-method";
pub const X_AUTH_USER_ID: &str = "x-auth-user-id";
pub const X_AUTH_IS_ADMIN: &str = "x-auth-is-admin";

pub const AUTH_HEADERS: [&str; 3] = [X_AUTH_METHOD, X_AUTH_USER_ID, X_AUTH_IS_ADMIN];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    None,
    Session,
    ApiKey,
    ServiceClient,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Session => "session",
            AuthMethod::ApiKey => "api-key",
            AuthMethod::ServiceClient => "service-client",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "session" => AuthMethod::Session,
            "api-key" => AuthMethod::ApiKey,
            "service-client" => AuthMethod::ServiceClient,
            _ => AuthMethod::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub method: AuthMethod,
    pub user_id: String,
    pub is_admin: bool,
}

impl AuthInfo {
    pub fn none() -> Self {
        Self {
            method: AuthMethod::None,
            user_id: String::new(),
            is_admin: false,
        }
    }

    pub fn session(user_id: &str, is_admin: bool) -> Self {
        Self {
            method: AuthMethod::Session,
            user_id: user_id.to_string(),
            is_admin,
        }
    }

    pub fn api_key(user_id: &str, is_admin: bool) -> Self {
        Self {
            method: AuthMethod::ApiKey,
            user_id: user_id.to_string(),
            is_admin,
        }
    }

    /// Another internal service acting on its own behalf
    pub fn service_client() -> Self {
        Self {
            method: AuthMethod::ServiceClient,
            user_id: String::new(),
            is_admin: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.method != AuthMethod::None
    }

    /// An authenticated end user (session or API key)
    pub fn is_user(&self) -> bool {
        matches!(self.method, AuthMethod::Session | AuthMethod::ApiKey) && !self.user_id.is_empty()
    }

    pub fn is_admin(&self) -> bool {
        self.is_authenticated() && self.is_admin
    }

    /// Read the gateway-injected headers
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("");

        let method = AuthMethod::parse(get(X_AUTH_METHOD));
        if method == AuthMethod::None {
            return Self::none();
        }

        Self {
            method,
            user_id: get(X_AUTH_USER_ID).to_string(),
            is_admin: get(X_AUTH_IS_ADMIN) == "true",
        }
    }

    /// Replace any `X-Auth-*` headers with ones derived from this value
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        for name in AUTH_HEADERS {
            headers.remove(name);
        }

        headers.insert(X_AUTH_METHOD, HeaderValue::from_static(self.method.as_str()));
        if let Ok(value) = HeaderValue::from_str(&self.user_id) {
            headers.insert(X_AUTH_USER_ID, value);
        }
        headers.insert(
            X_AUTH_IS_ADMIN,
            HeaderValue::from_static(if self.is_admin { "true" } else { "false" }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_headers() {
        let auth = AuthInfo::api_key("usr_abc", true);
        let mut headers = HeaderMap::new();
        auth.apply_to(&mut headers);

        assert_eq!(headers.get(X_AUTH_METHOD).unwrap(), "api-key");
        assert_eq!(AuthInfo::from_headers(&headers), auth);
    }

    #[test]
    fn test_apply_replaces_client_values() {
        let mut headers = HeaderMap::new();
        headers.insert(X_AUTH_METHOD, HeaderValue::from_static("session"));
        headers.append(X_AUTH_USER_ID, HeaderValue::from_static("usr_evil"));
        headers.append(X_AUTH_USER_ID, HeaderValue::from_static("usr_evil2"));
        headers.insert(X_AUTH_IS_ADMIN, HeaderValue::from_static("true"));

        AuthInfo::none().apply_to(&mut headers);

        assert_eq!(headers.get_all(X_AUTH_USER_ID).iter().count(), 1);
        assert_eq!(headers.get(X_AUTH_USER_ID).unwrap(), "");
        assert_eq!(headers.get(X_AUTH_METHOD).unwrap(), "none");
        assert_eq!(headers.get(X_AUTH_IS_ADMIN).unwrap(), "false");
    }

    #[test]
    fn test_missing_headers_mean_none() {
        let auth = AuthInfo::from_headers(&HeaderMap::new());
        assert!(!auth.is_authenticated());
        assert!(!auth.is_admin());
    }
}
