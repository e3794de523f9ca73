//! Cookie parsing and `Set-Cookie` construction
//!
//! `SameSite` is never set so front-ends on sibling subdomains keep working.

use hyper::header::{HeaderMap, COOKIE};

pub const SESSION_COOKIE: &str = "session";
pub const CSRF_COOKIE: &str = "_csrf";

/// Session cookies live for a year; logout clears them explicitly
const SESSION_MAX_AGE: u64 = 365 * 24 * 60 * 60;

const EPOCH: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Find a cookie value across all `Cookie` headers
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn with_flags(mut cookie: String, secure: bool) -> String {
    cookie.push_str("; Path=/; HttpOnly");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    with_flags(
        format!("{}={}; Max-Age={}", SESSION_COOKIE, token, SESSION_MAX_AGE),
        secure,
    )
}

/// Expire the session cookie in the browser
pub fn clear_session_cookie(secure: bool) -> String {
    with_flags(
        format!("{}=; Max-Age=0; Expires={}", SESSION_COOKIE, EPOCH),
        secure,
    )
}

/// CSRF cookie; a browser-session cookie
pub fn csrf_cookie(value: &str, secure: bool) -> String {
    with_flags(format!("{}={}", CSRF_COOKIE, value), secure)
}
