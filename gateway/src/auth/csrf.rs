//! Double-submit CSRF protection
//!
//! The `_csrf` cookie carries a random token and its HMAC-SHA256 under the
//! server secret. Every response carries a freshly masked copy of the
//! token in `X-CSRF-Token`; state-changing requests must send one back, and
//! it must unmask to the token in the cookie.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hyper::Method;
use rand::rngs::OsRng;
use rand::RngCore;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use platform_core::CoreError;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_HEADER: &str = "x-csrf-token";

const TOKEN_LEN: usize = 32;

/// Paths that may change state without a CSRF token
pub const EXEMPT_PATHS: [&str; 2] = ["/auth/request-login-email", "/auth/login"];

pub struct Csrf {
    secret: Vec<u8>,
    /// Enforcement is off in dev mode; tokens are still issued
    enforce: bool,
    webhook_path: String,
}

impl Csrf {
    pub fn new(secret: &str, enforce: bool, webhook_path: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            enforce,
            webhook_path: webhook_path.to_string(),
        }
    }

    fn mac(&self, token: &[u8]) -> Result<HmacSha256, CoreError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| CoreError::Hash(e.to_string()))?;
        mac.update(token);
        Ok(mac)
    }

    fn sign(&self, token: &[u8]) -> Result<Vec<u8>, CoreError> {
        Ok(self.mac(token)?.finalize().into_bytes().to_vec())
    }

    /// Mint a token and the cookie value that carries it
    pub fn issue(&self) -> Result<(Vec<u8>, String), CoreError> {
        let mut token = vec![0u8; TOKEN_LEN];
        OsRng
            .try_fill_bytes(&mut token)
            .map_err(|e| CoreError::Io(format!("Randomness source unavailable: {}", e)))?;
        let value = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&token),
            URL_SAFE_NO_PAD.encode(self.sign(&token)?)
        );
        Ok((token, value))
    }

    /// Token from a cookie value, if the signature holds
    pub fn verify_cookie(&self, value: &str) -> Option<Vec<u8>> {
        let (token, signature) = value.split_once('.')?;
        let token = URL_SAFE_NO_PAD.decode(token).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        if token.len() != TOKEN_LEN {
            return None;
        }
        self.mac(&token).ok()?.verify_slice(&signature).ok()?;
        Some(token)
    }

    /// Does this request have to present a valid header token?
    pub fn requires_check(&self, method: &Method, path: &str) -> bool {
        self.enforce
            && !is_safe_method(method)
            && path != self.webhook_path
            && !EXEMPT_PATHS.contains(&path)
    }

    /// Does the header token match the cookie token?
    ///
    /// Compared as MACs so the check runs in constant time.
    pub fn header_matches(&self, cookie_token: &[u8], header: &str) -> bool {
        let (Some(token), Ok(expected)) = (unmask(header), self.sign(cookie_token)) else {
            return false;
        };
        match self.mac(&token) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// One-time-pad the token so the header changes on every response
pub fn mask(token: &[u8]) -> Result<String, CoreError> {
    let mut pad = vec![0u8; token.len()];
    OsRng
        .try_fill_bytes(&mut pad)
        .map_err(|e| CoreError::Io(format!("Randomness source unavailable: {}", e)))?;
    let mut out = pad.clone();
    out.extend(pad.iter().zip(token).map(|(p, t)| p ^ t));
    Ok(URL_SAFE_NO_PAD.encode(out))
}

pub fn unmask(masked: &str) -> Option<Vec<u8>> {
    let raw = URL_SAFE_NO_PAD.decode(masked.trim()).ok()?;
    if raw.len() != TOKEN_LEN * 2 {
        return None;
    }
    let (pad, xored) = raw.split_at(TOKEN_LEN);
    Some(pad.iter().zip(xored).map(|(p, x)| p ^ x).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest;

    fn csrf() -> Csrf {
        Csrf::new("secret", true, "/webhooks/stripe")
    }

    #[test]
    fn test_cookie_signature() {
        let csrf = csrf();
        let (token, cookie) = csrf.issue().unwrap();
        assert_eq!(csrf.verify_cookie(&cookie), Some(token));

        let other = Csrf::new("other-secret", true, "/webhooks/stripe");
        assert_eq!(other.verify_cookie(&cookie), None);
        assert_eq!(csrf.verify_cookie("garbage"), None);
    }

    #[test]
    fn test_cookie_rejects_tampering() {
        let csrf = csrf();
        let (_, cookie) = csrf.issue().unwrap();
        let (token, signature) = cookie.split_once('.').unwrap();

        // A bare SHA-256 over secret and token is not an accepted signature
        let mut prefixed = b"secret".to_vec();
        prefixed.extend(URL_SAFE_NO_PAD.decode(token).unwrap());
        let digest = URL_SAFE_NO_PAD.encode(Sha256::digest(&prefixed));
        assert_eq!(csrf.verify_cookie(&format!("{}.{}", token, digest)), None);

        let (other_token, _) = csrf.issue().unwrap();
        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode(other_token), signature);
        assert_eq!(csrf.verify_cookie(&forged), None);
        assert_eq!(csrf.verify_cookie(&format!("{}.", token)), None);
    }

    #[test]
    fn test_masked_header_matches_cookie() {
        let csrf = csrf();
        let (token, _) = csrf.issue().unwrap();
        let a = mask(&token).unwrap();
        let b = mask(&token).unwrap();
        assert_ne!(a, b);
        assert!(csrf.header_matches(&token, &a));
        assert!(csrf.header_matches(&token, &b));

        let (other, _) = csrf.issue().unwrap();
        assert!(!csrf.header_matches(&other, &a));
        assert!(!csrf.header_matches(&token, "not-base64!"));
    }

    #[test]
    fn test_exemptions() {
        let csrf = csrf();
        assert!(csrf.requires_check(&Method::POST, "/items"));
        assert!(csrf.requires_check(&Method::DELETE, "/item/x"));
        assert!(!csrf.requires_check(&Method::GET, "/items"));
        assert!(!csrf.requires_check(&Method::POST, "/auth/login"));
        assert!(!csrf.requires_check(&Method::POST, "/auth/request-login-email"));
        assert!(!csrf.requires_check(&Method::POST, "/webhooks/stripe"));
        assert!(csrf.requires_check(&Method::POST, "/auth/logout"));

        let dev = Csrf::new("s", false, "/webhooks/stripe");
        assert!(!dev.requires_check(&Method::POST, "/items"));
    }
}
