//! ID and token mint
//!
//! Ids on the wire are `<prefix>_<22 base-62 chars>`. Login tokens are six
//! decimal digits. API secrets are stored as Argon2id PHC strings.

use argon2::{
    password_hash::{rand_core::OsRng as HashRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CoreError;

const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of the random part of a prefixed id
pub const ID_LEN: usize = 22;

/// Length of a login token
pub const LOGIN_TOKEN_LEN: usize = 6;

/// Mint a prefixed id, e.g. `usr_4hGq0...`
pub fn new_id(prefix: &str) -> Result<String, CoreError> {
    Ok(format!("{}_{}", prefix, new_bare_id(ID_LEN)?))
}

/// Mint an unprefixed base-62 string of length `n`
pub fn new_bare_id(n: usize) -> Result<String, CoreError> {
    random_chars(n, BASE62)
}

/// Mint a decimal token of length `n`
pub fn rand_numeric_token(n: usize) -> Result<String, CoreError> {
    random_chars(n, b"0123456789")
}

/// Uniform draw from `alphabet` by rejection sampling over OS random bytes.
fn random_chars(n: usize, alphabet: &[u8]) -> Result<String, CoreError> {
    let len = alphabet.len();
    // largest multiple of len that fits in a byte
    let limit = 256 - (256 % len);
    let mut out = String::with_capacity(n);
    let mut buf = [0u8; 64];

    while out.len() < n {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| CoreError::Io(format!("Randomness source unavailable: {}", e)))?;
        for b in buf.iter().map(|b| *b as usize) {
            if b < limit {
                out.push(alphabet[b % len] as char);
                if out.len() == n {
                    break;
                }
            }
        }
    }

    Ok(out)
}

/// Return the prefix of an id (`"htl"` for `"htl_abc..."`)
pub fn id_prefix(id: &str) -> Option<&str> {
    id.split_once('_').map(|(prefix, _)| prefix)
}

/// Check that `id` is `<prefix>_` followed by a 22-char base-62 tail
pub fn is_valid_id(id: &str, prefix: &str) -> bool {
    match id.split_once('_') {
        Some((p, rest)) => {
            p == prefix && rest.len() == ID_LEN && rest.bytes().all(|b| b.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// One-way salted hash of an API secret
pub fn hash_and_salt(secret: &str) -> Result<String, CoreError> {
    let salt = SaltString::generate(&mut HashRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::Hash(format!("Failed to hash secret: {e}")))
}

/// Compare a candidate secret against a stored hash.
///
/// Malformed hashes compare unequal.
pub fn compare(hash: &str, candidate: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_shape() {
        let id = new_id("usr").unwrap();
        assert!(id.starts_with("usr_"));
        assert_eq!(id.len(), 4 + ID_LEN);
        assert!(is_valid_id(&id, "usr"));
        assert!(!is_valid_id(&id, "org"));
    }

    #[test]
    fn test_ids_are_distinct() {
        let a = new_id("lnk").unwrap();
        let b = new_id("lnk").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_bare_id_alphabet() {
        let id = new_bare_id(200).unwrap();
        assert_eq!(id.len(), 200);
        assert!(id.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_numeric_token() {
        for _ in 0..50 {
            let token = rand_numeric_token(LOGIN_TOKEN_LEN).unwrap();
            assert_eq!(token.len(), 6);
            assert!(token.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_id_prefix() {
        assert_eq!(id_prefix("htl_abc"), Some("htl"));
        assert_eq!(id_prefix("nounderscore"), None);
    }

    #[test]
    fn test_hash_and_compare() {
        let hash = hash_and_salt("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(compare(&hash, "s3cret"));
        assert!(!compare(&hash, "wrong"));
        assert!(!compare("not-a-hash", "s3cret"));
    }

    #[test]
    fn test_same_secret_different_salts() {
        let a = hash_and_salt("same").unwrap();
        let b = hash_and_salt("same").unwrap();
        assert_ne!(a, b);
    }
}
