//! Unguessable URL-safe tokens and share-link access password hashing.
//!
//! Share tokens carry at least 256 bits of CSPRNG entropy and are encoded
//! with URL-safe base64 so they can sit directly in a link path. Access
//! passwords (the optional extra gate on a share link) are stored as
//! SHA-256 hex digests and compared in constant time.

use crate::error::CryptoError;
use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Entropy of a share token in bytes (256 bits).
pub const TOKEN_ENTROPY_LEN: usize = 32;

/// Constant-time byte comparison.
///
/// Returns `true` iff both slices have equal length and identical contents.
/// Uses bitwise OR accumulation to avoid short-circuit timing leaks. The
/// early return on length mismatch is acceptable because expected lengths
/// (code digit count, digest size) are public information.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Generate an unguessable URL-safe token (32 bytes of entropy, base64url).
///
/// # Errors
///
/// Returns `CryptoError::Token` if the CSPRNG fails.
pub fn generate_token() -> Result<String, CryptoError> {
    let mut bytes = [0u8; TOKEN_ENTROPY_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Token(format!("CSPRNG fill failed: {e}")))?;
    Ok(BASE64URL_NOPAD.encode(&bytes))
}

/// Hash a share-link access password for storage (SHA-256, lowercase hex).
#[must_use]
pub fn hash_access_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    HEXLOWER.encode(&digest)
}

/// Verify a share-link access password against its stored hash.
#[must_use]
pub fn verify_access_password(password: &str, stored_hash: &str) -> bool {
    let candidate = hash_access_password(password);
    constant_time_eq(candidate.as_bytes(), stored_hash.as_bytes())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique() {
        let a = generate_token().expect("token generation should succeed");
        let b = generate_token().expect("token generation should succeed");
        assert_ne!(a, b);
    }

    #[test]
    fn tokens_are_url_safe() {
        let token = generate_token().expect("token generation should succeed");
        // 32 bytes → 43 base64url chars, no padding.
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn access_password_verifies() {
        let hash = hash_access_password("x7q");
        assert!(verify_access_password("x7q", &hash));
        assert!(!verify_access_password("wrong", &hash));
    }

    #[test]
    fn access_password_hash_is_sha256_hex() {
        // SHA-256("") — well-known digest.
        assert_eq!(
            hash_access_password(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn constant_time_eq_basic_properties() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
