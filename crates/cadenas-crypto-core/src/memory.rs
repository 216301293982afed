//! In-memory containers for key material and decrypted plaintext.
//!
//! Both types zero their contents on drop and mask their `Debug`/`Display`
//! output so a stray log statement can never leak a key or a decrypted
//! record.

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// SymmetricKey — fixed 256-bit key
// ---------------------------------------------------------------------------

/// A 256-bit AES key, zeroized on drop.
///
/// Once constructed the raw bytes are only reachable through [`expose`]
/// (`Self::expose`); the key never appears in `Debug` or `Display` output
/// and is not serializable.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_LEN],
}

impl SymmetricKey {
    /// Wrap an existing 32-byte key. The input array is moved in.
    #[must_use]
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random key from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` if the CSPRNG fails.
    pub fn random() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("CSPRNG fill failed: {e}")))?;
        Ok(Self::new(bytes))
    }

    /// Build a key from a slice, rejecting anything that is not 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` on a length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "expected {KEY_LEN}-byte key, got {} bytes",
                bytes.len()
            )));
        }
        let mut arr = [0u8; KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self::new(arr))
    }

    /// Expose the raw key bytes for a cryptographic operation.
    #[must_use]
    pub const fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl From<[u8; KEY_LEN]> for SymmetricKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(***)")
    }
}

impl fmt::Display for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(***)")
    }
}

// ---------------------------------------------------------------------------
// SecretBuffer — variable-length
// ---------------------------------------------------------------------------

/// Variable-length buffer for decrypted plaintext and other secrets.
///
/// Wraps [`SecretSlice<u8>`] from the `secrecy` crate: zeroized on drop,
/// masked `Debug` output (`SecretBuffer(***)`).
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
}

impl SecretBuffer {
    /// Copy the given data into a new secret allocation.
    ///
    /// The caller should zeroize the source after calling this.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        Self {
            inner: data.to_vec().into(),
        }
    }

    /// Expose the underlying bytes. Keep exposure minimal — prefer using
    /// the slice within a single expression.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

impl fmt::Display for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_key_roundtrip() {
        let key = SymmetricKey::new([0xAB; KEY_LEN]);
        assert_eq!(key.expose(), &[0xAB; KEY_LEN]);
    }

    #[test]
    fn symmetric_key_random_produces_unique_keys() {
        let a = SymmetricKey::random().expect("random should succeed");
        let b = SymmetricKey::random().expect("random should succeed");
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn symmetric_key_from_slice_rejects_wrong_length() {
        assert!(SymmetricKey::from_slice(&[0u8; 31]).is_err());
        assert!(SymmetricKey::from_slice(&[0u8; 33]).is_err());
        assert!(SymmetricKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn symmetric_key_debug_is_masked() {
        let key = SymmetricKey::new([0xFF; KEY_LEN]);
        let debug = format!("{key:?}");
        assert_eq!(debug, "SymmetricKey(***)");
        assert!(!debug.contains("ff"));
        assert!(!debug.contains("FF"));
    }

    #[test]
    fn secret_buffer_stores_correct_content() {
        let data = b"decrypted record";
        let buf = SecretBuffer::new(data);
        assert_eq!(buf.expose(), data);
        assert_eq!(buf.len(), data.len());
        assert!(!buf.is_empty());
    }

    #[test]
    fn secret_buffer_empty() {
        let buf = SecretBuffer::new(b"");
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn secret_buffer_debug_is_masked() {
        let buf = SecretBuffer::new(b"super secret");
        let debug = format!("{buf:?}");
        assert_eq!(debug, "SecretBuffer(***)");
        assert!(!debug.contains("super"));
    }
}
