//! Cryptographic error types for `cadenas-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (bad salt, iteration count below the floor).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric encryption failure (AES-256-GCM parameter or cipher error).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication tag verification failed — tampered bytes, wrong key,
    /// or wrong nonce. The three are indistinguishable by design.
    #[error("decryption failed: authentication tag mismatch")]
    Integrity,

    /// TOTP generation or validation error.
    #[error("OTP error: {0}")]
    Otp(String),

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Token or backup-code generation failure (CSPRNG unavailable).
    #[error("token error: {0}")]
    Token(String),
}
