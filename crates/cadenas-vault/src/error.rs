//! Error types for `cadenas-vault`.
//!
//! Every non-success path is a distinct named outcome — nothing in this
//! crate uses panics or retries for control flow. Credential failures are
//! deliberately generic: [`VaultError::InvalidCredential`] does not reveal
//! whether the email, passphrase, TOTP code, or backup code was wrong.

use cadenas_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by credential-store operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Wrong email, passphrase, TOTP code, backup code, or possession
    /// credential. Deliberately generic to avoid oracle leaks.
    #[error("invalid credentials")]
    InvalidCredential,

    /// The email is already registered.
    #[error("email already registered")]
    EmailTaken,

    /// Account not found by ID (internal lookups only — login paths use
    /// [`VaultError::InvalidCredential`]).
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Passphrase verifier hashing failed.
    #[error("passphrase hashing failed: {0}")]
    Hashing(String),

    /// Share token does not match any link.
    #[error("share link not found")]
    LinkNotFound,

    /// The link owner revoked this share link.
    #[error("share link has been revoked")]
    LinkRevoked,

    /// The share link passed its expiry timestamp.
    #[error("share link has expired")]
    LinkExpired,

    /// The share link's view budget is used up.
    #[error("share link view limit reached")]
    LinkExhausted,

    /// The share link is password-gated and no password was supplied.
    #[error("share link requires a password")]
    LinkPasswordRequired,

    /// The supplied share-link password is wrong.
    #[error("share link password mismatch")]
    LinkPasswordMismatch,

    /// Unknown TTL class string on share-link creation.
    #[error("invalid TTL class: {0}")]
    InvalidTtlClass(String),

    /// Challenge missing, already consumed, or past its TTL.
    #[error("challenge expired or already consumed")]
    ChallengeExpired,

    /// Vault record not found (or not owned by the caller).
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Attachment not found (or not owned by the caller).
    #[error("attachment not found: {0}")]
    AttachmentNotFound(String),

    /// Payload exceeds the configured size cap.
    #[error("payload size {actual_bytes} bytes exceeds maximum {max_bytes} bytes")]
    PayloadTooLarge {
        /// Maximum allowed size in bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },

    /// MIME type is not on the attachment allow-list.
    #[error("unsupported MIME type: {0}")]
    UnsupportedMimeType(String),

    /// Two-factor flow called in the wrong state (already enabled, no
    /// pending secret, not enabled).
    #[error("two-factor state error: {0}")]
    TwoFactorState(String),

    /// Possession credential not found by ID.
    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    /// Signature counter did not increase — replayed assertion.
    #[error("signature counter replay detected")]
    ReplayDetected,

    /// Migration error during schema upgrade.
    #[error("migration error: {0}")]
    Migration(String),

    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}
