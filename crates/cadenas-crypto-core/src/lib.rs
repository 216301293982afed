//! `cadenas-crypto-core` — Pure cryptographic primitives for CADENAS.
//!
//! This crate is the audit target: zero network, zero async, zero storage
//! dependencies. Everything a zero-knowledge vault client needs to turn a
//! passphrase into a key, seal records, run a TOTP second factor, and
//! prepare share-link payloads.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod envelope;
pub mod error;
pub mod kdf;
pub mod memory;
pub mod sharing;
pub mod token;
pub mod totp;

pub use envelope::{open, open_record, seal, seal_record, Envelope, NONCE_LEN, TAG_LEN};
pub use error::CryptoError;
pub use kdf::{derive, generate_salt, DEFAULT_ITERATIONS, MIN_ITERATIONS, SALT_LEN};
pub use memory::{SecretBuffer, SymmetricKey, KEY_LEN};
pub use sharing::{open_from_link, seal_for_link};
pub use token::{
    constant_time_eq, generate_token, hash_access_password, verify_access_password,
    TOKEN_ENTROPY_LEN,
};
pub use totp::{
    generate_backup_codes, looks_like_backup_code, provisioning_uri, TotpParams, TotpSecret,
    BACKUP_CODE_COUNT, DEFAULT_DIGITS, DEFAULT_PERIOD, SECRET_LEN,
};
