//! AES-256-GCM authenticated encryption of vault records.
//!
//! This module provides:
//! - [`seal`] / [`open`] — raw-byte encryption with a fresh random nonce
//! - [`seal_record`] / [`open_record`] — JSON-structured record encryption
//! - [`Envelope`] — the ciphertext + nonce pair that travels to the server
//!
//! The server only ever sees [`Envelope`] values; plaintext and keys never
//! leave the client. The wire shape matches the record envelope contract:
//! `{ "encryptedData": <base64 ciphertext>, "iv": <base64 nonce> }`.

use crate::error::CryptoError;
use crate::memory::{SecretBuffer, SymmetricKey};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Authenticated ciphertext container — the only shape the server stores.
///
/// `ciphertext` carries the GCM tag appended to the encrypted bytes, so the
/// minimum valid length is [`TAG_LEN`]. The nonce is random per encryption
/// and must travel with the ciphertext. Any modification to either field
/// makes [`open`] fail.
#[must_use = "encrypted data must be stored or transmitted"]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Encrypted bytes followed by the 128-bit authentication tag.
    #[serde(rename = "encryptedData", with = "base64_vec")]
    pub ciphertext: Vec<u8>,
    /// 96-bit random nonce, unique per encryption.
    #[serde(rename = "iv", with = "base64_nonce")]
    pub nonce: [u8; NONCE_LEN],
}

// ---------------------------------------------------------------------------
// Core encryption
// ---------------------------------------------------------------------------

/// Encrypt plaintext under `key` with a fresh random 96-bit nonce.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the cipher cannot be initialized or
/// the encryption operation fails.
pub fn seal(plaintext: &[u8], key: &SymmetricKey) -> Result<Envelope, CryptoError> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key.expose())
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    let sealing_key = aead::LessSafeKey::new(unbound);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // Encrypt in place — the tag is appended to the buffer.
    let mut in_out = plaintext.to_vec();
    if sealing_key
        .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
        .is_err()
    {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    }

    Ok(Envelope {
        ciphertext: in_out,
        nonce: nonce_bytes,
    })
}

/// Decrypt and authenticate an [`Envelope`].
///
/// This is a hard fail: a wrong key, a wrong nonce, or a single flipped bit
/// anywhere in the ciphertext all yield [`CryptoError::Integrity`] — never a
/// partial or garbled decode.
///
/// # Errors
///
/// - `CryptoError::Integrity` if the authentication tag does not verify
/// - `CryptoError::Encryption` if the cipher cannot be initialized
pub fn open(envelope: &Envelope, key: &SymmetricKey) -> Result<SecretBuffer, CryptoError> {
    if envelope.ciphertext.len() < TAG_LEN {
        return Err(CryptoError::Integrity);
    }

    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key.expose())
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    let opening_key = aead::LessSafeKey::new(unbound);

    let nonce = aead::Nonce::assume_unique_for_key(envelope.nonce);

    let mut in_out = envelope.ciphertext.clone();
    let plaintext = opening_key
        .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Integrity)?;

    let result = SecretBuffer::new(plaintext);
    in_out.zeroize();
    Ok(result)
}

// ---------------------------------------------------------------------------
// Structured records
// ---------------------------------------------------------------------------

/// Serialize a record as JSON and seal it.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if serialization or encryption fails.
pub fn seal_record<T: Serialize>(record: &T, key: &SymmetricKey) -> Result<Envelope, CryptoError> {
    let mut json = serde_json::to_vec(record)
        .map_err(|e| CryptoError::Encryption(format!("record serialization failed: {e}")))?;
    let envelope = seal(&json, key);
    json.zeroize();
    envelope
}

/// Open an [`Envelope`] and parse the plaintext as a JSON record.
///
/// # Errors
///
/// - `CryptoError::Integrity` if the authentication tag does not verify
/// - `CryptoError::Encryption` if the decrypted bytes are not valid JSON
///   for `T`
pub fn open_record<T: DeserializeOwned>(
    envelope: &Envelope,
    key: &SymmetricKey,
) -> Result<T, CryptoError> {
    let plaintext = open(envelope, key)?;
    serde_json::from_slice(plaintext.expose())
        .map_err(|e| CryptoError::Encryption(format!("record deserialization failed: {e}")))
}

// ---------------------------------------------------------------------------
// Base64 serde helpers (wire shape)
// ---------------------------------------------------------------------------

mod base64_vec {
    use data_encoding::BASE64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64
            .decode(s.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("invalid base64: {e}")))
    }
}

mod base64_nonce {
    use super::NONCE_LEN;
    use data_encoding::BASE64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        nonce: &[u8; NONCE_LEN],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(nonce))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; NONCE_LEN], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = BASE64
            .decode(s.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("invalid base64: {e}")))?;
        if bytes.len() != NONCE_LEN {
            return Err(serde::de::Error::custom(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes);
        Ok(nonce)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
