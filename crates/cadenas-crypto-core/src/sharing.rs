//! Client-side sealing of share-link payloads.
//!
//! A shared record must be readable by an anonymous visitor who never holds
//! the owner's vault key. The payload is therefore re-encrypted under a
//! fresh one-off key that travels only in the link's URL fragment — the
//! part after `#`, which browsers never send to the server. The server
//! stores the resulting [`Envelope`] verbatim and stays zero-knowledge.

use crate::envelope::{self, Envelope};
use crate::error::CryptoError;
use crate::memory::{SecretBuffer, SymmetricKey, KEY_LEN};
use data_encoding::BASE64URL_NOPAD;

/// Seal a payload for sharing under a fresh one-off key.
///
/// Returns the envelope (sent to the server) and the base64url key fragment
/// (appended to the link after `#`, never sent to the server).
///
/// # Errors
///
/// Returns `CryptoError::Encryption` or `CryptoError::InvalidKeyMaterial`
/// if key generation or encryption fails.
pub fn seal_for_link(plaintext: &[u8]) -> Result<(Envelope, String), CryptoError> {
    let key = SymmetricKey::random()?;
    let sealed = envelope::seal(plaintext, &key)?;
    let fragment = BASE64URL_NOPAD.encode(key.expose());
    Ok((sealed, fragment))
}

/// Open a redeemed share payload with the key recovered from the URL fragment.
///
/// # Errors
///
/// - `CryptoError::InvalidKeyMaterial` if the fragment does not decode to a
///   32-byte key
/// - `CryptoError::Integrity` if the payload fails authentication
pub fn open_from_link(sealed: &Envelope, fragment: &str) -> Result<SecretBuffer, CryptoError> {
    let bytes = BASE64URL_NOPAD
        .decode(fragment.as_bytes())
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("invalid key fragment: {e}")))?;
    if bytes.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "key fragment must decode to {KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let key = SymmetricKey::from_slice(&bytes)?;
    envelope::open(sealed, &key)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
