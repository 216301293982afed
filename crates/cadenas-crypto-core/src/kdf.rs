//! PBKDF2-HMAC-SHA256 key derivation for the vault master key.
//!
//! The client derives its encryption key from the account passphrase and a
//! per-account salt that is fixed at registration. A wrong passphrase still
//! produces *a* key here — verification happens downstream, when
//! [`crate::envelope::open`] fails its authentication-tag check.

use crate::error::CryptoError;
use crate::memory::{SymmetricKey, KEY_LEN};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

/// Default PBKDF2 iteration count. Deployments may raise this via
/// configuration, never lower it.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Hard floor for the iteration count — [`derive`] rejects anything below.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Per-account salt length in bytes, fixed at account creation.
pub const SALT_LEN: usize = 32;

/// Minimum salt length accepted by [`derive`].
const MIN_SALT_LEN: usize = 16;

/// Derive a 256-bit key from a passphrase and salt.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if:
/// - `iterations` is below [`MIN_ITERATIONS`]
/// - the salt is shorter than 16 bytes
pub fn derive(
    passphrase: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<SymmetricKey, CryptoError> {
    if iterations < MIN_ITERATIONS {
        return Err(CryptoError::KeyDerivation(format!(
            "iteration count too low: {iterations} (minimum {MIN_ITERATIONS})"
        )));
    }
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }

    let mut output = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase, salt, iterations, &mut output);

    let key = SymmetricKey::new(output);
    output.zeroize();
    Ok(key)
}

/// Generate a fresh 32-byte per-account salt.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if the CSPRNG fails.
pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::KeyDerivation(format!("CSPRNG fill failed: {e}")))?;
    Ok(salt)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
