//! RFC 6238 time-based one-time passwords and single-use backup codes.
//!
//! The second factor for vault login: HMAC-SHA1 TOTP (the algorithm every
//! authenticator app implements) with a ±1 time-step validation window,
//! plus the `XXXX-XXXX` backup codes handed out when 2FA is enabled.
//! Single-use enforcement of backup codes lives in the store layer; this
//! module only generates and shape-checks them.

use crate::error::CryptoError;
use crate::token::constant_time_eq;
use data_encoding::BASE32_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// TOTP secret length in bytes (160 bits, per RFC 4226 recommendation).
pub const SECRET_LEN: usize = 20;

/// Default time step in seconds.
pub const DEFAULT_PERIOD: u32 = 30;

/// Default number of code digits.
pub const DEFAULT_DIGITS: u32 = 6;

/// Validation window in time steps each direction — exactly one, no wider.
const WINDOW: u64 = 1;

/// Number of backup codes issued when 2FA is enabled.
pub const BACKUP_CODE_COUNT: usize = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A shared TOTP secret, zeroized on drop, displayed only as base32.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TotpSecret {
    bytes: Vec<u8>,
}

impl TotpSecret {
    /// Generate a fresh 20-byte secret from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Otp` if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = vec![0u8; SECRET_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Otp(format!("CSPRNG fill failed: {e}")))?;
        Ok(Self { bytes })
    }

    /// Wrap existing secret bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Otp` if the secret is empty.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.is_empty() {
            return Err(CryptoError::Otp("secret must not be empty".to_owned()));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Parse a base32-encoded secret (the form stored and shown to users).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Otp` if the input is not valid base32 or is empty.
    pub fn from_base32(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE32_NOPAD
            .decode(encoded.trim().to_ascii_uppercase().as_bytes())
            .map_err(|e| CryptoError::Otp(format!("invalid base32 secret: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Base32 display form, for provisioning URIs and manual entry.
    #[must_use]
    pub fn to_base32(&self) -> String {
        BASE32_NOPAD.encode(&self.bytes)
    }

    /// Expose the raw secret bytes for HMAC computation.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TotpSecret(***)")
    }
}

/// TOTP parameters — externally configurable, defaults per RFC 6238.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpParams {
    /// Time step in seconds.
    pub period: u32,
    /// Number of code digits (6 to 8).
    pub digits: u32,
}

impl Default for TotpParams {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            digits: DEFAULT_DIGITS,
        }
    }
}

impl TotpParams {
    fn validate(&self) -> Result<(), CryptoError> {
        if self.period == 0 {
            return Err(CryptoError::Otp("period must be > 0".to_owned()));
        }
        if !(6..=8).contains(&self.digits) {
            return Err(CryptoError::Otp(format!(
                "digits must be 6 to 8, got {}",
                self.digits
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Generation and validation
// ---------------------------------------------------------------------------

/// HOTP core (RFC 4226): HMAC-SHA1 of the big-endian counter, dynamic
/// truncation, reduced modulo 10^digits.
fn hotp(secret: &TotpSecret, counter: u64, digits: u32) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret.expose());
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let digest = tag.as_ref();

    // Dynamic truncation: low nibble of the last byte selects a 4-byte
    // window, top bit masked (RFC 4226 §5.3).
    let offset = usize::from(digest[digest.len().wrapping_sub(1)] & 0x0F);
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7F,
        digest[offset.wrapping_add(1)],
        digest[offset.wrapping_add(2)],
        digest[offset.wrapping_add(3)],
    ]);

    // digits is validated to 6..=8, so the modulus is never zero.
    let modulus = 10u32.saturating_pow(digits);
    #[allow(clippy::arithmetic_side_effects)]
    let code = binary % modulus;
    let width = digits as usize;
    format!("{code:0>width$}")
}

/// Generate the TOTP code for `unix_secs`.
///
/// # Errors
///
/// Returns `CryptoError::Otp` if the params are invalid.
pub fn generate(
    secret: &TotpSecret,
    unix_secs: u64,
    params: &TotpParams,
) -> Result<String, CryptoError> {
    params.validate()?;
    // period is validated non-zero above.
    #[allow(clippy::arithmetic_side_effects)]
    let counter = unix_secs / u64::from(params.period);
    Ok(hotp(secret, counter, params.digits))
}

/// Validate a code against steps T-1, T, and T+1 — a clock-drift tolerance
/// of exactly one step each direction.
///
/// All three candidates are computed and compared in constant time; the
/// result does not short-circuit on the first match.
///
/// # Errors
///
/// Returns `CryptoError::Otp` if the params are invalid.
pub fn verify(
    secret: &TotpSecret,
    code: &str,
    unix_secs: u64,
    params: &TotpParams,
) -> Result<bool, CryptoError> {
    params.validate()?;
    #[allow(clippy::arithmetic_side_effects)]
    let counter = unix_secs / u64::from(params.period);

    let start = counter.saturating_sub(WINDOW);
    let end = counter.saturating_add(WINDOW);

    let mut valid = false;
    let mut step = start;
    loop {
        let expected = hotp(secret, step, params.digits);
        if constant_time_eq(expected.as_bytes(), code.as_bytes()) {
            valid = true;
        }
        if step == end {
            break;
        }
        step = step.wrapping_add(1);
    }
    Ok(valid)
}

/// Build an `otpauth://` provisioning URI for authenticator apps.
#[must_use]
pub fn provisioning_uri(
    secret: &TotpSecret,
    issuer: &str,
    account_name: &str,
    params: &TotpParams,
) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        uri_escape(issuer),
        uri_escape(account_name),
        secret.to_base32(),
        uri_escape(issuer),
        params.digits,
        params.period
    )
}

/// Minimal percent-encoding for URI label components.
fn uri_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Backup codes
// ---------------------------------------------------------------------------

/// Generate 10 single-use backup codes, formatted `XXXX-XXXX` (hex, uppercase).
///
/// # Errors
///
/// Returns `CryptoError::Token` if the CSPRNG fails.
pub fn generate_backup_codes() -> Result<Vec<String>, CryptoError> {
    let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);
    for _ in 0..BACKUP_CODE_COUNT {
        let mut bytes = [0u8; 4];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Token(format!("CSPRNG fill failed: {e}")))?;
        let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
        codes.push(format!("{}-{}", &hex[..4], &hex[4..]));
    }
    Ok(codes)
}

/// Shape check for backup codes: 9 chars, dash at index 4, hex elsewhere.
///
/// Used by callers to decide whether a submitted token is a TOTP code or a
/// backup code before hitting storage.
#[must_use]
pub fn looks_like_backup_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 9
        && bytes[4] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || b.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
