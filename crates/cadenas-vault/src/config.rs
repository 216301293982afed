//! Runtime configuration consumed (not owned) by the core.
//!
//! Every tunable here can be overridden through a `CADENAS_*` environment
//! variable without code changes. Unset or unparsable variables fall back
//! to the defaults.

use cadenas_crypto_core::kdf;
use cadenas_crypto_core::totp::{TotpParams, DEFAULT_DIGITS, DEFAULT_PERIOD};
use serde::{Deserialize, Serialize};

/// Default challenge TTL in seconds.
const DEFAULT_CHALLENGE_TTL_SECS: u64 = 60;

/// Default cap for a share-link payload: 64 KiB of ciphertext.
const DEFAULT_SHARE_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Default cap for a decrypted attachment: 10 MiB.
const DEFAULT_ATTACHMENT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Tunables for the credential and envelope subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// PBKDF2 iteration count used by clients (advertised at login).
    pub kdf_iterations: u32,
    /// TOTP time step in seconds.
    pub totp_period: u32,
    /// TOTP code digit count.
    pub totp_digits: u32,
    /// Challenge lifetime in seconds.
    pub challenge_ttl_secs: u64,
    /// Maximum share-link payload (ciphertext) size in bytes.
    pub share_max_payload_bytes: usize,
    /// Maximum attachment size in bytes (declared post-decode size).
    pub attachment_max_bytes: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: kdf::DEFAULT_ITERATIONS,
            totp_period: DEFAULT_PERIOD,
            totp_digits: DEFAULT_DIGITS,
            challenge_ttl_secs: DEFAULT_CHALLENGE_TTL_SECS,
            share_max_payload_bytes: DEFAULT_SHARE_MAX_PAYLOAD_BYTES,
            attachment_max_bytes: DEFAULT_ATTACHMENT_MAX_BYTES,
        }
    }
}

impl CoreConfig {
    /// Build a config from `CADENAS_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            kdf_iterations: env_parse("CADENAS_KDF_ITERATIONS", defaults.kdf_iterations),
            totp_period: env_parse("CADENAS_TOTP_PERIOD", defaults.totp_period),
            totp_digits: env_parse("CADENAS_TOTP_DIGITS", defaults.totp_digits),
            challenge_ttl_secs: env_parse("CADENAS_CHALLENGE_TTL_SECS", defaults.challenge_ttl_secs),
            share_max_payload_bytes: env_parse(
                "CADENAS_SHARE_MAX_PAYLOAD_BYTES",
                defaults.share_max_payload_bytes,
            ),
            attachment_max_bytes: env_parse(
                "CADENAS_ATTACHMENT_MAX_BYTES",
                defaults.attachment_max_bytes,
            ),
        }
    }

    /// The TOTP parameter pair used by the 2FA flows.
    #[must_use]
    pub const fn totp_params(&self) -> TotpParams {
        TotpParams {
            period: self.totp_period,
            digits: self.totp_digits,
        }
    }
}

/// Read and parse an environment variable, or fall back to `default`.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
