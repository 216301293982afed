//! TOTP two-factor enrollment and login verification.
//!
//! Enrollment is two-phase: `setup` stores a pending secret that does
//! nothing until `enable` proves the authenticator can produce a valid
//! code, at which point the backup codes are minted. Login accepts
//! either a current TOTP code or a single-use backup code.

use cadenas_crypto_core::totp::{self, TotpSecret};
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::db::VaultDb;
use crate::error::VaultError;
use crate::util::now_iso8601;

/// Issuer label embedded in provisioning URIs.
const ISSUER: &str = "CADENAS";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of starting TOTP enrollment.
///
/// Both fields go to the client once; the secret is never shown again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpSetup {
    /// Base32-encoded shared secret for manual entry.
    pub secret_base32: String,
    /// `otpauth://` URI for QR-code provisioning.
    pub otpauth_uri: String,
}

/// Current two-factor state of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorStatus {
    /// Whether TOTP is enabled.
    pub enabled: bool,
    /// Whether a setup was started but never confirmed.
    pub pending: bool,
    /// Remaining unused backup codes.
    pub backup_codes_remaining: usize,
}

// ---------------------------------------------------------------------------
// Enrollment
// ---------------------------------------------------------------------------

/// Start TOTP enrollment for an account.
///
/// Generates a fresh secret and stores it pending. Calling this again
/// before [`enable`] replaces the pending secret. Has no effect on
/// login until [`enable`] confirms it.
///
/// # Errors
///
/// - [`VaultError::TwoFactorState`] if TOTP is already enabled.
/// - [`VaultError::AccountNotFound`] if the account does not exist.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn setup(db: &VaultDb, account_id: &str, email: &str) -> Result<TotpSetup, VaultError> {
    let config = CoreConfig::default();
    setup_with_config(db, account_id, email, &config)
}

/// [`setup`] with explicit config (period/digits).
///
/// # Errors
///
/// Same as [`setup`].
pub fn setup_with_config(
    db: &VaultDb,
    account_id: &str,
    email: &str,
    config: &CoreConfig,
) -> Result<TotpSetup, VaultError> {
    if totp_enabled(db, account_id)? {
        return Err(VaultError::TwoFactorState(
            "two-factor already enabled".to_owned(),
        ));
    }

    let secret = TotpSecret::generate()?;
    let secret_base32 = secret.to_base32();
    let otpauth_uri = totp::provisioning_uri(&secret, ISSUER, email, &config.totp_params());

    db.connection().execute(
        "UPDATE accounts SET totp_secret = ?1 WHERE id = ?2",
        rusqlite::params![secret_base32, account_id],
    )?;

    Ok(TotpSetup {
        secret_base32,
        otpauth_uri,
    })
}

/// Confirm enrollment with a code from the authenticator.
///
/// Verifies `code` against the pending secret; on success flips
/// `totp_enabled`, wipes any previous backup codes, and mints ten fresh
/// single-use codes. Returned plaintext codes are shown to the user
/// exactly once.
///
/// # Errors
///
/// - [`VaultError::TwoFactorState`] if no setup is pending or TOTP is
///   already enabled.
/// - [`VaultError::InvalidCredential`] if the code does not verify.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn enable(
    db: &VaultDb,
    account_id: &str,
    code: &str,
    now: u64,
    config: &CoreConfig,
) -> Result<Vec<String>, VaultError> {
    let (pending_secret, enabled) = totp_state(db, account_id)?;
    if enabled {
        return Err(VaultError::TwoFactorState(
            "two-factor already enabled".to_owned(),
        ));
    }
    let Some(secret_base32) = pending_secret else {
        return Err(VaultError::TwoFactorState("no pending setup".to_owned()));
    };

    let secret = TotpSecret::from_base32(&secret_base32)?;
    if !totp::verify(&secret, code, now, &config.totp_params())? {
        return Err(VaultError::InvalidCredential);
    }

    let codes = totp::generate_backup_codes()?;
    let created_at = now_iso8601();

    let conn = db.connection();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE accounts SET totp_enabled = 1 WHERE id = ?1",
        [account_id],
    )?;
    tx.execute(
        "DELETE FROM backup_codes WHERE account_id = ?1",
        [account_id],
    )?;
    for backup_code in &codes {
        tx.execute(
            "INSERT INTO backup_codes (account_id, code, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![account_id, backup_code, created_at],
        )?;
    }
    tx.commit()?;

    Ok(codes)
}

/// Disable TOTP for an account after re-verifying a current code or a
/// backup code.
///
/// Clears the secret, the enabled flag, and all backup codes.
///
/// # Errors
///
/// - [`VaultError::TwoFactorState`] if TOTP is not enabled.
/// - [`VaultError::InvalidCredential`] if the code does not verify.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn disable(
    db: &VaultDb,
    account_id: &str,
    code: &str,
    now: u64,
    config: &CoreConfig,
) -> Result<(), VaultError> {
    verify_second_factor(db, account_id, code, now, config)?;

    let conn = db.connection();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE accounts SET totp_secret = NULL, totp_enabled = 0 WHERE id = ?1",
        [account_id],
    )?;
    tx.execute(
        "DELETE FROM backup_codes WHERE account_id = ?1",
        [account_id],
    )?;
    tx.commit()?;
    Ok(())
}

/// Replace all backup codes after re-verifying a current TOTP code.
///
/// Old codes stop working immediately, used or not.
///
/// # Errors
///
/// - [`VaultError::TwoFactorState`] if TOTP is not enabled.
/// - [`VaultError::InvalidCredential`] if the code does not verify.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn regenerate_backup_codes(
    db: &VaultDb,
    account_id: &str,
    code: &str,
    now: u64,
    config: &CoreConfig,
) -> Result<Vec<String>, VaultError> {
    verify_second_factor(db, account_id, code, now, config)?;

    let codes = totp::generate_backup_codes()?;
    let created_at = now_iso8601();

    let conn = db.connection();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM backup_codes WHERE account_id = ?1",
        [account_id],
    )?;
    for backup_code in &codes {
        tx.execute(
            "INSERT INTO backup_codes (account_id, code, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![account_id, backup_code, created_at],
        )?;
    }
    tx.commit()?;

    Ok(codes)
}

// ---------------------------------------------------------------------------
// Login verification
// ---------------------------------------------------------------------------

/// Verify the second factor during login.
///
/// Accepts either a current TOTP code (one step of drift tolerated each
/// direction) or an unused backup code. A backup code is consumed
/// atomically: a single `DELETE` decides the race, so two concurrent
/// logins with the same code cannot both succeed.
///
/// # Errors
///
/// - [`VaultError::TwoFactorState`] if TOTP is not enabled.
/// - [`VaultError::InvalidCredential`] if neither factor matches.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn verify_login(
    db: &VaultDb,
    account_id: &str,
    code: &str,
    now: u64,
    config: &CoreConfig,
) -> Result<(), VaultError> {
    verify_second_factor(db, account_id, code, now, config)
}

fn verify_second_factor(
    db: &VaultDb,
    account_id: &str,
    code: &str,
    now: u64,
    config: &CoreConfig,
) -> Result<(), VaultError> {
    let (secret_base32, enabled) = totp_state(db, account_id)?;
    if !enabled {
        return Err(VaultError::TwoFactorState(
            "two-factor not enabled".to_owned(),
        ));
    }
    let secret_base32 = secret_base32.ok_or_else(|| {
        VaultError::TwoFactorState("enabled account has no stored secret".to_owned())
    })?;

    // Backup codes have a distinct shape; route by shape so a TOTP code
    // never hits the backup-code table. Stored codes are uppercase hex,
    // user input is matched case-insensitively.
    if totp::looks_like_backup_code(code) {
        let normalized = code.to_ascii_uppercase();
        let consumed = db.connection().execute(
            "DELETE FROM backup_codes WHERE account_id = ?1 AND code = ?2",
            rusqlite::params![account_id, normalized],
        )?;
        if consumed == 1 {
            return Ok(());
        }
        return Err(VaultError::InvalidCredential);
    }

    let secret = TotpSecret::from_base32(&secret_base32)?;
    if totp::verify(&secret, code, now, &config.totp_params())? {
        Ok(())
    } else {
        Err(VaultError::InvalidCredential)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Report the two-factor state of an account.
///
/// # Errors
///
/// - [`VaultError::AccountNotFound`] if the account does not exist.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn status(db: &VaultDb, account_id: &str) -> Result<TwoFactorStatus, VaultError> {
    let (secret, enabled) = totp_state(db, account_id)?;
    let remaining: i64 = db.connection().query_row(
        "SELECT count(*) FROM backup_codes WHERE account_id = ?1",
        [account_id],
        |row| row.get(0),
    )?;

    Ok(TwoFactorStatus {
        enabled,
        pending: !enabled && secret.is_some(),
        backup_codes_remaining: usize::try_from(remaining).unwrap_or(0),
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn totp_state(db: &VaultDb, account_id: &str) -> Result<(Option<String>, bool), VaultError> {
    db.connection()
        .query_row(
            "SELECT totp_secret, totp_enabled FROM accounts WHERE id = ?1",
            [account_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                VaultError::AccountNotFound(account_id.to_owned())
            }
            other => VaultError::from(other),
        })
}

fn totp_enabled(db: &VaultDb, account_id: &str) -> Result<bool, VaultError> {
    totp_state(db, account_id).map(|(_, enabled)| enabled)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
