//! Account registration and passphrase verification.
//!
//! The server stores an Argon2id verifier of the passphrase plus the
//! public per-account encryption salt handed to clients for client-side
//! key derivation. The plaintext passphrase never persists, and the
//! derived vault key never reaches this crate at all.

use argon2::password_hash::rand_core::OsRng as PasswordOsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use cadenas_crypto_core::kdf;
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

use crate::db::VaultDb;
use crate::error::VaultError;
use crate::util::{generate_uuid, now_iso8601};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fixed Argon2id verifier used to equalize timing when the email is
/// unknown. Hash of an unguessable throwaway value; never matches user
/// input, only burns the same CPU as a real verification.
const DUMMY_VERIFIER: &str = "$argon2id$v=19$m=19456,t=2,p=1$gZiV/M1gPc22ElAH/Jh1Hw$CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A registered account row.
///
/// `encryption_salt` is public KDF input — it is returned to any caller
/// who proves the passphrase, and also during login bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account UUID.
    pub id: String,
    /// Registered email, unique across the store.
    pub email: String,
    /// Hex-encoded 32-byte salt for client-side key derivation.
    pub encryption_salt: String,
    /// Whether TOTP two-factor is active.
    pub totp_enabled: bool,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Register a new account.
///
/// Generates a fresh 32-byte encryption salt, hashes the passphrase with
/// Argon2id into a PHC verifier string, and inserts the account row.
///
/// # Errors
///
/// - [`VaultError::EmailTaken`] if the email is already registered.
/// - [`VaultError::Hashing`] if verifier hashing fails.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn register(db: &VaultDb, email: &str, passphrase: &str) -> Result<Account, VaultError> {
    let conn = db.connection();

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1)",
        [email],
        |row| row.get(0),
    )?;
    if exists {
        return Err(VaultError::EmailTaken);
    }

    let passphrase_hash = hash_passphrase(passphrase)?;
    let salt = kdf::generate_salt()?;
    let encryption_salt = HEXLOWER.encode(&salt);

    let id = generate_uuid();
    let created_at = now_iso8601();

    conn.execute(
        "INSERT INTO accounts (id, email, passphrase_hash, encryption_salt, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id, email, passphrase_hash, encryption_salt, created_at],
    )
    .map_err(|e| match e {
        // UNIQUE violation on a concurrent insert of the same email.
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            VaultError::EmailTaken
        }
        other => VaultError::from(other),
    })?;

    Ok(Account {
        id,
        email: email.to_owned(),
        encryption_salt,
        totp_enabled: false,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify an email/passphrase pair.
///
/// Returns the account on success. An unknown email still runs a full
/// Argon2id verification against a fixed dummy verifier so the response
/// time does not reveal whether the email exists.
///
/// # Errors
///
/// - [`VaultError::InvalidCredential`] for a wrong email or passphrase
///   (deliberately indistinguishable).
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn verify_passphrase(
    db: &VaultDb,
    email: &str,
    passphrase: &str,
) -> Result<Account, VaultError> {
    let conn = db.connection();

    let row: Option<(String, String, String, bool, String)> = conn
        .query_row(
            "SELECT id, passphrase_hash, encryption_salt, totp_enabled, created_at \
             FROM accounts WHERE email = ?1",
            [email],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    let Some((id, passphrase_hash, encryption_salt, totp_enabled, created_at)) = row else {
        // Unknown email: burn the same Argon2id cost, then fail generically.
        let _ = verify_against(DUMMY_VERIFIER, passphrase);
        return Err(VaultError::InvalidCredential);
    };

    if !verify_against(&passphrase_hash, passphrase)? {
        return Err(VaultError::InvalidCredential);
    }

    Ok(Account {
        id,
        email: email.to_owned(),
        encryption_salt,
        totp_enabled,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Passphrase rotation
// ---------------------------------------------------------------------------

/// Change an account's passphrase after re-verifying the current one.
///
/// Only the Argon2id verifier changes. The encryption salt is kept, so
/// stored ciphertext stays decryptable by the client once it re-wraps
/// its records under the new derived key.
///
/// # Errors
///
/// - [`VaultError::InvalidCredential`] if the current passphrase is wrong.
/// - [`VaultError::Hashing`] if verifier hashing fails.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn rotate_passphrase(
    db: &VaultDb,
    email: &str,
    current_passphrase: &str,
    new_passphrase: &str,
) -> Result<(), VaultError> {
    let account = verify_passphrase(db, email, current_passphrase)?;
    let new_hash = hash_passphrase(new_passphrase)?;

    db.connection().execute(
        "UPDATE accounts SET passphrase_hash = ?1 WHERE id = ?2",
        rusqlite::params![new_hash, account.id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Fetch an account by ID.
///
/// # Errors
///
/// - [`VaultError::AccountNotFound`] if no such account exists.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn get_account(db: &VaultDb, account_id: &str) -> Result<Account, VaultError> {
    db.connection()
        .query_row(
            "SELECT id, email, encryption_salt, totp_enabled, created_at \
             FROM accounts WHERE id = ?1",
            [account_id],
            |row| {
                Ok(Account {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    encryption_salt: row.get(2)?,
                    totp_enabled: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                VaultError::AccountNotFound(account_id.to_owned())
            }
            other => VaultError::from(other),
        })
}

/// Fetch the encryption salt for an email, for the login bootstrap.
///
/// The salt is public KDF input; handing it out by email is part of the
/// wire contract so clients can derive their key before authenticating.
///
/// # Errors
///
/// - [`VaultError::AccountNotFound`] if the email is not registered.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn salt_for_email(db: &VaultDb, email: &str) -> Result<String, VaultError> {
    db.connection()
        .query_row(
            "SELECT encryption_salt FROM accounts WHERE email = ?1",
            [email],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => VaultError::AccountNotFound(email.to_owned()),
            other => VaultError::from(other),
        })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Hash a passphrase into an Argon2id PHC verifier string.
fn hash_passphrase(passphrase: &str) -> Result<String, VaultError> {
    let salt = SaltString::generate(&mut PasswordOsRng);
    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| VaultError::Hashing(e.to_string()))
}

/// Verify a passphrase against a PHC verifier string.
fn verify_against(verifier: &str, passphrase: &str) -> Result<bool, VaultError> {
    let parsed = PasswordHash::new(verifier).map_err(|e| VaultError::Hashing(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(passphrase.as_bytes(), &parsed)
        .is_ok())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
