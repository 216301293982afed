//! Possession-factor credentials: Ed25519 device keys with a
//! challenge-response handshake.
//!
//! A device registers its public key once. Authentication issues a
//! single-use challenge nonce, the device signs the nonce bytes, and
//! the server verifies the signature and enforces a strictly increasing
//! signature counter per credential.

use data_encoding::BASE64URL_NOPAD;
use ring::signature::{UnparsedPublicKey, ED25519};
use serde::{Deserialize, Serialize};

use crate::accounts;
use crate::challenge::ChallengeStore;
use crate::db::VaultDb;
use crate::error::VaultError;
use crate::util::{generate_uuid, now_iso8601};

/// Ed25519 public keys are exactly 32 bytes.
const PUBLIC_KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A registered possession credential, metadata only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasskeyCredential {
    /// Credential UUID.
    pub id: String,
    /// User-facing device label.
    pub device_name: String,
    /// Last accepted signature counter.
    pub counter: u64,
    /// ISO 8601 registration timestamp.
    pub created_at: String,
    /// ISO 8601 timestamp of the last successful assertion, if any.
    pub last_used_at: Option<String>,
}

/// Challenge handed to the client at the start of authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasskeyChallenge {
    /// Account being authenticated.
    pub account_id: String,
    /// Nonce to sign (URL-safe base64 of 32 random bytes).
    pub nonce: String,
    /// IDs of the account's registered credentials.
    pub credential_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Register a device public key for an account.
///
/// # Errors
///
/// - [`VaultError::Crypto`] if the key is not exactly 32 bytes.
/// - [`VaultError::AccountNotFound`] if the account does not exist.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn register_credential(
    db: &VaultDb,
    account_id: &str,
    public_key: &[u8],
    device_name: &str,
) -> Result<PasskeyCredential, VaultError> {
    if public_key.len() != PUBLIC_KEY_LEN {
        return Err(VaultError::Crypto(
            cadenas_crypto_core::CryptoError::InvalidKeyMaterial(format!(
                "expected {PUBLIC_KEY_LEN}-byte Ed25519 public key, got {} bytes",
                public_key.len()
            )),
        ));
    }

    // Surface a clean error instead of a foreign-key failure.
    accounts::get_account(db, account_id)?;

    let id = generate_uuid();
    let created_at = now_iso8601();

    db.connection().execute(
        "INSERT INTO passkey_credentials \
         (id, account_id, public_key, device_name, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id, account_id, public_key, device_name, created_at],
    )?;

    Ok(PasskeyCredential {
        id,
        device_name: device_name.to_owned(),
        counter: 0,
        created_at,
        last_used_at: None,
    })
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Start a possession-factor authentication by email.
///
/// Issues a single-use challenge bound to the account. An unknown email
/// or an account with no registered credentials fails with the same
/// generic error.
///
/// # Errors
///
/// - [`VaultError::InvalidCredential`] for an unknown email or an
///   account with no credentials.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn begin_authentication(
    db: &VaultDb,
    store: &ChallengeStore,
    email: &str,
    now: u64,
) -> Result<PasskeyChallenge, VaultError> {
    let conn = db.connection();

    let account_id: Option<String> = conn
        .query_row("SELECT id FROM accounts WHERE email = ?1", [email], |row| {
            row.get(0)
        })
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    let Some(account_id) = account_id else {
        return Err(VaultError::InvalidCredential);
    };

    let mut stmt =
        conn.prepare("SELECT id FROM passkey_credentials WHERE account_id = ?1 ORDER BY created_at")?;
    let rows = stmt.query_map([&account_id], |row| row.get::<_, String>(0))?;
    let mut credential_ids = Vec::new();
    for id in rows {
        credential_ids.push(id?);
    }
    if credential_ids.is_empty() {
        return Err(VaultError::InvalidCredential);
    }

    let nonce = store.issue(&challenge_subject(&account_id), now)?;

    Ok(PasskeyChallenge {
        account_id,
        nonce,
        credential_ids,
    })
}

/// Finish a possession-factor authentication.
///
/// Consumes the pending challenge, verifies the Ed25519 signature over
/// the nonce bytes, and accepts the assertion only if its counter is
/// strictly greater than the stored one. The counter update is a single
/// conditional `UPDATE`, so a replayed or raced assertion loses.
///
/// # Errors
///
/// - [`VaultError::ChallengeExpired`] if no matching live challenge
///   exists.
/// - [`VaultError::CredentialNotFound`] for an unknown credential ID.
/// - [`VaultError::InvalidCredential`] if the signature does not verify.
/// - [`VaultError::ReplayDetected`] if the counter did not increase.
/// - [`VaultError::Database`] for `SQLite` errors.
#[allow(clippy::too_many_arguments)]
pub fn finish_authentication(
    db: &VaultDb,
    store: &ChallengeStore,
    account_id: &str,
    credential_id: &str,
    nonce: &str,
    signature: &[u8],
    counter: u64,
    now: u64,
) -> Result<(), VaultError> {
    if !store.consume(&challenge_subject(account_id), nonce, now) {
        return Err(VaultError::ChallengeExpired);
    }

    let conn = db.connection();
    let public_key: Vec<u8> = conn
        .query_row(
            "SELECT public_key FROM passkey_credentials WHERE id = ?1 AND account_id = ?2",
            rusqlite::params![credential_id, account_id],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                VaultError::CredentialNotFound(credential_id.to_owned())
            }
            other => VaultError::from(other),
        })?;

    // The signed message is the raw nonce entropy, not its base64 form.
    let message = BASE64URL_NOPAD
        .decode(nonce.as_bytes())
        .map_err(|_| VaultError::InvalidCredential)?;

    UnparsedPublicKey::new(&ED25519, &public_key)
        .verify(&message, signature)
        .map_err(|_| VaultError::InvalidCredential)?;

    // Strictly increasing counter; ties and regressions are replays.
    let updated = conn.execute(
        "UPDATE passkey_credentials SET counter = ?1, last_used_at = ?2 \
         WHERE id = ?3 AND counter < ?1",
        rusqlite::params![
            i64::try_from(counter).unwrap_or(i64::MAX),
            now_iso8601(),
            credential_id
        ],
    )?;
    if updated == 0 {
        return Err(VaultError::ReplayDetected);
    }

    Ok(())
}

fn challenge_subject(account_id: &str) -> String {
    format!("passkey:{account_id}")
}

// ---------------------------------------------------------------------------
// Management
// ---------------------------------------------------------------------------

/// List an account's registered credentials.
///
/// # Errors
///
/// Returns [`VaultError::Database`] for `SQLite` errors.
pub fn list_credentials(
    db: &VaultDb,
    account_id: &str,
) -> Result<Vec<PasskeyCredential>, VaultError> {
    let conn = db.connection();
    let mut stmt = conn.prepare(
        "SELECT id, device_name, counter, created_at, last_used_at \
         FROM passkey_credentials WHERE account_id = ?1 ORDER BY created_at",
    )?;

    let rows = stmt.query_map([account_id], |row| {
        Ok(PasskeyCredential {
            id: row.get(0)?,
            device_name: row.get(1)?,
            counter: row.get::<_, i64>(2).map(|v| u64::try_from(v).unwrap_or(0))?,
            created_at: row.get(3)?,
            last_used_at: row.get(4)?,
        })
    })?;

    let mut credentials = Vec::new();
    for credential in rows {
        credentials.push(credential?);
    }
    Ok(credentials)
}

/// Remove a credential.
///
/// # Errors
///
/// - [`VaultError::CredentialNotFound`] if missing or owned by another
///   account.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn remove_credential(
    db: &VaultDb,
    account_id: &str,
    credential_id: &str,
) -> Result<(), VaultError> {
    let deleted = db.connection().execute(
        "DELETE FROM passkey_credentials WHERE id = ?1 AND account_id = ?2",
        rusqlite::params![credential_id, account_id],
    )?;
    if deleted == 0 {
        return Err(VaultError::CredentialNotFound(credential_id.to_owned()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts;
    use ring::rand::SystemRandom;
    use ring::signature::{Ed25519KeyPair, KeyPair};

    fn setup() -> (VaultDb, String, ChallengeStore) {
        let db = VaultDb::open_in_memory().expect("db");
        let account_id = accounts::register(&db, "passkey@example.com", "pw")
            .expect("register")
            .id;
        (db, account_id, ChallengeStore::in_memory(60))
    }

    fn device_keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("generate");
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("parse")
    }

    fn sign_nonce(keypair: &Ed25519KeyPair, nonce: &str) -> Vec<u8> {
        let message = BASE64URL_NOPAD.decode(nonce.as_bytes()).expect("decode");
        keypair.sign(&message).as_ref().to_vec()
    }

    #[test]
    fn full_handshake_succeeds() {
        let (db, account_id, store) = setup();
        let keypair = device_keypair();
        let credential =
            register_credential(&db, &account_id, keypair.public_key().as_ref(), "laptop")
                .expect("register credential");

        let challenge =
            begin_authentication(&db, &store, "passkey@example.com", 1_000).expect("begin");
        assert_eq!(challenge.credential_ids, vec![credential.id.clone()]);

        let signature = sign_nonce(&keypair, &challenge.nonce);
        finish_authentication(
            &db,
            &store,
            &account_id,
            &credential.id,
            &challenge.nonce,
            &signature,
            1,
            1_030,
        )
        .expect("finish");

        let listed = list_credentials(&db, &account_id).expect("list");
        assert_eq!(listed.first().expect("one credential").counter, 1);
        assert!(listed.first().expect("one credential").last_used_at.is_some());
    }

    #[test]
    fn unknown_email_and_no_credentials_look_the_same() {
        let (db, _account_id, store) = setup();

        let unknown = begin_authentication(&db, &store, "nobody@example.com", 1_000)
            .expect_err("unknown email");
        assert!(matches!(unknown, VaultError::InvalidCredential));

        // Known email, no credentials registered.
        let bare = begin_authentication(&db, &store, "passkey@example.com", 1_000)
            .expect_err("no credentials");
        assert!(matches!(bare, VaultError::InvalidCredential));
    }

    #[test]
    fn wrong_key_length_rejected() {
        let (db, account_id, _) = setup();
        let err = register_credential(&db, &account_id, &[0u8; 31], "bad")
            .expect_err("short key must fail");
        assert!(matches!(err, VaultError::Crypto(_)));
    }

    #[test]
    fn challenge_is_single_use() {
        let (db, account_id, store) = setup();
        let keypair = device_keypair();
        let credential =
            register_credential(&db, &account_id, keypair.public_key().as_ref(), "laptop")
                .expect("register credential");

        let challenge =
            begin_authentication(&db, &store, "passkey@example.com", 1_000).expect("begin");
        let signature = sign_nonce(&keypair, &challenge.nonce);

        finish_authentication(
            &db,
            &store,
            &account_id,
            &credential.id,
            &challenge.nonce,
            &signature,
            1,
            1_010,
        )
        .expect("first finish");

        let err = finish_authentication(
            &db,
            &store,
            &account_id,
            &credential.id,
            &challenge.nonce,
            &signature,
            2,
            1_010,
        )
        .expect_err("replayed challenge must fail");
        assert!(matches!(err, VaultError::ChallengeExpired));
    }

    #[test]
    fn expired_challenge_rejected() {
        let (db, account_id, store) = setup();
        let keypair = device_keypair();
        let credential =
            register_credential(&db, &account_id, keypair.public_key().as_ref(), "laptop")
                .expect("register credential");

        let challenge =
            begin_authentication(&db, &store, "passkey@example.com", 1_000).expect("begin");
        let signature = sign_nonce(&keypair, &challenge.nonce);

        let err = finish_authentication(
            &db,
            &store,
            &account_id,
            &credential.id,
            &challenge.nonce,
            &signature,
            1,
            1_060, // TTL is 60s
        )
        .expect_err("expired challenge must fail");
        assert!(matches!(err, VaultError::ChallengeExpired));
    }

    #[test]
    fn bad_signature_rejected() {
        let (db, account_id, store) = setup();
        let keypair = device_keypair();
        let impostor = device_keypair();
        let credential =
            register_credential(&db, &account_id, keypair.public_key().as_ref(), "laptop")
                .expect("register credential");

        let challenge =
            begin_authentication(&db, &store, "passkey@example.com", 1_000).expect("begin");
        let signature = sign_nonce(&impostor, &challenge.nonce);

        let err = finish_authentication(
            &db,
            &store,
            &account_id,
            &credential.id,
            &challenge.nonce,
            &signature,
            1,
            1_010,
        )
        .expect_err("impostor signature must fail");
        assert!(matches!(err, VaultError::InvalidCredential));
    }

    #[test]
    fn counter_must_strictly_increase() {
        let (db, account_id, store) = setup();
        let keypair = device_keypair();
        let credential =
            register_credential(&db, &account_id, keypair.public_key().as_ref(), "laptop")
                .expect("register credential");

        // First assertion with counter 5.
        let challenge =
            begin_authentication(&db, &store, "passkey@example.com", 1_000).expect("begin");
        let signature = sign_nonce(&keypair, &challenge.nonce);
        finish_authentication(
            &db,
            &store,
            &account_id,
            &credential.id,
            &challenge.nonce,
            &signature,
            5,
            1_010,
        )
        .expect("counter 5 accepted");

        // Fresh challenge, same counter: replay.
        let challenge =
            begin_authentication(&db, &store, "passkey@example.com", 1_100).expect("begin");
        let signature = sign_nonce(&keypair, &challenge.nonce);
        let err = finish_authentication(
            &db,
            &store,
            &account_id,
            &credential.id,
            &challenge.nonce,
            &signature,
            5,
            1_110,
        )
        .expect_err("equal counter must fail");
        assert!(matches!(err, VaultError::ReplayDetected));
    }

    #[test]
    fn remove_credential_owner_scoped() {
        let (db, account_id, _) = setup();
        let other = accounts::register(&db, "other@example.com", "pw")
            .expect("register")
            .id;
        let keypair = device_keypair();
        let credential =
            register_credential(&db, &account_id, keypair.public_key().as_ref(), "laptop")
                .expect("register credential");

        let err = remove_credential(&db, &other, &credential.id)
            .expect_err("foreign remove must fail");
        assert!(matches!(err, VaultError::CredentialNotFound(_)));

        remove_credential(&db, &account_id, &credential.id).expect("owner remove");
        assert!(list_credentials(&db, &account_id).expect("list").is_empty());
    }
}
