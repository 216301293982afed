//! Vault record CRUD. Every row is opaque ciphertext plus its nonce;
//! the server never interprets the payload. All operations are scoped
//! to the owning account.

use cadenas_crypto_core::envelope::NONCE_LEN;
use serde::{Deserialize, Serialize};

use crate::db::VaultDb;
use crate::error::VaultError;
use crate::util::{generate_uuid, now_iso8601};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A stored vault record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecord {
    /// Record UUID.
    pub id: String,
    /// Opaque AEAD ciphertext (tag included).
    #[serde(rename = "encryptedData", with = "serde_b64")]
    pub ciphertext: Vec<u8>,
    /// AEAD nonce.
    #[serde(rename = "iv", with = "serde_b64")]
    pub nonce: Vec<u8>,
    /// Client-side category label (plaintext by design — it drives list
    /// filtering without decryption).
    pub category: String,
    /// Whether the record is pinned as a favorite.
    pub favorite: bool,
    /// Manual sort position among favorites.
    pub favorite_order: Option<i64>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

mod serde_b64 {
    use data_encoding::BASE64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// Insert a new record.
///
/// # Errors
///
/// - [`VaultError::Crypto`] if the nonce is not exactly 12 bytes.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn add_record(
    db: &VaultDb,
    owner_id: &str,
    ciphertext: &[u8],
    nonce: &[u8],
    category: &str,
) -> Result<VaultRecord, VaultError> {
    check_nonce(nonce)?;

    let id = generate_uuid();
    let now = now_iso8601();

    db.connection().execute(
        "INSERT INTO vault_records \
         (id, owner_id, ciphertext, nonce, category, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        rusqlite::params![id, owner_id, ciphertext, nonce, category, now],
    )?;

    Ok(VaultRecord {
        id,
        ciphertext: ciphertext.to_vec(),
        nonce: nonce.to_vec(),
        category: category.to_owned(),
        favorite: false,
        favorite_order: None,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Replace a record's payload. Ciphertext and nonce always travel
/// together; there is no way to update one without the other.
///
/// # Errors
///
/// - [`VaultError::Crypto`] if the nonce is not exactly 12 bytes.
/// - [`VaultError::RecordNotFound`] if the record is missing or owned
///   by someone else.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn update_record(
    db: &VaultDb,
    owner_id: &str,
    record_id: &str,
    ciphertext: &[u8],
    nonce: &[u8],
    category: &str,
) -> Result<(), VaultError> {
    check_nonce(nonce)?;

    let updated = db.connection().execute(
        "UPDATE vault_records \
         SET ciphertext = ?1, nonce = ?2, category = ?3, updated_at = ?4 \
         WHERE id = ?5 AND owner_id = ?6",
        rusqlite::params![ciphertext, nonce, category, now_iso8601(), record_id, owner_id],
    )?;
    if updated == 0 {
        return Err(VaultError::RecordNotFound(record_id.to_owned()));
    }
    Ok(())
}

/// Fetch a single record.
///
/// # Errors
///
/// - [`VaultError::RecordNotFound`] if the record is missing or owned
///   by someone else.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn get_record(db: &VaultDb, owner_id: &str, record_id: &str) -> Result<VaultRecord, VaultError> {
    db.connection()
        .query_row(
            "SELECT id, ciphertext, nonce, category, favorite, favorite_order, \
                    created_at, updated_at \
             FROM vault_records WHERE id = ?1 AND owner_id = ?2",
            rusqlite::params![record_id, owner_id],
            row_to_record,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                VaultError::RecordNotFound(record_id.to_owned())
            }
            other => VaultError::from(other),
        })
}

/// List an owner's records, favorites first, then newest first.
///
/// An optional category filter narrows the result.
///
/// # Errors
///
/// Returns [`VaultError::Database`] for `SQLite` errors.
pub fn list_records(
    db: &VaultDb,
    owner_id: &str,
    category: Option<&str>,
) -> Result<Vec<VaultRecord>, VaultError> {
    let conn = db.connection();
    let mut records = Vec::new();

    if let Some(category) = category {
        let mut stmt = conn.prepare(
            "SELECT id, ciphertext, nonce, category, favorite, favorite_order, \
                    created_at, updated_at \
             FROM vault_records WHERE owner_id = ?1 AND category = ?2 \
             ORDER BY favorite DESC, favorite_order ASC, created_at DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![owner_id, category], row_to_record)?;
        for record in rows {
            records.push(record?);
        }
    } else {
        let mut stmt = conn.prepare(
            "SELECT id, ciphertext, nonce, category, favorite, favorite_order, \
                    created_at, updated_at \
             FROM vault_records WHERE owner_id = ?1 \
             ORDER BY favorite DESC, favorite_order ASC, created_at DESC",
        )?;
        let rows = stmt.query_map([owner_id], row_to_record)?;
        for record in rows {
            records.push(record?);
        }
    }

    Ok(records)
}

/// Delete a record. Attachments go with it via `ON DELETE CASCADE`.
///
/// # Errors
///
/// - [`VaultError::RecordNotFound`] if the record is missing or owned
///   by someone else.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn delete_record(db: &VaultDb, owner_id: &str, record_id: &str) -> Result<(), VaultError> {
    let deleted = db.connection().execute(
        "DELETE FROM vault_records WHERE id = ?1 AND owner_id = ?2",
        rusqlite::params![record_id, owner_id],
    )?;
    if deleted == 0 {
        return Err(VaultError::RecordNotFound(record_id.to_owned()));
    }
    Ok(())
}

/// Pin or unpin a record as a favorite, with an optional manual sort
/// position. Unpinning clears the position.
///
/// # Errors
///
/// - [`VaultError::RecordNotFound`] if the record is missing or owned
///   by someone else.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn set_favorite(
    db: &VaultDb,
    owner_id: &str,
    record_id: &str,
    favorite: bool,
    order: Option<i64>,
) -> Result<(), VaultError> {
    let favorite_order = if favorite { order } else { None };
    let updated = db.connection().execute(
        "UPDATE vault_records SET favorite = ?1, favorite_order = ?2, updated_at = ?3 \
         WHERE id = ?4 AND owner_id = ?5",
        rusqlite::params![favorite, favorite_order, now_iso8601(), record_id, owner_id],
    )?;
    if updated == 0 {
        return Err(VaultError::RecordNotFound(record_id.to_owned()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn check_nonce(nonce: &[u8]) -> Result<(), VaultError> {
    if nonce.len() != NONCE_LEN {
        return Err(VaultError::Crypto(
            cadenas_crypto_core::CryptoError::InvalidKeyMaterial(format!(
                "expected {NONCE_LEN}-byte nonce, got {} bytes",
                nonce.len()
            )),
        ));
    }
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<VaultRecord, rusqlite::Error> {
    Ok(VaultRecord {
        id: row.get(0)?,
        ciphertext: row.get(1)?,
        nonce: row.get(2)?,
        category: row.get(3)?,
        favorite: row.get(4)?,
        favorite_order: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts;

    fn setup() -> (VaultDb, String) {
        let db = VaultDb::open_in_memory().expect("db");
        let owner = accounts::register(&db, "records@example.com", "pw")
            .expect("register")
            .id;
        (db, owner)
    }

    #[test]
    fn add_get_roundtrip() {
        let (db, owner) = setup();
        let added = add_record(&db, &owner, b"ct", &[1u8; 12], "login").expect("add");
        let fetched = get_record(&db, &owner, &added.id).expect("get");
        assert_eq!(fetched.ciphertext, b"ct");
        assert_eq!(fetched.nonce, [1u8; 12]);
        assert_eq!(fetched.category, "login");
        assert!(!fetched.favorite);
    }

    #[test]
    fn bad_nonce_length_rejected() {
        let (db, owner) = setup();
        let err = add_record(&db, &owner, b"ct", &[1u8; 11], "login").expect_err("short nonce");
        assert!(matches!(err, VaultError::Crypto(_)));
    }

    #[test]
    fn update_replaces_payload_atomically() {
        let (db, owner) = setup();
        let added = add_record(&db, &owner, b"old", &[1u8; 12], "login").expect("add");
        update_record(&db, &owner, &added.id, b"new", &[2u8; 12], "note").expect("update");

        let fetched = get_record(&db, &owner, &added.id).expect("get");
        assert_eq!(fetched.ciphertext, b"new");
        assert_eq!(fetched.nonce, [2u8; 12]);
        assert_eq!(fetched.category, "note");
    }

    #[test]
    fn cross_owner_access_denied() {
        let (db, owner) = setup();
        let other = accounts::register(&db, "other@example.com", "pw")
            .expect("register")
            .id;
        let added = add_record(&db, &owner, b"ct", &[1u8; 12], "login").expect("add");

        assert!(matches!(
            get_record(&db, &other, &added.id),
            Err(VaultError::RecordNotFound(_))
        ));
        assert!(matches!(
            delete_record(&db, &other, &added.id),
            Err(VaultError::RecordNotFound(_))
        ));
        assert!(matches!(
            update_record(&db, &other, &added.id, b"x", &[0u8; 12], "login"),
            Err(VaultError::RecordNotFound(_))
        ));
    }

    #[test]
    fn list_filters_by_category() {
        let (db, owner) = setup();
        add_record(&db, &owner, b"a", &[1u8; 12], "login").expect("add");
        add_record(&db, &owner, b"b", &[2u8; 12], "note").expect("add");
        add_record(&db, &owner, b"c", &[3u8; 12], "login").expect("add");

        assert_eq!(list_records(&db, &owner, None).expect("all").len(), 3);
        assert_eq!(
            list_records(&db, &owner, Some("login")).expect("login").len(),
            2
        );
        assert_eq!(
            list_records(&db, &owner, Some("card")).expect("card").len(),
            0
        );
    }

    #[test]
    fn favorites_sort_first() {
        let (db, owner) = setup();
        let a = add_record(&db, &owner, b"a", &[1u8; 12], "login").expect("add");
        let b = add_record(&db, &owner, b"b", &[2u8; 12], "login").expect("add");
        set_favorite(&db, &owner, &b.id, true, Some(1)).expect("favorite");

        let listed = list_records(&db, &owner, None).expect("list");
        assert_eq!(listed.first().expect("two records").id, b.id);

        // Unpin clears the order.
        set_favorite(&db, &owner, &b.id, false, Some(1)).expect("unpin");
        let fetched = get_record(&db, &owner, &b.id).expect("get");
        assert!(!fetched.favorite);
        assert_eq!(fetched.favorite_order, None);
        let _ = a;
    }

    #[test]
    fn delete_removes_record() {
        let (db, owner) = setup();
        let added = add_record(&db, &owner, b"ct", &[1u8; 12], "login").expect("add");
        delete_record(&db, &owner, &added.id).expect("delete");
        assert!(matches!(
            get_record(&db, &owner, &added.id),
            Err(VaultError::RecordNotFound(_))
        ));
    }

    #[test]
    fn wire_shape_uses_encrypted_data_and_iv() {
        let (db, owner) = setup();
        let added = add_record(&db, &owner, b"ct", &[1u8; 12], "login").expect("add");
        let json = serde_json::to_value(&added).expect("serialize");
        assert!(json.get("encryptedData").is_some());
        assert!(json.get("iv").is_some());
        assert!(json.get("ciphertext").is_none());
    }
}
