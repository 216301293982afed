//! Encrypted attachments bound to a vault record.
//!
//! The blob arrives already sealed; the server checks only the declared
//! MIME type against a fixed allow-list and the declared size against
//! the configured cap, then stores it opaquely.

use cadenas_crypto_core::envelope::NONCE_LEN;
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::db::VaultDb;
use crate::error::VaultError;
use crate::util::{generate_uuid, now_iso8601};

/// MIME types accepted for attachments. `image/jpg` is non-standard but
/// common in the wild, so it is tolerated alongside `image/jpeg`.
const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/jpg",
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Attachment metadata, returned without the blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMetadata {
    /// Attachment UUID.
    pub id: String,
    /// Owning record UUID.
    pub record_id: String,
    /// Original filename (client-chosen, stored verbatim).
    pub filename: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Declared decrypted size in bytes.
    pub size_bytes: u64,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// A full attachment: metadata plus the sealed blob.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Metadata.
    pub metadata: AttachmentMetadata,
    /// Opaque AEAD ciphertext.
    pub ciphertext: Vec<u8>,
    /// AEAD nonce.
    pub nonce: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Attach a sealed blob to a record.
///
/// # Errors
///
/// - [`VaultError::UnsupportedMimeType`] if the MIME type is not on the
///   allow-list.
/// - [`VaultError::PayloadTooLarge`] if the declared size exceeds the
///   configured cap.
/// - [`VaultError::RecordNotFound`] if the record is missing or owned
///   by someone else.
/// - [`VaultError::Crypto`] if the nonce is not exactly 12 bytes.
/// - [`VaultError::Database`] for `SQLite` errors.
#[allow(clippy::too_many_arguments)]
pub fn add_attachment(
    db: &VaultDb,
    owner_id: &str,
    record_id: &str,
    filename: &str,
    mime_type: &str,
    size_bytes: u64,
    ciphertext: &[u8],
    nonce: &[u8],
    config: &CoreConfig,
) -> Result<AttachmentMetadata, VaultError> {
    if !ALLOWED_MIME_TYPES.contains(&mime_type) {
        return Err(VaultError::UnsupportedMimeType(mime_type.to_owned()));
    }
    let max = config.attachment_max_bytes;
    if usize::try_from(size_bytes).map_or(true, |declared| declared > max) {
        return Err(VaultError::PayloadTooLarge {
            max_bytes: max,
            actual_bytes: usize::try_from(size_bytes).unwrap_or(usize::MAX),
        });
    }
    if nonce.len() != NONCE_LEN {
        return Err(VaultError::Crypto(
            cadenas_crypto_core::CryptoError::InvalidKeyMaterial(format!(
                "expected {NONCE_LEN}-byte nonce, got {} bytes",
                nonce.len()
            )),
        ));
    }

    let conn = db.connection();
    let owned: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM vault_records WHERE id = ?1 AND owner_id = ?2)",
        rusqlite::params![record_id, owner_id],
        |row| row.get(0),
    )?;
    if !owned {
        return Err(VaultError::RecordNotFound(record_id.to_owned()));
    }

    let id = generate_uuid();
    let created_at = now_iso8601();

    conn.execute(
        "INSERT INTO attachments \
         (id, record_id, owner_id, filename, mime_type, size_bytes, ciphertext, nonce, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            id,
            record_id,
            owner_id,
            filename,
            mime_type,
            i64::try_from(size_bytes).unwrap_or(i64::MAX),
            ciphertext,
            nonce,
            created_at,
        ],
    )?;

    Ok(AttachmentMetadata {
        id,
        record_id: record_id.to_owned(),
        filename: filename.to_owned(),
        mime_type: mime_type.to_owned(),
        size_bytes,
        created_at,
    })
}

/// Fetch an attachment including its blob.
///
/// # Errors
///
/// - [`VaultError::AttachmentNotFound`] if missing or owned by someone
///   else.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn get_attachment(
    db: &VaultDb,
    owner_id: &str,
    attachment_id: &str,
) -> Result<Attachment, VaultError> {
    db.connection()
        .query_row(
            "SELECT id, record_id, filename, mime_type, size_bytes, ciphertext, nonce, created_at \
             FROM attachments WHERE id = ?1 AND owner_id = ?2",
            rusqlite::params![attachment_id, owner_id],
            |row| {
                Ok(Attachment {
                    metadata: AttachmentMetadata {
                        id: row.get(0)?,
                        record_id: row.get(1)?,
                        filename: row.get(2)?,
                        mime_type: row.get(3)?,
                        size_bytes: row
                            .get::<_, i64>(4)
                            .map(|v| u64::try_from(v).unwrap_or(0))?,
                        created_at: row.get(7)?,
                    },
                    ciphertext: row.get(5)?,
                    nonce: row.get(6)?,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                VaultError::AttachmentNotFound(attachment_id.to_owned())
            }
            other => VaultError::from(other),
        })
}

/// List the attachments of a record, metadata only.
///
/// # Errors
///
/// Returns [`VaultError::Database`] for `SQLite` errors.
pub fn list_attachments(
    db: &VaultDb,
    owner_id: &str,
    record_id: &str,
) -> Result<Vec<AttachmentMetadata>, VaultError> {
    let conn = db.connection();
    let mut stmt = conn.prepare(
        "SELECT id, record_id, filename, mime_type, size_bytes, created_at \
         FROM attachments WHERE record_id = ?1 AND owner_id = ?2 \
         ORDER BY created_at ASC",
    )?;

    let rows = stmt.query_map(rusqlite::params![record_id, owner_id], |row| {
        Ok(AttachmentMetadata {
            id: row.get(0)?,
            record_id: row.get(1)?,
            filename: row.get(2)?,
            mime_type: row.get(3)?,
            size_bytes: row.get::<_, i64>(4).map(|v| u64::try_from(v).unwrap_or(0))?,
            created_at: row.get(5)?,
        })
    })?;

    let mut attachments = Vec::new();
    for attachment in rows {
        attachments.push(attachment?);
    }
    Ok(attachments)
}

/// Delete an attachment.
///
/// # Errors
///
/// - [`VaultError::AttachmentNotFound`] if missing or owned by someone
///   else.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn delete_attachment(
    db: &VaultDb,
    owner_id: &str,
    attachment_id: &str,
) -> Result<(), VaultError> {
    let deleted = db.connection().execute(
        "DELETE FROM attachments WHERE id = ?1 AND owner_id = ?2",
        rusqlite::params![attachment_id, owner_id],
    )?;
    if deleted == 0 {
        return Err(VaultError::AttachmentNotFound(attachment_id.to_owned()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
