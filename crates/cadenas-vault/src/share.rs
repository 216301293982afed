//! Share links: time-bounded, view-limited handoff of an encrypted payload.
//!
//! The stored payload is ciphertext re-encrypted by the client under a
//! fresh key that travels in the URL fragment and never reaches the
//! server. The server enforces expiry, the view budget, revocation, and
//! the optional access password; it cannot read what it hands out.

use cadenas_crypto_core::token::{generate_token, hash_access_password, verify_access_password};
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::db::VaultDb;
use crate::error::VaultError;
use crate::util::{generate_uuid, now_iso8601};

// ---------------------------------------------------------------------------
// TTL classes
// ---------------------------------------------------------------------------

/// Allowed lifetimes for a share link. Arbitrary durations are not
/// accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TtlClass {
    /// One hour.
    OneHour,
    /// One day.
    OneDay,
    /// Seven days.
    SevenDays,
}

impl TtlClass {
    /// Parse the wire form (`"1h"`, `"1d"`, `"7d"`).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidTtlClass`] for anything else.
    pub fn parse(input: &str) -> Result<Self, VaultError> {
        match input {
            "1h" => Ok(Self::OneHour),
            "1d" => Ok(Self::OneDay),
            "7d" => Ok(Self::SevenDays),
            other => Err(VaultError::InvalidTtlClass(other.to_owned())),
        }
    }

    /// Lifetime in seconds.
    #[must_use]
    pub const fn duration_secs(self) -> u64 {
        match self {
            Self::OneHour => 3_600,
            Self::OneDay => 86_400,
            Self::SevenDays => 604_800,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Options for creating a share link.
#[derive(Debug, Clone)]
pub struct CreateShareOptions {
    /// Lifetime class.
    pub ttl: TtlClass,
    /// Optional view budget. `None` means unlimited within the TTL.
    pub max_views: Option<u32>,
    /// Optional access password gating redemption.
    pub access_password: Option<String>,
    /// Optional source record the payload was built from.
    pub record_id: Option<String>,
}

/// A created share link, as returned to the owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    /// Link UUID.
    pub id: String,
    /// Opaque URL-safe redemption token.
    pub token: String,
    /// Expiry, UNIX seconds.
    pub expires_at: u64,
    /// View budget, if any.
    pub max_views: Option<u32>,
    /// Views consumed so far.
    pub view_count: u32,
    /// Whether redemption requires a password.
    pub password_protected: bool,
    /// Whether the owner revoked the link.
    pub revoked: bool,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// Payload handed out on successful redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedPayload {
    /// The opaque ciphertext.
    #[serde(with = "serde_bytes_b64")]
    pub ciphertext: Vec<u8>,
    /// The AEAD nonce.
    #[serde(with = "serde_bytes_b64")]
    pub nonce: Vec<u8>,
    /// Views consumed including this one.
    pub view_count: u32,
}

/// Non-consuming view of a link's state, keyed by token.
///
/// The individual flags tell an anonymous visitor why an invalid link
/// is invalid; none of them reveal the payload or the owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareStatus {
    /// Whether the link is currently redeemable (ignoring the password).
    pub valid: bool,
    /// Whether redemption requires a password.
    pub password_protected: bool,
    /// Whether the expiry timestamp has passed.
    pub is_expired: bool,
    /// Whether the owner revoked the link.
    pub is_revoked: bool,
    /// Whether the view budget is used up.
    pub is_exhausted: bool,
    /// Expiry, UNIX seconds.
    pub expires_at: u64,
    /// Views remaining, if a budget is set.
    pub views_remaining: Option<u32>,
}

mod serde_bytes_b64 {
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
// Creation
// ---------------------------------------------------------------------------

/// Create a share link over an already-encrypted payload.
///
/// The payload must have been sealed client-side under a link-specific
/// key; this function stores it verbatim. The access password, if any,
/// is stored as a hash.
///
/// # Errors
///
/// - [`VaultError::PayloadTooLarge`] if the ciphertext exceeds the cap.
/// - [`VaultError::RecordNotFound`] if `record_id` is set but does not
///   belong to the owner.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn create(
    db: &VaultDb,
    owner_id: &str,
    ciphertext: &[u8],
    nonce: &[u8],
    options: &CreateShareOptions,
    now: u64,
    config: &CoreConfig,
) -> Result<ShareLink, VaultError> {
    if ciphertext.len() > config.share_max_payload_bytes {
        return Err(VaultError::PayloadTooLarge {
            max_bytes: config.share_max_payload_bytes,
            actual_bytes: ciphertext.len(),
        });
    }

    let conn = db.connection();

    if let Some(record_id) = &options.record_id {
        let owned: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM vault_records WHERE id = ?1 AND owner_id = ?2)",
            rusqlite::params![record_id, owner_id],
            |row| row.get(0),
        )?;
        if !owned {
            return Err(VaultError::RecordNotFound(record_id.clone()));
        }
    }

    let id = generate_uuid();
    let token = generate_token()?;
    let expires_at = now.saturating_add(options.ttl.duration_secs());
    let password_hash = options
        .access_password
        .as_deref()
        .map(hash_access_password);
    let created_at = now_iso8601();

    conn.execute(
        "INSERT INTO shared_links \
         (id, owner_id, record_id, token, ciphertext, nonce, expires_at, \
          max_views, password_hash, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            id,
            owner_id,
            options.record_id,
            token,
            ciphertext,
            nonce,
            i64::try_from(expires_at).unwrap_or(i64::MAX),
            options.max_views,
            password_hash,
            created_at,
        ],
    )?;

    Ok(ShareLink {
        id,
        token,
        expires_at,
        max_views: options.max_views,
        view_count: 0,
        password_protected: password_hash.is_some(),
        revoked: false,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Redemption
// ---------------------------------------------------------------------------

/// Redeem a share link by token.
///
/// Checks run in a fixed order: existence, revocation, expiry, view
/// budget, password. The view counter is consumed with a conditional
/// `UPDATE` so concurrent redemptions of a nearly-exhausted link cannot
/// overspend the budget.
///
/// # Errors
///
/// - [`VaultError::LinkNotFound`] for an unknown token.
/// - [`VaultError::LinkRevoked`] if the owner revoked the link.
/// - [`VaultError::LinkExpired`] if `now` is at or past expiry.
/// - [`VaultError::LinkExhausted`] if the view budget is spent.
/// - [`VaultError::LinkPasswordRequired`] if a password is needed but
///   none was supplied.
/// - [`VaultError::LinkPasswordMismatch`] for a wrong password.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn redeem(
    db: &VaultDb,
    token: &str,
    access_password: Option<&str>,
    now: u64,
) -> Result<RedeemedPayload, VaultError> {
    let conn = db.connection();

    let row: Option<(String, Vec<u8>, Vec<u8>, i64, Option<u32>, u32, Option<String>, bool)> = conn
        .query_row(
            "SELECT id, ciphertext, nonce, expires_at, max_views, view_count, \
                    password_hash, revoked \
             FROM shared_links WHERE token = ?1",
            [token],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    let Some((id, ciphertext, nonce, expires_at, max_views, view_count, password_hash, revoked)) =
        row
    else {
        return Err(VaultError::LinkNotFound);
    };

    if revoked {
        return Err(VaultError::LinkRevoked);
    }
    if i64::try_from(now).unwrap_or(i64::MAX) >= expires_at {
        return Err(VaultError::LinkExpired);
    }
    if let Some(max) = max_views {
        if view_count >= max {
            return Err(VaultError::LinkExhausted);
        }
    }
    if let Some(stored_hash) = &password_hash {
        let Some(candidate) = access_password else {
            return Err(VaultError::LinkPasswordRequired);
        };
        if !verify_access_password(candidate, stored_hash) {
            return Err(VaultError::LinkPasswordMismatch);
        }
    }

    // Consume one view. The WHERE clause re-checks the budget so a
    // concurrent redeem that won the race leaves us with zero rows.
    let consumed = conn.execute(
        "UPDATE shared_links SET view_count = view_count + 1 \
         WHERE id = ?1 AND revoked = 0 \
           AND (max_views IS NULL OR view_count < max_views)",
        [&id],
    )?;
    if consumed == 0 {
        return Err(VaultError::LinkExhausted);
    }

    let new_count: u32 = conn.query_row(
        "SELECT view_count FROM shared_links WHERE id = ?1",
        [&id],
        |row| row.get(0),
    )?;

    Ok(RedeemedPayload {
        ciphertext,
        nonce,
        view_count: new_count,
    })
}

// ---------------------------------------------------------------------------
// Status and management
// ---------------------------------------------------------------------------

/// Report a link's state without consuming a view.
///
/// # Errors
///
/// - [`VaultError::LinkNotFound`] for an unknown token.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn check_status(db: &VaultDb, token: &str, now: u64) -> Result<ShareStatus, VaultError> {
    let (expires_at, max_views, view_count, password_hash, revoked): (
        i64,
        Option<u32>,
        u32,
        Option<String>,
        bool,
    ) = db
        .connection()
        .query_row(
            "SELECT expires_at, max_views, view_count, password_hash, revoked \
             FROM shared_links WHERE token = ?1",
            [token],
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
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => VaultError::LinkNotFound,
            other => VaultError::from(other),
        })?;

    let expired = i64::try_from(now).unwrap_or(i64::MAX) >= expires_at;
    let exhausted = max_views.is_some_and(|max| view_count >= max);

    Ok(ShareStatus {
        valid: !revoked && !expired && !exhausted,
        password_protected: password_hash.is_some(),
        is_expired: expired,
        is_revoked: revoked,
        is_exhausted: exhausted,
        expires_at: u64::try_from(expires_at).unwrap_or(0),
        views_remaining: max_views.map(|max| max.saturating_sub(view_count)),
    })
}

/// Revoke a link. Terminal and idempotent; only the owner's links are
/// touched.
///
/// # Errors
///
/// - [`VaultError::LinkNotFound`] if the link does not exist or belongs
///   to someone else.
/// - [`VaultError::Database`] for `SQLite` errors.
pub fn revoke(db: &VaultDb, owner_id: &str, link_id: &str) -> Result<(), VaultError> {
    let conn = db.connection();
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM shared_links WHERE id = ?1 AND owner_id = ?2)",
        rusqlite::params![link_id, owner_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(VaultError::LinkNotFound);
    }

    conn.execute(
        "UPDATE shared_links SET revoked = 1 WHERE id = ?1 AND owner_id = ?2",
        rusqlite::params![link_id, owner_id],
    )?;
    Ok(())
}

/// List an owner's links, newest first.
///
/// # Errors
///
/// Returns [`VaultError::Database`] for `SQLite` errors.
pub fn list_links(db: &VaultDb, owner_id: &str) -> Result<Vec<ShareLink>, VaultError> {
    let conn = db.connection();
    let mut stmt = conn.prepare(
        "SELECT id, token, expires_at, max_views, view_count, password_hash, revoked, created_at \
         FROM shared_links WHERE owner_id = ?1 ORDER BY created_at DESC",
    )?;

    let rows = stmt.query_map([owner_id], |row| {
        Ok(ShareLink {
            id: row.get(0)?,
            token: row.get(1)?,
            expires_at: row.get::<_, i64>(2).map(|v| u64::try_from(v).unwrap_or(0))?,
            max_views: row.get(3)?,
            view_count: row.get(4)?,
            password_protected: row.get::<_, Option<String>>(5)?.is_some(),
            revoked: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;

    let mut links = Vec::new();
    for link in rows {
        links.push(link?);
    }
    Ok(links)
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
        let owner = accounts::register(&db, "share@example.com", "pw")
            .expect("register")
            .id;
        (db, owner)
    }

    fn options(ttl: TtlClass) -> CreateShareOptions {
        CreateShareOptions {
            ttl,
            max_views: None,
            access_password: None,
            record_id: None,
        }
    }

    #[test]
    fn create_and_redeem_roundtrip() {
        let (db, owner) = setup();
        let config = CoreConfig::default();
        let link = create(
            &db,
            &owner,
            b"sealed-bytes",
            &[7u8; 12],
            &options(TtlClass::OneHour),
            1_000,
            &config,
        )
        .expect("create");
        assert_eq!(link.expires_at, 4_600);
        assert_eq!(link.token.len(), 43);

        let payload = redeem(&db, &link.token, None, 2_000).expect("redeem");
        assert_eq!(payload.ciphertext, b"sealed-bytes");
        assert_eq!(payload.nonce, [7u8; 12]);
        assert_eq!(payload.view_count, 1);
    }

    #[test]
    fn unknown_token_not_found() {
        let (db, _) = setup();
        let err = redeem(&db, "no-such-token", None, 1_000).expect_err("must fail");
        assert!(matches!(err, VaultError::LinkNotFound));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let (db, owner) = setup();
        let config = CoreConfig::default();
        let link = create(
            &db,
            &owner,
            b"payload",
            &[0u8; 12],
            &options(TtlClass::OneHour),
            1_000,
            &config,
        )
        .expect("create");

        // One second before expiry: fine.
        redeem(&db, &link.token, None, 4_599).expect("still valid");
        // At expiry: gone.
        let err = redeem(&db, &link.token, None, 4_600).expect_err("expired");
        assert!(matches!(err, VaultError::LinkExpired));
    }

    #[test]
    fn view_budget_enforced() {
        let (db, owner) = setup();
        let config = CoreConfig::default();
        let mut opts = options(TtlClass::OneDay);
        opts.max_views = Some(2);
        let link = create(&db, &owner, b"p", &[0u8; 12], &opts, 1_000, &config).expect("create");

        redeem(&db, &link.token, None, 1_100).expect("view 1");
        redeem(&db, &link.token, None, 1_200).expect("view 2");
        let err = redeem(&db, &link.token, None, 1_300).expect_err("view 3 must fail");
        assert!(matches!(err, VaultError::LinkExhausted));
    }

    #[test]
    fn password_gate_ordering() {
        let (db, owner) = setup();
        let config = CoreConfig::default();
        let mut opts = options(TtlClass::OneDay);
        opts.max_views = Some(1);
        opts.access_password = Some("x7q".to_owned());
        let link = create(&db, &owner, b"p", &[0u8; 12], &opts, 1_000, &config).expect("create");

        let missing = redeem(&db, &link.token, None, 1_100).expect_err("no password");
        assert!(matches!(missing, VaultError::LinkPasswordRequired));

        let wrong = redeem(&db, &link.token, Some("nope"), 1_100).expect_err("wrong password");
        assert!(matches!(wrong, VaultError::LinkPasswordMismatch));

        // Failed password attempts must not consume views.
        let payload = redeem(&db, &link.token, Some("x7q"), 1_100).expect("right password");
        assert_eq!(payload.view_count, 1);

        let spent = redeem(&db, &link.token, Some("x7q"), 1_100).expect_err("budget spent");
        assert!(matches!(spent, VaultError::LinkExhausted));
    }

    #[test]
    fn revoke_is_terminal_and_idempotent() {
        let (db, owner) = setup();
        let config = CoreConfig::default();
        let link = create(
            &db,
            &owner,
            b"p",
            &[0u8; 12],
            &options(TtlClass::SevenDays),
            1_000,
            &config,
        )
        .expect("create");

        revoke(&db, &owner, &link.id).expect("revoke");
        revoke(&db, &owner, &link.id).expect("revoke again is a no-op");

        let err = redeem(&db, &link.token, None, 1_100).expect_err("revoked");
        assert!(matches!(err, VaultError::LinkRevoked));
    }

    #[test]
    fn revoke_is_owner_scoped() {
        let (db, owner) = setup();
        let other = accounts::register(&db, "other@example.com", "pw")
            .expect("register")
            .id;
        let config = CoreConfig::default();
        let link = create(
            &db,
            &owner,
            b"p",
            &[0u8; 12],
            &options(TtlClass::OneDay),
            1_000,
            &config,
        )
        .expect("create");

        let err = revoke(&db, &other, &link.id).expect_err("foreign revoke must fail");
        assert!(matches!(err, VaultError::LinkNotFound));
    }

    #[test]
    fn status_does_not_consume_views() {
        let (db, owner) = setup();
        let config = CoreConfig::default();
        let mut opts = options(TtlClass::OneDay);
        opts.max_views = Some(1);
        let link = create(&db, &owner, b"p", &[0u8; 12], &opts, 1_000, &config).expect("create");

        for _ in 0..3 {
            let status = check_status(&db, &link.token, 1_100).expect("status");
            assert!(status.valid);
            assert_eq!(status.views_remaining, Some(1));
        }
        redeem(&db, &link.token, None, 1_100).expect("budget intact");
    }

    #[test]
    fn status_reports_the_reason_a_link_is_invalid() {
        let (db, owner) = setup();
        let config = CoreConfig::default();

        // Revoked link.
        let revoked_link = create(
            &db,
            &owner,
            b"p",
            &[0u8; 12],
            &options(TtlClass::OneDay),
            1_000,
            &config,
        )
        .expect("create");
        revoke(&db, &owner, &revoked_link.id).expect("revoke");
        let status = check_status(&db, &revoked_link.token, 1_100).expect("status");
        assert!(!status.valid);
        assert!(status.is_revoked);
        assert!(!status.is_expired);
        assert!(!status.is_exhausted);

        // Expired link.
        let expired_link = create(
            &db,
            &owner,
            b"p",
            &[0u8; 12],
            &options(TtlClass::OneHour),
            1_000,
            &config,
        )
        .expect("create");
        let status = check_status(&db, &expired_link.token, 5_000).expect("status");
        assert!(!status.valid);
        assert!(status.is_expired);
        assert!(!status.is_revoked);
        assert!(!status.is_exhausted);

        // Exhausted link.
        let mut opts = options(TtlClass::OneDay);
        opts.max_views = Some(1);
        let spent_link = create(&db, &owner, b"p", &[0u8; 12], &opts, 1_000, &config)
            .expect("create");
        redeem(&db, &spent_link.token, None, 1_100).expect("spend the view");
        let status = check_status(&db, &spent_link.token, 1_200).expect("status");
        assert!(!status.valid);
        assert!(status.is_exhausted);
        assert!(!status.is_revoked);
        assert!(!status.is_expired);

        // Healthy link reports all-clear.
        let live_link = create(
            &db,
            &owner,
            b"p",
            &[0u8; 12],
            &options(TtlClass::OneDay),
            1_000,
            &config,
        )
        .expect("create");
        let status = check_status(&db, &live_link.token, 1_100).expect("status");
        assert!(status.valid);
        assert!(!status.is_expired && !status.is_revoked && !status.is_exhausted);
    }

    #[test]
    fn payload_cap_enforced() {
        let (db, owner) = setup();
        let config = CoreConfig {
            share_max_payload_bytes: 8,
            ..CoreConfig::default()
        };
        let err = create(
            &db,
            &owner,
            b"nine bytes",
            &[0u8; 12],
            &options(TtlClass::OneHour),
            1_000,
            &config,
        )
        .expect_err("oversized payload must fail");
        assert!(matches!(err, VaultError::PayloadTooLarge { .. }));
    }

    #[test]
    fn ttl_class_parsing() {
        assert_eq!(TtlClass::parse("1h").expect("1h"), TtlClass::OneHour);
        assert_eq!(TtlClass::parse("1d").expect("1d"), TtlClass::OneDay);
        assert_eq!(TtlClass::parse("7d").expect("7d"), TtlClass::SevenDays);
        assert!(matches!(
            TtlClass::parse("2h"),
            Err(VaultError::InvalidTtlClass(_))
        ));
    }

    #[test]
    fn list_links_owner_scoped() {
        let (db, owner) = setup();
        let other = accounts::register(&db, "other@example.com", "pw")
            .expect("register")
            .id;
        let config = CoreConfig::default();
        create(
            &db,
            &owner,
            b"a",
            &[0u8; 12],
            &options(TtlClass::OneDay),
            1_000,
            &config,
        )
        .expect("create");
        create(
            &db,
            &other,
            b"b",
            &[0u8; 12],
            &options(TtlClass::OneDay),
            1_000,
            &config,
        )
        .expect("create");

        assert_eq!(list_links(&db, &owner).expect("list").len(), 1);
    }
}
