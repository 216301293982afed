//! `cadenas-vault` — Server-side credential store for CADENAS.
//!
//! Holds accounts, opaque encrypted records, share links, two-factor
//! state, and possession credentials in `SQLite`. Everything secret is
//! sealed client-side by `cadenas-crypto-core`; this crate only ever
//! sees ciphertext, verifiers, and public salts.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod accounts;
pub mod attachments;
pub mod challenge;
pub mod config;
pub mod db;
pub mod error;
pub mod passkeys;
pub mod records;
pub mod share;
pub mod twofa;

mod util;

pub use accounts::{
    get_account, register, rotate_passphrase, salt_for_email, verify_passphrase, Account,
};
pub use attachments::{
    add_attachment, delete_attachment, get_attachment, list_attachments, Attachment,
    AttachmentMetadata,
};
pub use challenge::{
    start_sweeper, ChallengeBackend, ChallengeStore, MemoryBackend, PendingChallenge, SweeperGuard,
};
pub use config::CoreConfig;
pub use db::VaultDb;
pub use error::VaultError;
pub use passkeys::{
    begin_authentication, finish_authentication, list_credentials, register_credential,
    remove_credential, PasskeyChallenge, PasskeyCredential,
};
pub use records::{
    add_record, delete_record, get_record, list_records, set_favorite, update_record, VaultRecord,
};
pub use share::{
    check_status, create as create_share_link, list_links, redeem, revoke, CreateShareOptions,
    RedeemedPayload, ShareLink, ShareStatus, TtlClass,
};
pub use twofa::{
    disable as disable_two_factor, enable as enable_two_factor,
    regenerate_backup_codes, setup as setup_two_factor, status as two_factor_status,
    verify_login as verify_second_factor, TotpSetup, TwoFactorStatus,
};
