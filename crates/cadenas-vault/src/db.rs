//! `SQLite` connection handling and the forward-only migration runner.
//!
//! The database holds opaque ciphertext and credential verifiers only, so
//! plain `SQLite` is sufficient — the secrecy boundary is the client-side
//! envelope, not the storage file.

use std::fmt;
use std::path::Path;

use rusqlite::Connection;

use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Embedded migrations
// ---------------------------------------------------------------------------

/// Forward-only SQL migrations, embedded at compile time.
/// Index 0 → version 1, index 1 → version 2, etc.
const MIGRATIONS: &[&str] = &[
    include_str!("../migrations/001_initial_schema.sql"),
    include_str!("../migrations/002_shared_links.sql"),
    include_str!("../migrations/003_two_factor.sql"),
    include_str!("../migrations/004_attachments.sql"),
    include_str!("../migrations/005_passkey_credentials.sql"),
];

// ---------------------------------------------------------------------------
// VaultDb
// ---------------------------------------------------------------------------

/// Handle to an open, migrated credential-store database.
///
/// All store I/O flows through this struct.
pub struct VaultDb {
    conn: Connection,
}

impl fmt::Debug for VaultDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultDb(***)")
    }
}

impl VaultDb {
    /// Open (or create) the store database at `path`.
    ///
    /// Enables WAL journal mode and foreign key enforcement, then runs any
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Database`] for `SQLite` errors.
    /// - [`VaultError::Migration`] if a migration fails.
    pub fn open(path: &Path) -> Result<Self, VaultError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database. Used by tests.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Database`] for `SQLite` errors.
    /// - [`VaultError::Migration`] if a migration fails.
    pub fn open_in_memory() -> Result<Self, VaultError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, VaultError> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let mut db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Returns a reference to the underlying [`rusqlite::Connection`].
    ///
    /// Primarily for use in tests and downstream CRUD operations.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns the current schema version (`PRAGMA user_version`).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Database`] if the pragma query fails.
    pub fn schema_version(&self) -> Result<i32, VaultError> {
        let v: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(v)
    }

    // -----------------------------------------------------------------------
    // Migration runner
    // -----------------------------------------------------------------------

    /// Apply all pending migrations sequentially.
    ///
    /// Each migration is wrapped in a transaction. The `user_version` pragma
    /// is bumped atomically on commit.
    fn run_migrations(&mut self) -> Result<(), VaultError> {
        let current = self.schema_version()?;

        for (idx, sql) in MIGRATIONS.iter().enumerate() {
            // Migration versions are 1-indexed: index 0 → version 1.
            let version = idx
                .checked_add(1)
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| VaultError::Migration("migration index overflow".into()))?;

            if version <= current {
                continue; // already applied
            }

            let tx = self.conn.transaction().map_err(|e| {
                VaultError::Migration(format!(
                    "failed to start transaction for migration {version}: {e}"
                ))
            })?;

            tx.execute_batch(sql)
                .map_err(|e| VaultError::Migration(format!("migration {version} failed: {e}")))?;

            tx.pragma_update(None, "user_version", version)
                .map_err(|e| {
                    VaultError::Migration(format!(
                        "failed to update user_version to {version}: {e}"
                    ))
                })?;

            tx.commit().map_err(|e| {
                VaultError::Migration(format!("failed to commit migration {version}: {e}"))
            })?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
