// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded identity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `kv`: namespaced key → TTL envelope (OTP records, revoked token digests)
//! - `users`: user id → serialized `UserRecord`
//! - `users_by_username` / `users_by_mobile` / `users_by_email`: unique indices → user id
//! - `roles`: role id → serialized `RoleRecord`
//! - `roles_by_name`: role name → role id
//! - `role_users`: assignment id → serialized `RoleUserRecord`
//! - `user_roles`: (user id, role id) → assignment id
//! - `sequences`: table name → last allocated id

use std::path::Path;

use redb::{
    backends::InMemoryBackend, Database, ReadableDatabase, ReadableTable, TableDefinition,
    WriteTransaction,
};

// =============================================================================
// Table Definitions
// =============================================================================

/// TTL key/value entries shared by the OTP store and the revocation registry.
pub(crate) const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Primary user table: id → JSON `UserRecord`.
pub(crate) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

/// Unique index: username → user id.
pub(crate) const USERS_BY_USERNAME: TableDefinition<&str, u64> =
    TableDefinition::new("users_by_username");

/// Unique index: mobile number → user id.
pub(crate) const USERS_BY_MOBILE: TableDefinition<&str, u64> =
    TableDefinition::new("users_by_mobile");

/// Unique index: lowercase email → user id.
pub(crate) const USERS_BY_EMAIL: TableDefinition<&str, u64> =
    TableDefinition::new("users_by_email");

/// Role table: id → JSON `RoleRecord`.
pub(crate) const ROLES: TableDefinition<u64, &[u8]> = TableDefinition::new("roles");

/// Unique index: role name → role id.
pub(crate) const ROLES_BY_NAME: TableDefinition<&str, u64> = TableDefinition::new("roles_by_name");

/// Join rows: assignment id → JSON `RoleUserRecord`.
pub(crate) const ROLE_USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("role_users");

/// Index: (user id, role id) → assignment id, range-scanned per user.
pub(crate) const USER_ROLES: TableDefinition<(u64, u64), u64> = TableDefinition::new("user_roles");

/// Id sequences: table name → last allocated id.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A unique column already holds the value; carries the column name.
    #[error("conflict on {0}")]
    Conflict(&'static str),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// AuthDatabase
// =============================================================================

/// Embedded ACID database holding users, roles and TTL key/value entries.
pub struct AuthDatabase {
    db: Database,
}

impl AuthDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;
        Self::with_tables(db)
    }

    /// Create a volatile database that lives only as long as the handle.
    pub fn in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::with_tables(db)
    }

    /// Pre-create all tables so later read transactions don't fail.
    fn with_tables(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(KV)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_USERNAME)?;
            let _ = write_txn.open_table(USERS_BY_MOBILE)?;
            let _ = write_txn.open_table(USERS_BY_EMAIL)?;
            let _ = write_txn.open_table(ROLES)?;
            let _ = write_txn.open_table(ROLES_BY_NAME)?;
            let _ = write_txn.open_table(ROLE_USERS)?;
            let _ = write_txn.open_table(USER_ROLES)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(crate) fn inner(&self) -> &Database {
        &self.db
    }

    /// Cheap liveness check used by the readiness probe.
    pub fn ping(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(SEQUENCES)?;
        Ok(())
    }
}

/// Allocate the next id for `sequence` inside an open write transaction.
///
/// Ids start at 1. The increment is part of the caller's transaction, so an
/// aborted transaction leaves the sequence untouched.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> StorageResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(sequence)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next)?;
    Ok(next)
}
