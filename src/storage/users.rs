// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User / role repository on the identity database.
//!
//! Users are uniquely identified by username, and optionally by mobile
//! number and email (each unique when present). Roles are attached through
//! `RoleUserRecord` join rows. Creating a user together with its default
//! role assignment happens in a single redb write transaction: either both
//! rows (and every index entry) are committed or none are.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use super::database::{
    next_id, AuthDatabase, StorageError, StorageResult, ROLES, ROLES_BY_NAME, ROLE_USERS, USERS,
    USERS_BY_EMAIL, USERS_BY_MOBILE, USERS_BY_USERNAME, USER_ROLES,
};

/// Audit value written when no authenticated subject is known.
pub const UNKNOWN_ACTOR: i64 = -1;

/// Who performed a write, for the audit columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditActor(pub Option<u64>);

impl AuditActor {
    pub const UNKNOWN: AuditActor = AuditActor(None);

    pub fn id(&self) -> i64 {
        self.0
            .and_then(|id| i64::try_from(id).ok())
            .unwrap_or(UNKNOWN_ACTOR)
    }
}

/// Persisted user row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// bcrypt hash, never the plain password
    pub password_hash: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<i64>,
}

/// Fields supplied when creating a user; ids and audit columns are filled in
/// by the repository.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleRecord {
    pub id: u64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleUserRecord {
    pub id: u64,
    pub user_id: u64,
    pub role_id: u64,
    pub created_at: DateTime<Utc>,
    pub created_by: i64,
}

/// A user with its role names eagerly loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWithRoles {
    pub user: UserRecord,
    pub roles: Vec<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Repository for user and role operations.
pub struct UserRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository.
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn exists_by_username(&self, username: &str) -> StorageResult<bool> {
        self.index_lookup(USERS_BY_USERNAME, username)
            .map(|id| id.is_some())
    }

    pub fn exists_by_mobile_number(&self, mobile_number: &str) -> StorageResult<bool> {
        self.index_lookup(USERS_BY_MOBILE, mobile_number)
            .map(|id| id.is_some())
    }

    pub fn exists_by_email(&self, email: &str) -> StorageResult<bool> {
        self.index_lookup(USERS_BY_EMAIL, &normalize_email(email))
            .map(|id| id.is_some())
    }

    pub fn find_user_by_username(&self, username: &str) -> StorageResult<Option<UserWithRoles>> {
        match self.index_lookup(USERS_BY_USERNAME, username)? {
            Some(id) => self.find_user_by_id(id),
            None => Ok(None),
        }
    }

    pub fn find_user_by_mobile(&self, mobile_number: &str) -> StorageResult<Option<UserWithRoles>> {
        match self.index_lookup(USERS_BY_MOBILE, mobile_number)? {
            Some(id) => self.find_user_by_id(id),
            None => Ok(None),
        }
    }

    /// Load a user and the names of all roles assigned to it.
    pub fn find_user_by_id(&self, user_id: u64) -> StorageResult<Option<UserWithRoles>> {
        let read_txn = self.db.inner().begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let user: UserRecord = match users.get(user_id)? {
            Some(raw) => serde_json::from_slice(raw.value())?,
            None => return Ok(None),
        };

        let user_roles = read_txn.open_table(USER_ROLES)?;
        let roles_table = read_txn.open_table(ROLES)?;
        let mut roles = Vec::new();
        for entry in user_roles.range((user_id, 0)..=(user_id, u64::MAX))? {
            let (key, _) = entry?;
            let (_, role_id) = key.value();
            if let Some(raw) = roles_table.get(role_id)? {
                let role: RoleRecord = serde_json::from_slice(raw.value())?;
                roles.push(role.name);
            }
        }

        Ok(Some(UserWithRoles { user, roles }))
    }

    /// Resolve a role id by name.
    pub fn role_id(&self, name: &str) -> StorageResult<Option<u64>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(ROLES_BY_NAME)?;
        Ok(table.get(name)?.map(|v| v.value()))
    }

    /// Resolve the id of the role every new account receives.
    pub fn default_role_id(&self, default_role_name: &str) -> StorageResult<u64> {
        self.role_id(default_role_name)?
            .ok_or_else(|| StorageError::NotFound(format!("Role {default_role_name}")))
    }

    fn index_lookup(
        &self,
        index: redb::TableDefinition<&str, u64>,
        value: &str,
    ) -> StorageResult<Option<u64>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(index)?;
        Ok(table.get(value)?.map(|v| v.value()))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create the role if it does not exist yet. Returns its id either way.
    pub fn ensure_role(&self, name: &str, actor: AuditActor) -> StorageResult<u64> {
        let write_txn = self.db.inner().begin_write()?;
        let role_id = {
            let mut by_name = write_txn.open_table(ROLES_BY_NAME)?;
            let existing = by_name.get(name)?.map(|v| v.value());
            match existing {
                Some(id) => id,
                None => {
                    let id = next_id(&write_txn, "roles")?;
                    let role = RoleRecord {
                        id,
                        name: name.to_string(),
                        created_at: Utc::now(),
                        created_by: actor.id(),
                    };
                    let json = serde_json::to_vec(&role)?;
                    write_txn.open_table(ROLES)?.insert(id, json.as_slice())?;
                    by_name.insert(name, id)?;
                    id
                }
            }
        };
        write_txn.commit()?;
        Ok(role_id)
    }

    /// Insert a user and its role assignment in one transaction.
    ///
    /// Fails with `StorageError::Conflict("username" | "mobile_number" | "email")`
    /// when a unique column is taken, and `StorageError::NotFound` when the
    /// role does not exist. Any failure leaves the database unchanged.
    pub fn create_user_with_default_role(
        &self,
        new_user: NewUser,
        role_id: u64,
        actor: AuditActor,
    ) -> StorageResult<UserRecord> {
        let email = new_user.email.as_deref().map(normalize_email);

        let write_txn = self.db.inner().begin_write()?;
        let user = {
            if write_txn.open_table(ROLES)?.get(role_id)?.is_none() {
                return Err(StorageError::NotFound(format!("Role {role_id}")));
            }

            let mut by_username = write_txn.open_table(USERS_BY_USERNAME)?;
            if by_username.get(new_user.username.as_str())?.is_some() {
                return Err(StorageError::Conflict("username"));
            }
            let mut by_mobile = write_txn.open_table(USERS_BY_MOBILE)?;
            if let Some(mobile) = new_user.mobile_number.as_deref() {
                if by_mobile.get(mobile)?.is_some() {
                    return Err(StorageError::Conflict("mobile_number"));
                }
            }
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            if let Some(email) = email.as_deref() {
                if by_email.get(email)?.is_some() {
                    return Err(StorageError::Conflict("email"));
                }
            }

            let now = Utc::now();
            let user_id = next_id(&write_txn, "users")?;
            let user = UserRecord {
                id: user_id,
                username: new_user.username,
                first_name: new_user.first_name,
                last_name: new_user.last_name,
                mobile_number: new_user.mobile_number,
                email: new_user.email,
                password_hash: new_user.password_hash,
                enabled: true,
                created_at: now,
                created_by: actor.id(),
                updated_by: None,
                deleted_by: None,
            };
            let json = serde_json::to_vec(&user)?;
            write_txn.open_table(USERS)?.insert(user_id, json.as_slice())?;
            by_username.insert(user.username.as_str(), user_id)?;
            if let Some(mobile) = user.mobile_number.as_deref() {
                by_mobile.insert(mobile, user_id)?;
            }
            if let Some(email) = email.as_deref() {
                by_email.insert(email, user_id)?;
            }

            let assignment_id = next_id(&write_txn, "role_users")?;
            let assignment = RoleUserRecord {
                id: assignment_id,
                user_id,
                role_id,
                created_at: now,
                created_by: actor.id(),
            };
            let json = serde_json::to_vec(&assignment)?;
            write_txn
                .open_table(ROLE_USERS)?
                .insert(assignment_id, json.as_slice())?;
            write_txn
                .open_table(USER_ROLES)?
                .insert((user_id, role_id), assignment_id)?;

            user
        };
        write_txn.commit()?;
        Ok(user)
    }

    /// Create the configured admin account unless its username is taken.
    ///
    /// Returns `None` when the account already exists, so repeated start-ups
    /// are harmless.
    pub fn seed_admin(&self, admin: NewUser, admin_role_id: u64) -> StorageResult<Option<UserRecord>> {
        if self.exists_by_username(&admin.username)? {
            return Ok(None);
        }
        self.create_user_with_default_role(admin, admin_role_id, AuditActor::UNKNOWN)
            .map(Some)
    }

    /// Number of role assignment rows, across all users.
    pub fn role_assignment_count(&self) -> StorageResult<u64> {
        use redb::ReadableTableMetadata;

        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(ROLE_USERS)?;
        Ok(table.len()?)
    }
}
