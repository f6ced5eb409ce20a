// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in a single embedded redb database:
//!
//! - `database` - database handle, table definitions and id sequences
//! - `kv` - TTL key/value backend shared by the OTP store and the
//!   revocation registry, each under its own key namespace
//! - `users` - user / role repository with transactional creation
//! - `purge` - background sweep of expired key/value entries
//!
//! ## Important Notes
//!
//! - Expired key/value entries are invisible to readers before they are purged
//! - Key/value entries need not survive a restart, but they do when the
//!   database lives on disk

pub mod database;
pub mod kv;
pub mod purge;
pub mod users;

pub use database::{AuthDatabase, StorageError, StorageResult};
pub use kv::{KvStore, Mutation};
pub use purge::ExpiryPurger;
pub use users::{
    AuditActor, NewUser, RoleRecord, RoleUserRecord, UserRecord, UserRepository, UserWithRoles,
    UNKNOWN_ACTOR,
};
