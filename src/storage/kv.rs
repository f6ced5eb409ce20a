// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TTL key/value backend on top of the `kv` redb table.
//!
//! Every value is stored inside an envelope carrying its absolute expiry in
//! epoch milliseconds. Reads treat an expired envelope exactly like a missing
//! key, so callers never observe stale entries even before the purger has
//! physically removed them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable, ReadableTableMetadata};
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Serialize};

use super::database::{AuthDatabase, StorageResult, KV};

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    expires_at_ms: i64,
    value: T,
}

#[derive(Deserialize)]
struct ExpiryOnly {
    expires_at_ms: i64,
}

/// Outcome of a [`KvStore::transact`] closure.
pub enum Mutation<T> {
    /// Leave the stored entry untouched.
    Keep,
    /// Replace the entry with a new value and TTL.
    Put(T, Duration),
}

/// Generic TTL key/value store.
///
/// Cheap to clone; all clones share the same database handle.
#[derive(Clone)]
pub struct KvStore {
    db: Arc<AuthDatabase>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_from(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms().saturating_add(ttl_ms)
}

fn decode_live<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<Option<T>> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)?;
    if envelope.expires_at_ms <= now_ms() {
        return Ok(None);
    }
    Ok(Some(envelope.value))
}

impl KvStore {
    pub fn new(db: Arc<AuthDatabase>) -> Self {
        Self { db }
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> StorageResult<()> {
        let bytes = serde_json::to_vec(&Envelope {
            expires_at_ms: expiry_from(ttl),
            value,
        })?;

        let write_txn = self.db.inner().begin_write()?;
        {
            let mut table = write_txn.open_table(KV)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Fetch a live value. Expired and missing keys both yield `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(KV)?;
        match table.get(key)? {
            Some(raw) => decode_live(raw.value()),
            None => Ok(None),
        }
    }

    /// Whether a live entry exists for `key`.
    pub fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get::<IgnoredAny>(key)?.is_some())
    }

    /// Atomic read-modify-write of a single key.
    ///
    /// The closure sees the current live value (or `None`) and decides what
    /// to write back. The read and the write happen in one redb write
    /// transaction; redb admits one writer at a time, so two concurrent
    /// callers on the same key observe each other's result.
    pub fn transact<T, R, F>(&self, key: &str, f: F) -> StorageResult<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> (Mutation<T>, R),
    {
        let write_txn = self.db.inner().begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(KV)?;
            let current = match table.get(key)? {
                Some(raw) => decode_live::<T>(raw.value())?,
                None => None,
            };

            let (mutation, outcome) = f(current);
            if let Mutation::Put(value, ttl) = mutation {
                let bytes = serde_json::to_vec(&Envelope {
                    expires_at_ms: expiry_from(ttl),
                    value,
                })?;
                table.insert(key, bytes.as_slice())?;
            }
            outcome
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Physically delete every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> StorageResult<usize> {
        let now = now_ms();
        let mut removed = 0usize;

        let write_txn = self.db.inner().begin_write()?;
        {
            let mut table = write_txn.open_table(KV)?;
            table.retain(|_key, raw| {
                // Unreadable envelopes are dropped along with expired ones.
                let live = serde_json::from_slice::<ExpiryOnly>(raw)
                    .map(|e| e.expires_at_ms > now)
                    .unwrap_or(false);
                if !live {
                    removed += 1;
                }
                live
            })?;
        }
        write_txn.commit()?;
        Ok(removed)
    }

    /// Number of stored entries, live or not yet purged.
    pub fn stored_len(&self) -> StorageResult<u64> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(KV)?;
        Ok(table.len()?)
    }
}
