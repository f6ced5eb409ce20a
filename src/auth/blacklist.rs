// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Revocation registry for tokens that must be rejected before they expire.
//!
//! Entries are keyed by the SHA-256 hex digest of the raw token, so bearer
//! secrets never land in the database. Each entry lives exactly as long as
//! the token it blocks would have.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use sha2::{Digest, Sha256};

use crate::storage::{KvStore, Mutation, StorageResult};

/// Digest used as the registry key.
pub fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[derive(Clone)]
pub struct RevocationRegistry {
    kv: KvStore,
}

impl RevocationRegistry {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Revoke `token` for `remaining`. No-op when nothing remains.
    pub fn revoke(&self, token: &str, remaining: TimeDelta) -> StorageResult<()> {
        let Ok(ttl) = remaining.to_std() else {
            return Ok(());
        };
        if ttl == Duration::ZERO {
            return Ok(());
        }
        self.kv.set_with_ttl(&token_digest(token), &true, ttl)
    }

    /// Revoke `token` until its own expiry (epoch seconds).
    pub fn revoke_until(&self, token: &str, expires_at: i64) -> StorageResult<()> {
        let remaining = TimeDelta::try_seconds(expires_at.saturating_sub(Utc::now().timestamp()))
            .unwrap_or(TimeDelta::MAX);
        self.revoke(token, remaining)
    }

    /// Revoke `token` until its own expiry, unless it is revoked already.
    ///
    /// Returns `false` when the token was already on the list. The check and
    /// the write share one write transaction, so of several concurrent
    /// callers presenting the same token exactly one gets `true`.
    pub fn claim_until(&self, token: &str, expires_at: i64) -> StorageResult<bool> {
        let remaining = expires_at.saturating_sub(Utc::now().timestamp());
        let ttl = Duration::from_secs(u64::try_from(remaining).unwrap_or(0).max(1));
        self.kv
            .transact::<bool, bool, _>(&token_digest(token), |current| match current {
                Some(_) => (Mutation::Keep, false),
                None => (Mutation::Put(true, ttl), true),
            })
    }

    /// Whether `token` is currently revoked. Absent means trusted.
    pub fn is_revoked(&self, token: &str) -> StorageResult<bool> {
        self.kv.exists(&token_digest(token))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::AuthDatabase;

    fn registry() -> (RevocationRegistry, KvStore) {
        let kv = KvStore::new(Arc::new(AuthDatabase::in_memory().unwrap()));
        (RevocationRegistry::new(kv.clone()), kv)
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn revoked_token_is_found_and_stored_hashed() {
        let (registry, kv) = registry();
        registry.revoke("raw.jwt.token", TimeDelta::minutes(5)).unwrap();

        assert!(registry.is_revoked("raw.jwt.token").unwrap());
        assert!(!registry.is_revoked("other.jwt.token").unwrap());
        assert!(!kv.exists("raw.jwt.token").unwrap());
        assert!(kv.exists(&token_digest("raw.jwt.token")).unwrap());
    }

    #[test]
    fn non_positive_remaining_is_a_no_op() {
        let (registry, kv) = registry();
        registry.revoke("a", TimeDelta::zero()).unwrap();
        registry.revoke("b", TimeDelta::seconds(-10)).unwrap();

        assert!(!registry.is_revoked("a").unwrap());
        assert!(!registry.is_revoked("b").unwrap());
        assert_eq!(kv.stored_len().unwrap(), 0);
    }

    #[test]
    fn entry_expires_with_the_token() {
        let (registry, _) = registry();
        registry.revoke("short", TimeDelta::milliseconds(30)).unwrap();
        assert!(registry.is_revoked("short").unwrap());

        std::thread::sleep(Duration::from_millis(60));
        assert!(!registry.is_revoked("short").unwrap());
    }

    #[test]
    fn claim_succeeds_only_for_the_first_caller() {
        let (registry, _) = registry();
        let expires_at = Utc::now().timestamp() + 600;

        assert!(registry.claim_until("refresh.jwt", expires_at).unwrap());
        assert!(registry.is_revoked("refresh.jwt").unwrap());
        assert!(!registry.claim_until("refresh.jwt", expires_at).unwrap());
    }

    #[test]
    fn claim_of_expiring_token_still_blocks_reuse() {
        let (registry, _) = registry();
        let now = Utc::now().timestamp();

        assert!(registry.claim_until("last.second", now).unwrap());
        assert!(!registry.claim_until("last.second", now).unwrap());
    }

    #[test]
    fn concurrent_claims_succeed_once() {
        let (registry, _) = registry();
        let expires_at = Utc::now().timestamp() + 600;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.claim_until("shared.jwt", expires_at).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn revoke_until_uses_remaining_lifetime() {
        let (registry, _) = registry();
        let now = Utc::now().timestamp();

        registry.revoke_until("live", now + 600).unwrap();
        registry.revoke_until("dead", now - 1).unwrap();

        assert!(registry.is_revoked("live").unwrap());
        assert!(!registry.is_revoked("dead").unwrap());
    }
}
