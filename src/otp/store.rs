// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time password store.
//!
//! One record per mobile number, keyed `"{prefix}:{mobile}"` in the TTL
//! key/value table. A record is created unused, flipped to used by the first
//! successful validation, and disappears only when its TTL runs out. While a
//! record is live (used or not) no new code can be issued for that number.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{KvStore, Mutation, StorageError};

/// Persisted OTP state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtpRecord {
    pub code: String,
    pub used: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    /// A live, unused code already exists for this subject.
    #[error("otp exists")]
    Exists,

    /// The live code for this subject has already been consumed.
    #[error("otp used")]
    Used,

    /// The candidate does not match the live code.
    #[error("otp not valid")]
    NotValid,

    /// No live code: never issued, or expired.
    #[error("otp not found")]
    NotFound,

    #[error(transparent)]
    Backend(#[from] StorageError),
}

enum Verdict {
    Accepted,
    Rejected(OtpError),
}

/// Issues and judges one-time passwords over the shared key/value backend.
#[derive(Clone)]
pub struct OtpStore {
    kv: KvStore,
    prefix: String,
    ttl: Duration,
}

impl OtpStore {
    pub fn new(kv: KvStore, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
            ttl,
        }
    }

    fn key(&self, subject: &str) -> String {
        format!("{}:{}", self.prefix, subject)
    }

    /// Persist `code` for `subject` unless a live record already exists.
    pub fn issue(&self, subject: &str, code: &str) -> Result<(), OtpError> {
        let ttl = self.ttl;
        let verdict = self.kv.transact::<OtpRecord, _, _>(&self.key(subject), |current| {
            match current {
                Some(record) if record.used => (Mutation::Keep, Verdict::Rejected(OtpError::Used)),
                Some(_) => (Mutation::Keep, Verdict::Rejected(OtpError::Exists)),
                None => {
                    let record = OtpRecord {
                        code: code.to_string(),
                        used: false,
                    };
                    (Mutation::Put(record, ttl), Verdict::Accepted)
                }
            }
        })?;

        match verdict {
            Verdict::Accepted => {
                debug!(subject, "OTP issued");
                Ok(())
            }
            Verdict::Rejected(e) => Err(e),
        }
    }

    /// Consume the live code for `subject` if `candidate` matches it.
    ///
    /// A missing record and an expired one both yield [`OtpError::NotFound`].
    /// This is deliberate: callers cannot tell whether a code was ever issued
    /// for a number. Do not split the two cases.
    ///
    /// The check and the flip to `used` run in one write transaction, so of
    /// several concurrent callers with the right code exactly one succeeds.
    /// The used record keeps blocking reissue for a full TTL.
    pub fn validate(&self, subject: &str, candidate: &str) -> Result<(), OtpError> {
        let ttl = self.ttl;
        let verdict = self.kv.transact::<OtpRecord, _, _>(&self.key(subject), |current| {
            match current {
                None => (Mutation::Keep, Verdict::Rejected(OtpError::NotFound)),
                Some(record) if record.used => (Mutation::Keep, Verdict::Rejected(OtpError::Used)),
                Some(record) if record.code != candidate => {
                    (Mutation::Keep, Verdict::Rejected(OtpError::NotValid))
                }
                Some(record) => {
                    let consumed = OtpRecord {
                        used: true,
                        ..record
                    };
                    (Mutation::Put(consumed, ttl), Verdict::Accepted)
                }
            }
        })?;

        match verdict {
            Verdict::Accepted => Ok(()),
            Verdict::Rejected(e) => Err(e),
        }
    }
}
