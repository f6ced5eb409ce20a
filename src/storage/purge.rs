// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expiry Purger
//!
//! Background task that periodically deletes expired key/value entries
//! (OTP records, revoked token digests). Reads already ignore expired
//! entries, so the purger only keeps the database file from growing.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::kv::KvStore;

/// Background sweeper for the TTL key/value table.
pub struct ExpiryPurger {
    kv: KvStore,
    interval: Duration,
}

impl ExpiryPurger {
    pub fn new(kv: KvStore, interval: Duration) -> Self {
        Self { kv, interval }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(purger.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Expiry purger starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Expiry purger shutting down");
                    return;
                }
            }

            self.sweep();
        }
    }

    /// Execute one sweep. Returns the number of removed entries.
    pub fn sweep(&self) -> usize {
        match self.kv.purge_expired() {
            Ok(0) => 0,
            Ok(removed) => {
                debug!(removed, "Expiry purger: removed expired entries");
                removed
            }
            Err(e) => {
                warn!(error = %e, "Expiry purger: sweep failed");
                0
            }
        }
    }
}
