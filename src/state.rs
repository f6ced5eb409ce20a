// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{RevocationRegistry, TokenIssuer};
use crate::config::AppConfig;
use crate::identity::IdentityService;
use crate::otp::{LogOtpSender, OtpSender, OtpStore};
use crate::rate_limit::IpRateLimiter;
use crate::storage::{AuthDatabase, KvStore};

/// Shared handles, built once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<AuthDatabase>,
    pub kv: KvStore,
    pub tokens: Arc<TokenIssuer>,
    pub blacklist: RevocationRegistry,
    pub identity: Arc<IdentityService>,
    pub otp_limiter: Arc<IpRateLimiter>,
}

impl AppState {
    pub fn new(config: AppConfig, db: Arc<AuthDatabase>) -> Self {
        Self::with_sender(config, db, Arc::new(LogOtpSender))
    }

    /// Like `new`, with a custom OTP delivery channel.
    pub fn with_sender(config: AppConfig, db: Arc<AuthDatabase>, sender: Arc<dyn OtpSender>) -> Self {
        let kv = KvStore::new(db.clone());
        let otp = OtpStore::new(kv.clone(), config.otp_key_prefix.clone(), config.otp_expire);
        let tokens = Arc::new(TokenIssuer::new(
            &config.jwt_secret,
            &config.jwt_refresh_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        ));
        let blacklist = RevocationRegistry::new(kv.clone());
        let identity = Arc::new(IdentityService::new(
            db.clone(),
            otp,
            tokens.clone(),
            blacklist.clone(),
            sender,
            &config,
        ));
        let otp_limiter = Arc::new(IpRateLimiter::new(config.otp_limiter_interval));

        Self {
            config: Arc::new(config),
            db,
            kv,
            tokens,
            blacklist,
            identity,
            otp_limiter,
        }
    }

    /// In-memory database with the admin and default roles seeded.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::for_tests_with_sender(Arc::new(LogOtpSender))
    }

    #[cfg(test)]
    pub fn for_tests_with_sender(sender: Arc<dyn OtpSender>) -> Self {
        let db = Arc::new(AuthDatabase::in_memory().expect("in-memory database"));
        let state = Self::with_sender(AppConfig::for_tests(), db, sender);
        state.identity.seed(None).expect("seed roles");
        state
    }
}
