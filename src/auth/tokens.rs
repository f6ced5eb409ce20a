// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HS256 access / refresh token issuance and verification.
//!
//! Access and refresh tokens are signed with distinct secrets, so neither
//! kind verifies as the other. Expiry is checked without leeway.

use chrono::{TimeDelta, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use super::claims::{AccessClaims, ClaimMap, IdentityClaims, RefreshClaims};
use super::AuthError;
use crate::models::TokenDetail;

/// 128 random bits, hex encoded.
fn token_id() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }
}

/// Signs and verifies the token pair.
pub struct TokenIssuer {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: TimeDelta,
    refresh_ttl: TimeDelta,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(
        access_secret: &SecretString,
        refresh_secret: &SecretString,
        access_ttl: TimeDelta,
        refresh_ttl: TimeDelta,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
            validation,
        }
    }

    /// Build and sign a fresh access / refresh pair for `identity`.
    pub fn issue(&self, identity: &IdentityClaims) -> Result<TokenDetail, AuthError> {
        let now = Utc::now();
        let access_expires = (now + self.access_ttl).timestamp();
        let refresh_expires = (now + self.refresh_ttl).timestamp();

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(
            &header,
            &AccessClaims::new(identity, access_expires, token_id()),
            &self.access.encoding,
        )
        .map_err(|e| AuthError::InternalError(format!("signing access token: {e}")))?;
        let refresh_token = encode(
            &header,
            &RefreshClaims {
                user_id: identity.user_id,
                exp: refresh_expires,
                jti: token_id(),
            },
            &self.refresh.encoding,
        )
        .map_err(|e| AuthError::InternalError(format!("signing refresh token: {e}")))?;

        Ok(TokenDetail {
            access_token,
            refresh_token,
            access_token_expire_time: access_expires,
            refresh_token_expire_time: refresh_expires,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.verify(token, &self.access.decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.verify(token, &self.refresh.decoding)
    }

    /// Verified access token claims as an untyped map.
    pub fn claims(&self, token: &str) -> Result<ClaimMap, AuthError> {
        self.verify::<ClaimMap>(token, &self.access.decoding)
            .map_err(|_| AuthError::ClaimsNotFound)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Result<T, AuthError> {
        decode::<T>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }
}
