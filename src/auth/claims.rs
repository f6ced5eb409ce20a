// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::{AuditActor, UserWithRoles};

/// Untyped view of a verified token's claims.
///
/// Only used at the audit boundary; everything else works with
/// [`AuthenticatedUser`].
pub type ClaimMap = serde_json::Map<String, serde_json::Value>;

/// Claim key holding the subject's user id.
pub const USER_ID_CLAIM: &str = "user_id";

/// Identity data placed in an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub user_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl From<&UserWithRoles> for IdentityClaims {
    fn from(loaded: &UserWithRoles) -> Self {
        let user = &loaded.user;
        Self {
            user_id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
            mobile_number: user.mobile_number.clone(),
            email: user.email.clone(),
            roles: loaded.roles.clone(),
        }
    }
}

/// Access token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Absolute expiry, epoch seconds
    pub exp: i64,
    /// Random token id, so two tokens issued in the same second differ
    #[serde(default)]
    pub jti: String,
}

impl AccessClaims {
    pub fn new(identity: &IdentityClaims, exp: i64, jti: String) -> Self {
        Self {
            user_id: identity.user_id,
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            username: identity.username.clone(),
            mobile_number: identity.mobile_number.clone(),
            email: identity.email.clone(),
            roles: identity.roles.clone(),
            exp,
            jti,
        }
    }
}

/// Refresh token payload. Carries no profile data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub user_id: u64,
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
}

/// Authenticated user information extracted from an access token.
///
/// This is the primary type used throughout the application to represent
/// the authenticated user making a request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub user_id: u64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Role names, as issued
    pub roles: Vec<String>,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.username,
            first_name: claims.first_name,
            last_name: claims.last_name,
            mobile_number: claims.mobile_number,
            email: claims.email,
            roles: claims.roles,
        }
    }

    /// Check if the user holds the named role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Audit actor for writes made on behalf of this user.
    pub fn actor(&self) -> AuditActor {
        AuditActor(Some(self.user_id))
    }
}

/// Audit actor from an untyped claim map: the `user_id` claim when present
/// and numeric, otherwise unknown.
pub fn actor_from_claims(claims: Option<&ClaimMap>) -> AuditActor {
    AuditActor(
        claims
            .and_then(|c| c.get(USER_ID_CLAIM))
            .and_then(serde_json::Value::as_u64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::UNKNOWN_ACTOR;

    fn sample_claims() -> AccessClaims {
        AccessClaims {
            user_id: 42,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: "09123456789".to_string(),
            mobile_number: Some("09123456789".to_string()),
            email: None,
            roles: vec!["default".to_string()],
            exp: 1700003600,
            jti: "0f".repeat(16),
        }
    }

    #[test]
    fn from_claims_keeps_identity() {
        let user = AuthenticatedUser::from_claims(sample_claims());
        assert_eq!(user.user_id, 42);
        assert_eq!(user.mobile_number.as_deref(), Some("09123456789"));
        assert_eq!(user.roles, vec!["default".to_string()]);
    }

    #[test]
    fn has_role_matches_exact_names() {
        let user = AuthenticatedUser::from_claims(sample_claims());
        assert!(user.has_role("default"));
        assert!(!user.has_role("admin"));
        assert!(!user.has_role("Default"));
    }

    #[test]
    fn actor_comes_from_user_id_claim() {
        let mut claims = ClaimMap::new();
        claims.insert(USER_ID_CLAIM.to_string(), serde_json::json!(7));
        assert_eq!(actor_from_claims(Some(&claims)).id(), 7);

        assert_eq!(actor_from_claims(None).id(), UNKNOWN_ACTOR);

        claims.insert(USER_ID_CLAIM.to_string(), serde_json::json!("seven"));
        assert_eq!(actor_from_claims(Some(&claims)).id(), UNKNOWN_ACTOR);
    }

    #[test]
    fn refresh_claims_carry_no_profile() {
        let json = serde_json::to_value(RefreshClaims {
            user_id: 1,
            exp: 2,
            jti: "ab".to_string(),
        })
        .unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["exp", "jti", "user_id"]);
    }
}
