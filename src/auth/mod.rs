// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Token issuance, verification and revocation for the identity API.
//!
//! ## Auth Flow
//!
//! 1. A client logs in (username/password or mobile/OTP) and receives an
//!    HS256 access / refresh token pair
//! 2. The client sends `Authorization: Bearer <access token>`
//! 3. The server:
//!    - Verifies the signature and expiry against the access secret
//!    - Rejects tokens listed in the revocation registry
//!    - Exposes the typed claims as `AuthenticatedUser`
//!
//! ## Security
//!
//! - Access and refresh tokens use distinct secrets
//! - Refresh tokens carry only the user id and expiry
//! - Revoked tokens are stored as SHA-256 digests, never in clear
//! - No clock skew leeway

pub mod blacklist;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod roles;
pub mod tokens;

pub use blacklist::RevocationRegistry;
pub use claims::{
    actor_from_claims, AccessClaims, AuthenticatedUser, ClaimMap, IdentityClaims, RefreshClaims,
};
pub use error::AuthError;
pub use extractor::{extract_bearer_token, AdminOnly, Auth, RequestClaims};
pub use password::PasswordPolicy;
pub use roles::authorize;
pub use tokens::TokenIssuer;
