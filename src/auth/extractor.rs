// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```
//!
//! ## Revocation policy
//!
//! A token is checked against the revocation registry after its signature
//! and expiry. When the registry cannot be read the request is rejected
//! (fail-closed) with a 500, never let through.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::error;

use super::{
    roles::authorize, AuthError, AuthenticatedUser, ClaimMap, RevocationRegistry, TokenIssuer,
};
use crate::state::AppState;

/// Pull the raw token out of an `Authorization` header value.
///
/// Accepts `<token>` or `<scheme> <token>` with a case-insensitive
/// `Bearer` scheme.
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.map(str::trim).unwrap_or_default();
    if header.is_empty() {
        return Err(AuthError::MissingAuthHeader);
    }

    let fields: Vec<&str> = header.split_whitespace().collect();
    match fields.as_slice() {
        [token] => Ok(*token),
        [scheme, token] if scheme.eq_ignore_ascii_case("bearer") => Ok(*token),
        _ => Err(AuthError::InvalidAuthHeader),
    }
}

/// Fail with `TokenRevoked` if `token` is on the revocation list.
pub fn ensure_not_revoked(blacklist: &RevocationRegistry, token: &str) -> Result<(), AuthError> {
    match blacklist.is_revoked(token) {
        Ok(false) => Ok(()),
        Ok(true) => Err(AuthError::TokenRevoked),
        Err(e) => {
            error!(error = %e, "Revocation registry unavailable, rejecting request");
            Err(AuthError::InternalError(e.to_string()))
        }
    }
}

/// Verify the access token in `header` and check it has not been revoked.
pub fn authenticate(
    tokens: &TokenIssuer,
    blacklist: &RevocationRegistry,
    header: Option<&str>,
) -> Result<AuthenticatedUser, AuthError> {
    let token = extract_bearer_token(header)?;
    let claims = tokens.verify_access(token)?;
    ensure_not_revoked(blacklist, token)?;
    Ok(AuthenticatedUser::from_claims(claims))
}

fn authorization_header(parts: &Parts) -> Result<Option<&str>, AuthError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::InvalidAuthHeader))
        .transpose()
}

/// Extractor for authenticated users.
///
/// This extractor validates the JWT from the Authorization header
/// and provides the authenticated user information.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(Auth(user): Auth) -> Json<ProfileResponse> {
///     // user.user_id contains the authenticated user's ID
///     // user.roles contains their role names
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // First check if middleware already set the user
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let header = authorization_header(parts)?;
        let user = authenticate(&state.tokens, &state.blacklist, header)?;
        Ok(Auth(user))
    }
}

/// Extractor that requires the configured admin role.
pub struct AdminOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;
        authorize(&user, &[state.config.admin_role_name.as_str()])?;
        Ok(AdminOnly(user))
    }
}

/// Claims of the caller, when a valid unrevoked access token is present.
///
/// Never rejects: anonymous requests get `None`. Used where the caller's id
/// is only needed for audit columns.
pub struct RequestClaims(pub Option<ClaimMap>);

impl FromRequestParts<AppState> for RequestClaims {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = authorization_header(parts)
            .ok()
            .flatten()
            .and_then(|header| extract_bearer_token(Some(header)).ok())
            .filter(|token| ensure_not_revoked(&state.blacklist, token).is_ok())
            .and_then(|token| state.tokens.claims(token).ok());
        Ok(RequestClaims(claims))
    }
}
