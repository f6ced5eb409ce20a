// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// `TokenExpired` is kept apart from `TokenInvalid` so clients can tell
/// "log in again" from "this token was never good".
#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Authorization header is neither `<token>` nor `Bearer <token>`
    InvalidAuthHeader,
    /// Bad signature, wrong secret or malformed structure
    TokenInvalid,
    /// Signature is fine but the token is past its expiry
    TokenExpired,
    /// Token is on the revocation list
    TokenRevoked,
    /// Token did not verify, so no claims could be read
    ClaimsNotFound,
    /// Authenticated, but none of the required roles matched
    InsufficientPermissions,
    /// Signing failure or revocation backend unavailable
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "token_required",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::TokenInvalid => "token_invalid",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::ClaimsNotFound => "claims_not_found",
            AuthError::InsufficientPermissions => "permission_denied",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::TokenInvalid
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::ClaimsNotFound => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Token required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::TokenInvalid => write!(f, "Token invalid"),
            AuthError::TokenExpired => write!(f, "Token expired"),
            AuthError::TokenRevoked => write!(f, "Token has been revoked"),
            AuthError::ClaimsNotFound => write!(f, "Claims not found"),
            AuthError::InsufficientPermissions => write!(f, "Permission denied"),
            // The detail is for logs only; clients get an opaque message.
            AuthError::InternalError(_) => write!(f, "Internal authentication error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::InternalError(detail) = &self {
            tracing::error!(error = %detail, "Authentication failed internally");
        }
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
