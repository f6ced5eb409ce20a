// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::auth::AuthError;
use crate::otp::OtpError;
use crate::storage::StorageError;

/// Errors surfaced by the identity use cases.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("email exists")]
    EmailExists,

    #[error("username exists")]
    UsernameExists,

    #[error("mobile number exists")]
    MobileNumberExists,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("permission denied")]
    PermissionDenied,

    #[error("record not found")]
    RecordNotFound,

    /// Backend fault or failed transaction; the string is for logs only.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}
