// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role-name authorization.
//!
//! Roles are plain names carried in the access token. A request is
//! authorized when the user holds at least one of the accepted names;
//! there is no hierarchy.

use super::{AuthError, AuthenticatedUser};

/// Succeed when `user` holds any of `valid_roles`.
pub fn authorize(user: &AuthenticatedUser, valid_roles: &[&str]) -> Result<(), AuthError> {
    if valid_roles.iter().any(|role| user.has_role(role)) {
        Ok(())
    } else {
        Err(AuthError::InsufficientPermissions)
    }
}
