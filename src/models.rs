// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! This module defines the request and response data structures used by
//! the REST API. All types derive `Serialize`, `Deserialize`, and `ToSchema`
//! for automatic JSON handling and OpenAPI documentation. Field names are
//! camelCase on the wire.
//!
//! ## Model Categories
//!
//! - **OTP**: requesting a one-time password for a mobile number
//! - **Login / Registration**: username and mobile flows
//! - **Tokens**: issued token pairs, refresh and logout
//! - **Users**: profile views

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::UserWithRoles;

// =============================================================================
// OTP Models
// =============================================================================

/// Request a one-time password for a mobile number.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetOtpRequest {
    #[schema(example = "09123456789")]
    pub mobile_number: String,
}

// =============================================================================
// Login / Registration Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginByUsernameRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterByUsernameRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    /// Optional; unique when present
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

/// Register-or-login with a mobile number and the OTP sent to it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterLoginByMobileRequest {
    #[schema(example = "09123456789")]
    pub mobile_number: String,
    #[schema(example = "482913")]
    pub otp: String,
}

// =============================================================================
// Token Models
// =============================================================================

/// Issued access / refresh token pair.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetail {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry of the access token, epoch seconds
    pub access_token_expire_time: i64,
    /// Absolute expiry of the refresh token, epoch seconds
    pub refresh_token_expire_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout body. The access token travels in the `Authorization` header.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

// =============================================================================
// Generic / User Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Stored user as shown to administrators.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: u64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    pub enabled: bool,
    pub roles: Vec<String>,
}

impl From<UserWithRoles> for UserResponse {
    fn from(loaded: UserWithRoles) -> Self {
        let user = loaded.user;
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            mobile_number: user.mobile_number,
            enabled: user.enabled,
            roles: loaded.roles,
        }
    }
}
