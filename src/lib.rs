// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity Server - Mobile OTP and Username Login
//!
//! Issues HS256 access / refresh token pairs after a mobile OTP or a
//! username / password login, and revokes them on logout.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token issuance, verification, revocation and extractors
//! - `identity` - Login, registration, refresh and logout flows
//! - `otp` - One-time password store and delivery
//! - `rate_limit` - Per client IP admission control
//! - `storage` - Embedded redb database

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod otp;
pub mod rate_limit;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod validation;
