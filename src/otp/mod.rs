// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # One-Time Passwords
//!
//! - `store` - single-use, TTL-bound codes per mobile number
//! - `code` - random code generation
//! - `sender` - best-effort delivery seam

pub mod code;
pub mod sender;
pub mod store;

pub use code::generate_otp;
pub use sender::{DeliveryError, LogOtpSender, OtpSender};
pub use store::{OtpError, OtpRecord, OtpStore};
