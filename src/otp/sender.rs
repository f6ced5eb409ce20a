// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OTP delivery seam.
//!
//! Delivery runs after the code is stored and is best effort: a failed send
//! is logged by the caller and never fails the request.

use tracing::debug;

#[derive(Debug, thiserror::Error)]
#[error("otp delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Delivers a freshly issued code to its subject (SMS gateway, mailer, ...).
pub trait OtpSender: Send + Sync {
    fn send(&self, mobile_number: &str, code: &str) -> Result<(), DeliveryError>;
}

/// Default sender: records the delivery in the debug log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOtpSender;

impl OtpSender for LogOtpSender {
    fn send(&self, mobile_number: &str, code: &str) -> Result<(), DeliveryError> {
        debug!(mobile_number, code, "OTP delivery");
        Ok(())
    }
}
