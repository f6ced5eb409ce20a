// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request validation.
//!
//! Runs before any service call, so the identity layer only ever sees
//! well-formed mobile numbers, OTPs, names and passwords. Every failing field
//! is reported, not just the first one.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::PasswordPolicy;
use crate::models::{
    GetOtpRequest, LoginByUsernameRequest, RefreshRequest, RegisterByUsernameRequest,
    RegisterLoginByMobileRequest,
};

static MOBILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^09(0[1-9]|1[0-9]|2[0-2]|3[0-9]|9[0-9])[0-9]{7}$").expect("valid mobile regex")
});

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// One failing field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ValidationError {
    pub property: String,
    pub tag: String,
    pub message: String,
}

pub fn is_valid_mobile(value: &str) -> bool {
    MOBILE_RE.is_match(value)
}

#[derive(Default)]
struct Checks {
    errors: Vec<ValidationError>,
}

impl Checks {
    fn fail(&mut self, property: &str, tag: &str, message: String) {
        self.errors.push(ValidationError {
            property: property.to_string(),
            tag: tag.to_string(),
            message,
        });
    }

    /// Required and at least `min` characters. Returns whether it passed.
    fn min_len(&mut self, property: &str, value: &str, min: usize) -> bool {
        if value.trim().is_empty() {
            self.fail(property, "required", format!("{property} is required"));
            return false;
        }
        if value.chars().count() < min {
            self.fail(property, "min", format!("{property} must be at least {min}"));
            return false;
        }
        true
    }

    fn mobile(&mut self, property: &str, value: &str) {
        if value.is_empty() {
            self.fail(property, "required", format!("{property} is required"));
        } else if !is_valid_mobile(value) {
            self.fail(property, "mobile", format!("{property} must be in mobile number format"));
        }
    }

    fn otp(&mut self, property: &str, value: &str, digits: u32) {
        let digits = digits as usize;
        if value.len() != digits || !value.chars().all(|c| c.is_ascii_digit()) {
            self.fail(property, "len", format!("{property} must be {digits} digits"));
        }
    }

    fn email(&mut self, property: &str, value: &str) {
        if value.chars().count() < 6 {
            self.fail(property, "min", format!("{property} must be at least 6"));
        } else if !EMAIL_RE.is_match(value) {
            self.fail(property, "email", format!("{property} must be a valid email address"));
        }
    }

    fn password(&mut self, property: &str, value: &str, policy: &PasswordPolicy) {
        if self.min_len(property, value, 1) && !policy.check(value) {
            self.fail(property, "password", format!("{property} is not safe enough"));
        }
    }

    fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

pub fn validate_get_otp(req: &GetOtpRequest) -> Result<(), Vec<ValidationError>> {
    let mut checks = Checks::default();
    checks.mobile("mobileNumber", &req.mobile_number);
    checks.finish()
}

pub fn validate_login_by_username(req: &LoginByUsernameRequest) -> Result<(), Vec<ValidationError>> {
    let mut checks = Checks::default();
    checks.min_len("username", &req.username, 5);
    checks.min_len("password", &req.password, 6);
    checks.finish()
}

pub fn validate_register_by_username(
    req: &RegisterByUsernameRequest,
    policy: &PasswordPolicy,
) -> Result<(), Vec<ValidationError>> {
    let mut checks = Checks::default();
    checks.min_len("firstName", &req.first_name, 3);
    checks.min_len("lastName", &req.last_name, 3);
    if checks.min_len("username", &req.username, 5) && is_valid_mobile(&req.username) {
        // Mobile sign-up uses the number as the username.
        checks.fail("username", "not_mobile", "username must not be a mobile number".to_string());
    }
    if let Some(email) = req.email.as_deref() {
        checks.email("email", email);
    }
    checks.password("password", &req.password, policy);
    checks.finish()
}

pub fn validate_register_login_by_mobile(
    req: &RegisterLoginByMobileRequest,
    otp_digits: u32,
) -> Result<(), Vec<ValidationError>> {
    let mut checks = Checks::default();
    checks.mobile("mobileNumber", &req.mobile_number);
    checks.otp("otp", &req.otp, otp_digits);
    checks.finish()
}

pub fn validate_refresh_token(req: &RefreshRequest) -> Result<(), Vec<ValidationError>> {
    let mut checks = Checks::default();
    checks.min_len("refreshToken", &req.refresh_token, 1);
    checks.finish()
}
