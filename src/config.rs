// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! `AppConfig` loaded from them at startup. A `.env` file, when present, is
//! read into the environment by `main` before loading.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATABASE_PATH` | redb database file | `./data/identity.redb` |
//! | `CORS_ALLOW_ORIGINS` | Comma separated allowed origins | permissive |
//! | `OTP_KEY_PREFIX` | Key namespace for OTP records | `otp` |
//! | `OTP_EXPIRE_SECONDS` | OTP record lifetime | `120` |
//! | `OTP_DIGITS` | OTP length | `6` |
//! | `OTP_LIMITER_SECONDS` | Per-IP send-otp interval | `100` |
//! | `JWT_SECRET` | Access token HS256 secret | Required |
//! | `JWT_REFRESH_SECRET` | Refresh token HS256 secret, distinct | Required |
//! | `JWT_ACCESS_TOKEN_MINUTES` | Access token lifetime | `15` |
//! | `JWT_REFRESH_TOKEN_MINUTES` | Refresh token lifetime | `60` |
//! | `PASSWORD_MIN_LENGTH` / `PASSWORD_MAX_LENGTH` | Password policy bounds | `6` / `64` |
//! | `PASSWORD_INCLUDE_CHARS` | Require a letter | `true` |
//! | `PASSWORD_INCLUDE_DIGITS` | Require a digit | `true` |
//! | `PASSWORD_INCLUDE_UPPERCASE` | Require an uppercase letter | `false` |
//! | `PASSWORD_INCLUDE_LOWERCASE` | Require a lowercase letter | `true` |
//! | `BCRYPT_COST` | bcrypt work factor | `10` |
//! | `ADMIN_ROLE_NAME` / `DEFAULT_ROLE_NAME` | Seeded role names | `admin` / `default` |
//! | `ADMIN_USERNAME` .. `ADMIN_PASSWORD` | Seeded admin account | Only with `ADMIN_PASSWORD` |
//! | `PURGE_INTERVAL_SECONDS` | Expired key sweep interval | `60` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use secrecy::{ExposeSecret, SecretString};

use crate::auth::PasswordPolicy;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";
pub const CORS_ALLOW_ORIGINS_ENV: &str = "CORS_ALLOW_ORIGINS";

pub const OTP_KEY_PREFIX_ENV: &str = "OTP_KEY_PREFIX";
pub const OTP_EXPIRE_SECONDS_ENV: &str = "OTP_EXPIRE_SECONDS";
pub const OTP_DIGITS_ENV: &str = "OTP_DIGITS";
pub const OTP_LIMITER_SECONDS_ENV: &str = "OTP_LIMITER_SECONDS";

/// HS256 secret for access tokens.
///
/// Must differ from `JWT_REFRESH_SECRET`, otherwise an access token would
/// verify as a refresh token.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const JWT_REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";
pub const JWT_ACCESS_TOKEN_MINUTES_ENV: &str = "JWT_ACCESS_TOKEN_MINUTES";
pub const JWT_REFRESH_TOKEN_MINUTES_ENV: &str = "JWT_REFRESH_TOKEN_MINUTES";

pub const PASSWORD_MIN_LENGTH_ENV: &str = "PASSWORD_MIN_LENGTH";
pub const PASSWORD_MAX_LENGTH_ENV: &str = "PASSWORD_MAX_LENGTH";
pub const PASSWORD_INCLUDE_CHARS_ENV: &str = "PASSWORD_INCLUDE_CHARS";
pub const PASSWORD_INCLUDE_DIGITS_ENV: &str = "PASSWORD_INCLUDE_DIGITS";
pub const PASSWORD_INCLUDE_UPPERCASE_ENV: &str = "PASSWORD_INCLUDE_UPPERCASE";
pub const PASSWORD_INCLUDE_LOWERCASE_ENV: &str = "PASSWORD_INCLUDE_LOWERCASE";
pub const BCRYPT_COST_ENV: &str = "BCRYPT_COST";

pub const ADMIN_ROLE_NAME_ENV: &str = "ADMIN_ROLE_NAME";
pub const DEFAULT_ROLE_NAME_ENV: &str = "DEFAULT_ROLE_NAME";
pub const ADMIN_USERNAME_ENV: &str = "ADMIN_USERNAME";
pub const ADMIN_FIRST_NAME_ENV: &str = "ADMIN_FIRST_NAME";
pub const ADMIN_LAST_NAME_ENV: &str = "ADMIN_LAST_NAME";
pub const ADMIN_MOBILE_NUMBER_ENV: &str = "ADMIN_MOBILE_NUMBER";
pub const ADMIN_EMAIL_ENV: &str = "ADMIN_EMAIL";
/// Setting this enables the admin seed.
pub const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";

pub const PURGE_INTERVAL_SECONDS_ENV: &str = "PURGE_INTERVAL_SECONDS";

pub const DEFAULT_DATABASE_PATH: &str = "./data/identity.redb";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },

    #[error("JWT_SECRET and JWT_REFRESH_SECRET must differ")]
    IdenticalSecrets,
}

/// Admin account created on first start.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub password: SecretString,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// Empty means permissive CORS.
    pub cors_allow_origins: Vec<String>,

    pub otp_key_prefix: String,
    pub otp_expire: Duration,
    pub otp_digits: u32,
    pub otp_limiter_interval: Duration,

    pub jwt_secret: SecretString,
    pub jwt_refresh_secret: SecretString,
    pub access_token_ttl: TimeDelta,
    pub refresh_token_ttl: TimeDelta,

    pub password_policy: PasswordPolicy,
    pub bcrypt_cost: u32,

    pub admin_role_name: String,
    pub default_role_name: String,
    pub admin: Option<AdminSeed>,

    pub purge_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let jwt_secret = env.secret(JWT_SECRET_ENV)?;
        let jwt_refresh_secret = env.secret(JWT_REFRESH_SECRET_ENV)?;
        if jwt_secret.expose_secret() == jwt_refresh_secret.expose_secret() {
            return Err(ConfigError::IdenticalSecrets);
        }

        let defaults = PasswordPolicy::default();
        let password_policy = PasswordPolicy {
            min_length: env.parse_or(PASSWORD_MIN_LENGTH_ENV, defaults.min_length)?,
            max_length: env.parse_or(PASSWORD_MAX_LENGTH_ENV, defaults.max_length)?,
            include_chars: env.parse_or(PASSWORD_INCLUDE_CHARS_ENV, defaults.include_chars)?,
            include_digits: env.parse_or(PASSWORD_INCLUDE_DIGITS_ENV, defaults.include_digits)?,
            include_uppercase: env
                .parse_or(PASSWORD_INCLUDE_UPPERCASE_ENV, defaults.include_uppercase)?,
            include_lowercase: env
                .parse_or(PASSWORD_INCLUDE_LOWERCASE_ENV, defaults.include_lowercase)?,
        };
        if password_policy.min_length > password_policy.max_length {
            return Err(ConfigError::Invalid {
                var: PASSWORD_MIN_LENGTH_ENV,
                value: password_policy.min_length.to_string(),
            });
        }

        let otp_digits: u32 = env.parse_or(OTP_DIGITS_ENV, 6)?;
        if !(4..=9).contains(&otp_digits) {
            return Err(ConfigError::Invalid {
                var: OTP_DIGITS_ENV,
                value: otp_digits.to_string(),
            });
        }

        let bcrypt_cost: u32 = env.parse_or(BCRYPT_COST_ENV, 10)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                var: BCRYPT_COST_ENV,
                value: bcrypt_cost.to_string(),
            });
        }

        let admin = env.get(ADMIN_PASSWORD_ENV).map(|password| AdminSeed {
            username: env.get_or(ADMIN_USERNAME_ENV, "admin"),
            first_name: env.get_or(ADMIN_FIRST_NAME_ENV, "Admin"),
            last_name: env.get_or(ADMIN_LAST_NAME_ENV, "User"),
            mobile_number: env.get(ADMIN_MOBILE_NUMBER_ENV),
            email: env.get(ADMIN_EMAIL_ENV),
            password: SecretString::from(password),
        });

        Ok(Self {
            host: env.get_or(HOST_ENV, "0.0.0.0"),
            port: env.parse_or(PORT_ENV, 8080)?,
            database_path: PathBuf::from(env.get_or(DATABASE_PATH_ENV, DEFAULT_DATABASE_PATH)),
            cors_allow_origins: env
                .get(CORS_ALLOW_ORIGINS_ENV)
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            otp_key_prefix: env.get_or(OTP_KEY_PREFIX_ENV, "otp"),
            otp_expire: env.seconds_or(OTP_EXPIRE_SECONDS_ENV, 120)?,
            otp_digits,
            otp_limiter_interval: env.seconds_or(OTP_LIMITER_SECONDS_ENV, 100)?,
            jwt_secret,
            jwt_refresh_secret,
            access_token_ttl: env.minutes_or(JWT_ACCESS_TOKEN_MINUTES_ENV, 15)?,
            refresh_token_ttl: env.minutes_or(JWT_REFRESH_TOKEN_MINUTES_ENV, 60)?,
            password_policy,
            bcrypt_cost,
            admin_role_name: env.get_or(ADMIN_ROLE_NAME_ENV, "admin"),
            default_role_name: env.get_or(DEFAULT_ROLE_NAME_ENV, "default"),
            admin,
            purge_interval: env.seconds_or(PURGE_INTERVAL_SECONDS_ENV, 60)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Defaults with fixed secrets and the cheapest bcrypt cost.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        let vars = [
            (JWT_SECRET_ENV, "test-access-secret"),
            (JWT_REFRESH_SECRET_ENV, "test-refresh-secret"),
            (BCRYPT_COST_ENV, "4"),
        ];
        Self::from_lookup(|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        })
        .expect("test configuration is valid")
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank are the same.
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn get_or(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    fn secret(&self, var: &'static str) -> Result<SecretString, ConfigError> {
        self.get(var)
            .map(SecretString::from)
            .ok_or(ConfigError::Missing(var))
    }

    fn parse_or<T: std::str::FromStr>(&self, var: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(var) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value }),
        }
    }

    fn seconds_or(&self, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let secs = self.parse_or(var, default)?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                var,
                value: secs.to_string(),
            });
        }
        Ok(Duration::from_secs(secs))
    }

    fn minutes_or(&self, var: &'static str, default: i64) -> Result<TimeDelta, ConfigError> {
        let minutes = self.parse_or(var, default)?;
        if minutes <= 0 {
            return Err(ConfigError::Invalid {
                var,
                value: minutes.to_string(),
            });
        }
        TimeDelta::try_minutes(minutes).ok_or(ConfigError::Invalid {
            var,
            value: minutes.to_string(),
        })
    }
}
