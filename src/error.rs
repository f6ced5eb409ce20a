// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::identity::ServiceError;
use crate::otp::OtpError;
use crate::validation::ValidationError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
    pub validation_errors: Vec<ValidationError>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    validation_errors: Vec<ValidationError>,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
            validation_errors: Vec::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "record_not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
    }

    pub fn unauthorized(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_code, message)
    }

    pub fn conflict(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, error_code, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", message)
    }

    /// Opaque 500. The detail goes to the log, never to the client.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "Internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal server error")
    }

    /// 422 listing every failing field.
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self {
            validation_errors: errors,
            ..Self::unprocessable("Validation failed")
        }
    }
}

impl From<Vec<ValidationError>> for ApiError {
    fn from(errors: Vec<ValidationError>) -> Self {
        ApiError::validation(errors)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Otp(OtpError::Exists) => ApiError::conflict("otp_exists", "otp exists"),
            ServiceError::Otp(OtpError::Used) => ApiError::conflict("otp_used", "otp used"),
            ServiceError::Otp(OtpError::NotValid) => {
                ApiError::new(StatusCode::BAD_REQUEST, "otp_not_valid", "otp not valid")
            }
            ServiceError::Otp(OtpError::NotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "otp_not_found", "otp not found")
            }
            ServiceError::Otp(OtpError::Backend(e)) => ApiError::internal(e),
            ServiceError::Auth(e) => {
                let status = e.status_code();
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    return ApiError::internal(format!("{e:?}"));
                }
                ApiError::new(status, e.error_code(), e.to_string())
            }
            ServiceError::EmailExists => ApiError::conflict("email_exists", "email exists"),
            ServiceError::UsernameExists => ApiError::conflict("username_exists", "username exists"),
            ServiceError::MobileNumberExists => {
                ApiError::conflict("mobile_number_exists", "mobile number exists")
            }
            ServiceError::InvalidCredentials => {
                ApiError::unauthorized("invalid_credentials", "invalid credentials")
            }
            ServiceError::PermissionDenied => {
                ApiError::new(StatusCode::FORBIDDEN, "permission_denied", "permission denied")
            }
            ServiceError::RecordNotFound => ApiError::not_found("record not found"),
            ServiceError::Internal(detail) => ApiError::internal(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code,
            validation_errors: self.validation_errors,
        });
        (self.status, body).into_response()
    }
}
