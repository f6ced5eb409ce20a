// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints: OTP, login, registration, token refresh and logout.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};

use crate::{
    auth::{actor_from_claims, Auth, AuthError, AuthenticatedUser, RequestClaims},
    error::ApiError,
    identity::ServiceError,
    models::{
        GetOtpRequest, LoginByUsernameRequest, LogoutRequest, MessageResponse, RefreshRequest,
        RegisterByUsernameRequest, RegisterLoginByMobileRequest, TokenDetail,
    },
    state::AppState,
    validation,
};

/// Run a service call that hashes or verifies a password on the blocking pool.
async fn blocking<T, F>(call: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ApiError::internal(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}

/// Send a one-time password to a mobile number.
///
/// Rate limited per client IP.
#[utoipa::path(
    post,
    path = "/v1/users/send-otp",
    request_body = GetOtpRequest,
    tag = "Users",
    responses(
        (status = 201, description = "OTP issued", body = MessageResponse),
        (status = 409, description = "An OTP for this number is still pending"),
        (status = 422, description = "Invalid mobile number"),
        (status = 429, description = "Too many requests from this client"),
    )
)]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(request): Json<GetOtpRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    validation::validate_get_otp(&request)?;
    state.identity.send_otp(&request.mobile_number)?;
    Ok((StatusCode::CREATED, Json(MessageResponse::new("otp sent"))))
}

#[utoipa::path(
    post,
    path = "/v1/users/login-by-username",
    request_body = LoginByUsernameRequest,
    tag = "Users",
    responses(
        (status = 201, description = "Token pair", body = TokenDetail),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled"),
    )
)]
pub async fn login_by_username(
    State(state): State<AppState>,
    Json(request): Json<LoginByUsernameRequest>,
) -> Result<(StatusCode, Json<TokenDetail>), ApiError> {
    validation::validate_login_by_username(&request)?;
    let detail = blocking(move || state.identity.login_by_username(&request)).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[utoipa::path(
    post,
    path = "/v1/users/register-by-username",
    request_body = RegisterByUsernameRequest,
    tag = "Users",
    responses(
        (status = 201, description = "User created", body = MessageResponse),
        (status = 409, description = "Username or email already registered"),
        (status = 422, description = "Validation failed"),
    )
)]
pub async fn register_by_username(
    State(state): State<AppState>,
    RequestClaims(claims): RequestClaims,
    Json(request): Json<RegisterByUsernameRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    validation::validate_register_by_username(&request, &state.config.password_policy)?;
    let actor = actor_from_claims(claims.as_ref());
    blocking(move || state.identity.register_by_username(&request, actor)).await?;
    Ok((StatusCode::CREATED, Json(MessageResponse::new("user registered"))))
}

/// Register-or-login with a mobile number and its OTP.
#[utoipa::path(
    post,
    path = "/v1/users/login-by-mobile",
    request_body = RegisterLoginByMobileRequest,
    tag = "Users",
    responses(
        (status = 201, description = "Token pair", body = TokenDetail),
        (status = 400, description = "Wrong OTP"),
        (status = 404, description = "No pending OTP for this number"),
        (status = 409, description = "OTP already used"),
    )
)]
pub async fn login_by_mobile(
    State(state): State<AppState>,
    RequestClaims(claims): RequestClaims,
    Json(request): Json<RegisterLoginByMobileRequest>,
) -> Result<(StatusCode, Json<TokenDetail>), ApiError> {
    validation::validate_register_login_by_mobile(&request, state.config.otp_digits)?;
    let actor = actor_from_claims(claims.as_ref());
    let detail = blocking(move || state.identity.register_login_by_mobile(&request, actor)).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[utoipa::path(
    post,
    path = "/v1/users/refresh",
    request_body = RefreshRequest,
    tag = "Users",
    responses(
        (status = 201, description = "New token pair", body = TokenDetail),
        (status = 401, description = "Refresh token invalid, expired or revoked"),
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<(StatusCode, Json<TokenDetail>), ApiError> {
    validation::validate_refresh_token(&request)?;
    let detail = state.identity.refresh(&request.refresh_token)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Revoke the bearer access token and the refresh token in the body.
#[utoipa::path(
    post,
    path = "/v1/users/logout",
    request_body = LogoutRequest,
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let authorization = match headers.get(AUTHORIZATION).map(|value| value.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => return Err(ServiceError::Auth(AuthError::InvalidAuthHeader).into()),
    };
    state.identity.logout(authorization, &request.refresh_token)?;
    Ok(Json(MessageResponse::new("logged out")))
}

/// Profile of the caller, straight from the verified access token.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Authenticated user", body = AuthenticatedUser),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(Auth(user): Auth) -> Json<AuthenticatedUser> {
    Json(user)
}
