// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints.
//!
//! These endpoints require the configured admin role.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::{auth::AdminOnly, error::ApiError, models::UserResponse, state::AppState};

/// Look up a user by username.
#[utoipa::path(
    get,
    path = "/v1/admin/users/{username}",
    tag = "Admin",
    security(("bearer" = [])),
    params(
        ("username" = String, Path, description = "Username to look up")
    ),
    responses(
        (status = 200, description = "User with roles", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "No such user"),
    )
)]
pub async fn get_user(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.identity.find_user(&username)?;
    info!(admin_id = admin.user_id, user_id = user.user.id, "Admin looked up user");
    Ok(Json(user.into()))
}
