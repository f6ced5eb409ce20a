// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Authenticates every request of a router subtree before handler execution
//! and stores the `AuthenticatedUser` in the request extensions, where the
//! `Auth` extractor picks it up without verifying the token a second time.
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/me", get(me))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware));
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{extractor::authenticate, AuthError};
use crate::state::AppState;

/// Authentication middleware function.
pub async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let header = match request.headers().get(AUTHORIZATION).map(|h| h.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => return AuthError::InvalidAuthHeader.into_response(),
    };

    match authenticate(&state.tokens, &state.blacklist, header) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
