// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::any::Any;

use axum::{
    http::HeaderValue,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any as CorsAny, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{middleware::auth_middleware, AuthenticatedUser},
    config::AppConfig,
    error::ApiError,
    models::{
        GetOtpRequest, LoginByUsernameRequest, LogoutRequest, MessageResponse, RefreshRequest,
        RegisterByUsernameRequest, RegisterLoginByMobileRequest, TokenDetail, UserResponse,
    },
    rate_limit::otp_rate_limit,
    state::AppState,
    validation::ValidationError,
};

pub mod admin;
pub mod health;
pub mod users;

pub fn router(state: AppState) -> Router {
    // Rejected requests never reach the OTP store.
    let otp_routes = Router::new()
        .route("/send-otp", post(users::send_otp))
        .route_layer(middleware::from_fn_with_state(state.clone(), otp_rate_limit));

    let authenticated = Router::new()
        .route("/me", get(users::get_current_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let user_routes = Router::new()
        .route("/login-by-username", post(users::login_by_username))
        .route("/register-by-username", post(users::register_by_username))
        .route("/login-by-mobile", post(users::login_by_mobile))
        .route("/refresh", post(users::refresh))
        .route("/logout", post(users::logout))
        .merge(otp_routes)
        .merge(authenticated);

    let v1_routes = Router::new()
        .nest("/users", user_routes)
        .route("/admin/users/{username}", get(admin::get_user));

    let config = state.config.clone();
    let app = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()));

    with_middleware(app, &config)
}

/// Panic recovery, CORS, request ids and tracing around `app`.
fn with_middleware(app: Router, config: &AppConfig) -> Router {
    app.layer(CatchPanicLayer::custom(panic_response))
        .layer(cors_layer(config))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// A panicking handler answers with the opaque 500 body.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else {
        "non-string panic payload"
    };
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}

/// Permissive unless `CORS_ALLOW_ORIGINS` lists origins.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.cors_allow_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(CorsAny)
        .allow_headers(CorsAny)
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        users::send_otp,
        users::login_by_username,
        users::register_by_username,
        users::login_by_mobile,
        users::refresh,
        users::logout,
        users::get_current_user,
        admin::get_user
    ),
    components(
        schemas(
            GetOtpRequest,
            LoginByUsernameRequest,
            RegisterByUsernameRequest,
            RegisterLoginByMobileRequest,
            RefreshRequest,
            LogoutRequest,
            TokenDetail,
            MessageResponse,
            UserResponse,
            AuthenticatedUser,
            ValidationError,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Users", description = "OTP, login, registration and token lifecycle"),
        (name = "Admin", description = "Admin-only user management")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::otp::{DeliveryError, OtpSender};

    const MOBILE: &str = "09123456789";

    #[derive(Default)]
    struct CapturingSender {
        codes: Mutex<Vec<String>>,
    }

    impl CapturingSender {
        fn last_code(&self) -> String {
            self.codes.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl OtpSender for CapturingSender {
        fn send(&self, _mobile_number: &str, code: &str) -> Result<(), DeliveryError> {
            self.codes.lock().unwrap().push(code.to_string());
            Ok(())
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// send-otp followed by login-by-mobile; returns the token pair.
    async fn mobile_login(app: &Router, sender: &CapturingSender) -> Value {
        let response = app
            .clone()
            .oneshot(post_json("/v1/users/send-otp", json!({ "mobileNumber": MOBILE })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/users/login-by-mobile",
                json!({ "mobileNumber": MOBILE, "otp": sender.last_code() }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    fn me_request(access_token: &str) -> Request<Body> {
        Request::get("/v1/users/me")
            .header("Authorization", format!("Bearer {access_token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::for_tests());
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        let app = router(AppState::for_tests());
        for path in ["/health", "/health/live", "/health/ready"] {
            let response = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn second_send_otp_from_same_client_is_rate_limited() {
        let state = AppState::for_tests();
        let app = router(state.clone());

        let first = app
            .clone()
            .oneshot(post_json("/v1/users/send-otp", json!({ "mobileNumber": MOBILE })))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let other = "09351234567";
        let second = app
            .oneshot(post_json("/v1/users/send-otp", json!({ "mobileNumber": other })))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(second).await["error_code"], "rate_limited");

        assert!(state.kv.exists(&format!("otp:{MOBILE}")).unwrap());
        assert!(!state.kv.exists(&format!("otp:{other}")).unwrap());
    }

    #[tokio::test]
    async fn invalid_mobile_is_unprocessable() {
        let app = router(AppState::for_tests());
        let response = app
            .oneshot(post_json("/v1/users/send-otp", json!({ "mobileNumber": "12345" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["validation_errors"][0]["property"], "mobileNumber");
    }

    #[tokio::test]
    async fn mobile_login_then_profile() {
        let sender = Arc::new(CapturingSender::default());
        let app = router(AppState::for_tests_with_sender(sender.clone()));

        let tokens = mobile_login(&app, &sender).await;
        assert!(tokens["accessTokenExpireTime"].as_i64().unwrap() > 0);

        let access = tokens["accessToken"].as_str().unwrap();
        let response = app.oneshot(me_request(access)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let me = json_body(response).await;
        assert_eq!(me["mobileNumber"], MOBILE);
        assert_eq!(me["roles"], json!(["default"]));
    }

    #[tokio::test]
    async fn wrong_otp_is_bad_request() {
        let sender = Arc::new(CapturingSender::default());
        let app = router(AppState::for_tests_with_sender(sender.clone()));

        app.clone()
            .oneshot(post_json("/v1/users/send-otp", json!({ "mobileNumber": MOBILE })))
            .await
            .unwrap();
        let wrong = if sender.last_code() == "111111" { "222222" } else { "111111" };

        let response = app
            .oneshot(post_json(
                "/v1/users/login-by-mobile",
                json!({ "mobileNumber": MOBILE, "otp": wrong }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error_code"], "otp_not_valid");
    }

    #[tokio::test]
    async fn logout_revokes_access_token() {
        let sender = Arc::new(CapturingSender::default());
        let app = router(AppState::for_tests_with_sender(sender.clone()));

        let tokens = mobile_login(&app, &sender).await;
        let access = tokens["accessToken"].as_str().unwrap();
        let refresh = tokens["refreshToken"].as_str().unwrap();

        let logout = Request::post("/v1/users/logout")
            .header("content-type", "application/json")
            .header("Authorization", format!("Bearer {access}"))
            .body(Body::from(json!({ "refreshToken": refresh }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(logout).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(me_request(access)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "token_revoked");

        let response = app
            .oneshot(post_json("/v1/users/refresh", json!({ "refreshToken": refresh })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_returns_new_pair() {
        let sender = Arc::new(CapturingSender::default());
        let app = router(AppState::for_tests_with_sender(sender.clone()));

        let tokens = mobile_login(&app, &sender).await;
        let response = app
            .oneshot(post_json(
                "/v1/users/refresh",
                json!({ "refreshToken": tokens["refreshToken"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(json_body(response).await["accessToken"].is_string());
    }

    #[tokio::test]
    async fn register_then_login_by_username() {
        let app = router(AppState::for_tests());

        let registration = json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "username": "ada_l",
            "email": "ada@example.com",
            "password": "engine1843"
        });
        let response = app
            .clone()
            .oneshot(post_json("/v1/users/register-by-username", registration.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post_json("/v1/users/register-by-username", registration))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error_code"], "email_exists");

        let response = app
            .oneshot(post_json(
                "/v1/users/login-by-username",
                json!({ "username": "ada_l", "password": "engine1843" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn admin_lookup_requires_admin_role() {
        let state = AppState::for_tests();
        let app = router(state.clone());

        let user_token = state
            .tokens
            .issue(&crate::auth::IdentityClaims {
                user_id: 5,
                first_name: String::new(),
                last_name: String::new(),
                username: MOBILE.to_string(),
                mobile_number: Some(MOBILE.to_string()),
                email: None,
                roles: vec!["default".to_string()],
            })
            .unwrap()
            .access_token;

        let response = app
            .oneshot(
                Request::get("/v1/admin/users/someone")
                    .header("Authorization", format!("Bearer {user_token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn panicking_handler_returns_opaque_internal_error() {
        let app = with_middleware(
            Router::new().route("/explode", get(|| async { panic!("redb handle poisoned") as () })),
            &AppConfig::for_tests(),
        );

        let response = app
            .oneshot(Request::get("/explode").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("x-request-id"));

        let body = json_body(response).await;
        assert_eq!(body["error_code"], "internal_error");
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn openapi_document_lists_user_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/users/send-otp"));
        assert!(doc.paths.paths.contains_key("/v1/admin/users/{username}"));
    }
}
