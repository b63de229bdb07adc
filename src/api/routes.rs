use axum::{
    http::{
        header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{api as auth_api, require_roles, AuthService, AuthState, RoleGate, UserRole};
use crate::middleware::{rate_limit_middleware, request_logging, AuthRateLimiter};

/// Build the application router.
///
/// Credential endpoints are rate limited per client IP; `/api/auth/me` needs
/// any valid access token and `/api/admin/*` needs the admin role.
pub fn create_router(
    service: Arc<AuthService>,
    limiter: AuthRateLimiter,
    cors: CorsLayer,
) -> Router {
    let auth_state = AuthState::new(service.clone());

    let credential_routes = Router::new()
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ))
        .with_state(auth_state.clone());

    let session_routes = Router::new()
        .route("/api/auth/refresh", post(auth_api::refresh))
        .route("/api/auth/logout", post(auth_api::logout))
        .with_state(auth_state.clone());

    let identity_routes: Router = Router::new()
        .route("/api/auth/me", get(auth_api::get_current_user))
        .route_layer(middleware::from_fn_with_state(
            RoleGate::any_role(service.clone()),
            require_roles,
        ));

    let admin_routes = Router::new()
        .route("/api/admin/sessions/purge", post(auth_api::purge_sessions))
        .route_layer(middleware::from_fn_with_state(
            RoleGate::new(service, &[UserRole::Admin]),
            require_roles,
        ))
        .with_state(auth_state);

    Router::new()
        .route("/health", get(health_check))
        .merge(credential_routes)
        .merge(session_routes)
        .merge(identity_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// CORS for the single browser front end.
pub fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = origin.parse()?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            CACHE_CONTROL,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
        .expose_headers([CONTENT_LENGTH])
        .max_age(Duration::from_secs(86400)))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
