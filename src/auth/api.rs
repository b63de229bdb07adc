//! Authentication API Endpoints
//! register / login / refresh / logout, plus the identity and session
//! maintenance endpoints that sit behind the role gate.

use crate::auth::{
    errors::AuthError,
    models::{
        AuthTokens, ClientMeta, Identity, LoginRequest, LogoutRequest, MessageResponse,
        RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
    },
    service::AuthService,
};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Extension, Json,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthService>,
}

impl AuthState {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }
}

fn client_meta(connect: Option<ConnectInfo<SocketAddr>>, headers: &HeaderMap) -> ClientMeta {
    ClientMeta::new(
        connect.map(|ConnectInfo(addr)| addr.ip()),
        headers.get(USER_AGENT).and_then(|v| v.to_str().ok()),
    )
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "Rejected request body");
        AuthError::validation("No data provided")
    })
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let req = json_body(payload)?;
    let tokens = state
        .service
        .register(req, client_meta(connect, &headers))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            tokens,
        }),
    ))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthTokens>, AuthError> {
    let req = json_body(payload)?;
    let tokens = state
        .service
        .login(req, client_meta(connect, &headers))
        .await?;
    Ok(Json(tokens))
}

/// Refresh endpoint - POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AuthState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<RefreshResponse>, AuthError> {
    let token = payload
        .ok()
        .and_then(|Json(req)| req.refresh_token)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AuthError::validation("Refresh token required"))?;

    let refreshed = state.service.refresh(token.trim()).await?;
    Ok(Json(refreshed))
}

/// Logout endpoint - POST /api/auth/logout
/// Always succeeds, whatever the body holds.
pub async fn logout(
    State(state): State<AuthState>,
    payload: Result<Json<LogoutRequest>, JsonRejection>,
) -> Json<MessageResponse> {
    let token = payload.ok().and_then(|Json(req)| req.refresh_token);
    state.service.logout(token.as_deref()).await;

    Json(MessageResponse {
        message: "Logged out successfully",
    })
}

/// Current identity - GET /api/auth/me (any role)
pub async fn get_current_user(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}

/// Purge expired sessions - POST /api/admin/sessions/purge (admin only)
pub async fn purge_sessions(
    State(state): State<AuthState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, AuthError> {
    let purged = state.service.purge_expired_sessions().await?;
    info!(admin_id = identity.id, purged, "Manual session purge");
    Ok(Json(json!({ "purged": purged })))
}
