//! Role Gate Middleware
//! Validates `Authorization: Bearer <access token>` against an allowed role
//! set and hands the caller's identity to the handler.

use crate::auth::{
    errors::AuthError,
    models::UserRole,
    service::AuthService,
};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Allowed roles for one group of routes
#[derive(Clone)]
pub struct RoleGate {
    service: Arc<AuthService>,
    allowed: Arc<[UserRole]>,
}

impl RoleGate {
    pub fn new(service: Arc<AuthService>, allowed: &[UserRole]) -> Self {
        Self {
            service,
            allowed: allowed.into(),
        }
    }

    /// Any authenticated user
    pub fn any_role(service: Arc<AuthService>) -> Self {
        Self::new(service, &UserRole::ALL)
    }
}

/// Token from a `Bearer` authorization header, if one is present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Rejects with 401/403 or inserts the caller's `Identity` into request
/// extensions.
pub async fn require_roles(
    State(gate): State<RoleGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = gate
        .service
        .authorize(bearer_token(req.headers()), &gate.allowed)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
