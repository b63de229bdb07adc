//! Auth errors and their HTTP mapping.
//!
//! Storage and internal failures are logged in full here and reach the
//! client only as a generic message.

use crate::auth::jwt::TokenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum AuthError {
    Validation(String),
    Conflict,
    InvalidCredentials,
    TokenExpired,
    TokenMalformed,
    InvalidSignature,
    InvalidTokenType,
    SessionNotFound,
    UserNotFound,
    Unauthenticated,
    Forbidden,
    Storage(anyhow::Error),
    Internal(anyhow::Error),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        AuthError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Conflict => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::TokenMalformed
            | AuthError::InvalidSignature
            | AuthError::InvalidTokenType
            | AuthError::SessionNotFound
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Storage(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Validation(msg) => msg.clone(),
            AuthError::Conflict => "Email already registered".to_string(),
            AuthError::InvalidCredentials => "Invalid credentials".to_string(),
            AuthError::TokenExpired => "Token expired".to_string(),
            AuthError::TokenMalformed | AuthError::InvalidSignature => "Invalid token".to_string(),
            AuthError::InvalidTokenType => "Invalid token type".to_string(),
            AuthError::SessionNotFound => "Invalid or expired refresh token".to_string(),
            AuthError::UserNotFound => "User not found".to_string(),
            AuthError::Unauthenticated => "Authentication required".to_string(),
            AuthError::Forbidden => "Insufficient permissions".to_string(),
            AuthError::Storage(_) | AuthError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Storage(e) => write!(f, "storage error: {:#}", e),
            AuthError::Internal(e) => write!(f, "internal error: {:#}", e),
            other => f.write_str(&other.public_message()),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Malformed => AuthError::TokenMalformed,
            TokenError::InvalidSignature => AuthError::InvalidSignature,
        }
    }
}

impl From<rusqlite::Error> for AuthError {
    fn from(e: rusqlite::Error) -> Self {
        AuthError::Storage(e.into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Storage(e) | AuthError::Internal(e) = &self {
            error!(error = ?e, "Auth request failed");
        }

        let status = self.status();
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
