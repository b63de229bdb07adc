//! JWT Token Codec
//! Issues and verifies HS256-signed access and refresh tokens.
//!
//! Verification is purely cryptographic plus a clock check; it never reads
//! storage.

use crate::auth::models::{Claims, TokenType, UserRole};
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Token lifetimes in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_secs: i64,
    pub refresh_secs: i64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_secs: crate::config::DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_secs: crate::config::DEFAULT_REFRESH_TOKEN_TTL_SECS,
        }
    }
}

/// Signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Why a presented token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Malformed,
    InvalidSignature,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Expired => write!(f, "Token expired"),
            TokenError::Malformed => write!(f, "Malformed token"),
            TokenError::InvalidSignature => write!(f, "Invalid token signature"),
        }
    }
}

impl std::error::Error for TokenError {}

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetimes: TokenLifetimes,
}

impl TokenCodec {
    pub fn new(secret: &str, lifetimes: TokenLifetimes) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetimes,
        }
    }

    pub fn issue_access_token(
        &self,
        user_id: i64,
        email: &str,
        role: UserRole,
        name: &str,
    ) -> Result<IssuedToken> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id,
            email: Some(email.to_string()),
            role: Some(role),
            name: Some(name.to_string()),
            iat: now,
            exp: now + self.lifetimes.access_secs,
            jti: Uuid::new_v4().to_string(),
            token_type: TokenType::Access,
        };

        debug!(user_id, role = %role, "Issuing access token");
        self.sign(claims)
    }

    pub fn issue_refresh_token(&self, user_id: i64) -> Result<IssuedToken> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id,
            email: None,
            role: None,
            name: None,
            iat: now,
            exp: now + self.lifetimes.refresh_secs,
            jti: Uuid::new_v4().to_string(),
            token_type: TokenType::Refresh,
        };

        debug!(user_id, "Issuing refresh token");
        self.sign(claims)
    }

    /// Sign an arbitrary claim set.
    pub fn sign(&self, claims: Claims) -> Result<IssuedToken> {
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to sign token")?;
        Ok(IssuedToken { token, claims })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify against an explicit clock. A token whose `exp` equals `now` is
    /// already expired.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let claims = self.decode_ignoring_expiry(token)?;
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Signature and structure checks only. Logout uses this so an expired
    /// refresh token can still revoke its session.
    pub fn decode_ignoring_expiry(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })?
            .claims;

        if claims.token_type == TokenType::Access
            && (claims.email.is_none() || claims.role.is_none())
        {
            return Err(TokenError::Malformed);
        }

        Ok(claims)
    }
}
