//! Auth Service
//! Register, login, refresh, logout and the role gate the rest of the
//! application calls before touching its own data.
//!
//! Session lifecycle: a token pair is minted at register/login and the
//! refresh session upserted (superseding any earlier one for that user);
//! refresh mints access tokens against a live session without rotating it;
//! logout deletes the session.

use crate::auth::{
    errors::AuthError,
    jwt::{IssuedToken, TokenCodec},
    models::{
        normalize_email, AuthTokens, ClientMeta, Identity, LoginRequest, PublicUser,
        RefreshResponse, RegisterRequest, TokenType, User, UserRole,
    },
    session_store::SessionStore,
    user_store::UserStore,
};
use crate::db::Database;
use chrono::Utc;
use tracing::{debug, info, warn};

pub const MIN_PASSWORD_LEN: usize = 8;

pub struct AuthService {
    db: Database,
    users: UserStore,
    sessions: SessionStore,
    codec: TokenCodec,
}

impl AuthService {
    pub fn new(db: Database, codec: TokenCodec, bcrypt_cost: u32) -> Self {
        Self {
            users: UserStore::new(db.clone(), bcrypt_cost),
            sessions: SessionStore::new(db.clone()),
            db,
            codec,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn register(
        &self,
        req: RegisterRequest,
        meta: ClientMeta,
    ) -> Result<AuthTokens, AuthError> {
        let (name, email, password) = match (
            non_blank(req.name),
            non_blank(req.email),
            present(req.password),
        ) {
            (Some(n), Some(e), Some(p)) => (n.trim().to_string(), normalize_email(&e), p),
            (n, e, p) => {
                return Err(missing_fields(&[
                    ("name", &n),
                    ("email", &e),
                    ("password", &p),
                ]))
            }
        };

        if !email.contains('@') {
            return Err(AuthError::validation("Invalid email format"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let role = match req.role.as_deref() {
            None => UserRole::Student,
            Some(raw) => {
                UserRole::parse(raw).ok_or_else(|| AuthError::validation("Invalid role"))?
            }
        };

        // Hash before taking the lock; bcrypt is the slow part.
        let password_hash = self
            .users
            .hash_password(&password)
            .map_err(AuthError::Internal)?;

        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        if UserStore::get_by_email_on(&tx, &email)
            .map_err(AuthError::Storage)?
            .is_some()
        {
            info!(email = %email, "Registration rejected: email already registered");
            return Err(AuthError::Conflict);
        }

        let user = UserStore::insert_on(&tx, &name, &email, &password_hash, role)
            .map_err(AuthError::Storage)?;
        let (access, refresh) = self.issue_pair(&user)?;
        SessionStore::put_on(
            &tx,
            user.id,
            &refresh.claims.jti,
            refresh.claims.exp,
            &meta,
            Utc::now().timestamp(),
        )
        .map_err(AuthError::Storage)?;
        tx.commit()?;

        info!(user_id = user.id, role = %user.role, "User registered");
        Ok(AuthTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            user: PublicUser::from_user(&user),
        })
    }

    pub async fn login(
        &self,
        req: LoginRequest,
        meta: ClientMeta,
    ) -> Result<AuthTokens, AuthError> {
        let (email, password) = match (non_blank(req.email), present(req.password)) {
            (Some(e), Some(p)) => (normalize_email(&e), p),
            (e, p) => return Err(missing_fields(&[("email", &e), ("password", &p)])),
        };

        let user = {
            let conn = self.db.lock().await;
            UserStore::get_by_email_on(&conn, &email).map_err(AuthError::Storage)?
        };

        // Same error and the same bcrypt cost for unknown email and wrong
        // password.
        let valid = self
            .users
            .check_credentials(user.as_ref(), &password)
            .map_err(AuthError::Internal)?;
        let user = match user {
            Some(user) if valid => user,
            Some(user) => {
                warn!(user_id = user.id, "Failed login attempt: wrong password");
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                warn!("Failed login attempt: unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let (access, refresh) = self.issue_pair(&user)?;
        {
            let conn = self.db.lock().await;
            SessionStore::put_on(
                &conn,
                user.id,
                &refresh.claims.jti,
                refresh.claims.exp,
                &meta,
                Utc::now().timestamp(),
            )
            .map_err(AuthError::Storage)?;
        }

        info!(user_id = user.id, role = %user.role, "Login successful");
        Ok(AuthTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            user: PublicUser::from_user(&user),
        })
    }

    /// Mint a new access token for a live refresh session. The refresh token
    /// and its session row are left as they are.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        let claims = self.codec.verify(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::InvalidTokenType);
        }

        // Held until the access token exists, so a logout that commits first
        // always wins.
        let conn = self.db.lock().await;

        SessionStore::find_valid_on(&conn, &claims.jti, claims.user_id, Utc::now().timestamp())
            .map_err(AuthError::Storage)?
            .ok_or(AuthError::SessionNotFound)?;

        let user = UserStore::get_by_id_on(&conn, claims.user_id)
            .map_err(AuthError::Storage)?
            .ok_or_else(|| {
                warn!(user_id = claims.user_id, "Live session references a missing user");
                AuthError::UserNotFound
            })?;

        let access = self
            .codec
            .issue_access_token(user.id, &user.email, user.role, &user.name)
            .map_err(AuthError::Internal)?;
        drop(conn);

        debug!(user_id = user.id, "Access token refreshed");
        Ok(RefreshResponse {
            access_token: access.token,
            user: PublicUser::from_user(&user),
        })
    }

    /// Best effort: never fails the caller. Expired refresh tokens still
    /// revoke their session.
    pub async fn logout(&self, refresh_token: Option<&str>) {
        let Some(token) = refresh_token.map(str::trim).filter(|t| !t.is_empty()) else {
            debug!("Logout without refresh token");
            return;
        };

        let claims = match self.codec.decode_ignoring_expiry(token) {
            Ok(claims) if claims.token_type == TokenType::Refresh => claims,
            Ok(_) => {
                debug!("Logout with non-refresh token ignored");
                return;
            }
            Err(e) => {
                debug!(reason = %e, "Logout with undecodable token ignored");
                return;
            }
        };

        match self.sessions.delete(&claims.jti, claims.user_id).await {
            Ok(true) => info!(user_id = claims.user_id, "Logged out"),
            Ok(false) => debug!(user_id = claims.user_id, "Logout for session already gone"),
            Err(e) => warn!(
                user_id = claims.user_id,
                error = ?e,
                "Failed to delete session on logout"
            ),
        }
    }

    /// Role gate. `bearer` is the raw token from `Authorization: Bearer ...`.
    pub fn authorize(
        &self,
        bearer: Option<&str>,
        allowed_roles: &[UserRole],
    ) -> Result<Identity, AuthError> {
        let token = bearer.ok_or(AuthError::Unauthenticated)?;

        let claims = self.codec.verify(token).map_err(|e| {
            debug!(reason = %e, "Rejected bearer token");
            AuthError::Unauthenticated
        })?;
        if claims.token_type != TokenType::Access {
            debug!(user_id = claims.user_id, "Refresh token presented as bearer");
            return Err(AuthError::Unauthenticated);
        }

        let (Some(email), Some(role)) = (claims.email, claims.role) else {
            return Err(AuthError::Unauthenticated);
        };

        if !allowed_roles.contains(&role) {
            warn!(
                user_id = claims.user_id,
                role = %role,
                allowed = ?allowed_roles,
                "Role not permitted for endpoint"
            );
            return Err(AuthError::Forbidden);
        }

        Ok(Identity {
            id: claims.user_id,
            email,
            role,
        })
    }

    pub async fn purge_expired_sessions(&self) -> Result<usize, AuthError> {
        self.sessions.purge_expired().await.map_err(AuthError::Storage)
    }

    fn issue_pair(&self, user: &User) -> Result<(IssuedToken, IssuedToken), AuthError> {
        let access = self
            .codec
            .issue_access_token(user.id, &user.email, user.role, &user.name)
            .map_err(AuthError::Internal)?;
        let refresh = self
            .codec
            .issue_refresh_token(user.id)
            .map_err(AuthError::Internal)?;
        Ok((access, refresh))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Passwords are taken as given; only an empty one counts as missing.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn missing_fields(fields: &[(&str, &Option<String>)]) -> AuthError {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();
    AuthError::validation(format!("Missing fields: {}", missing.join(", ")))
}
