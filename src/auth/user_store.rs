//! User Storage
//! Account rows needed by register, login and refresh, with bcrypt hashing.

use crate::auth::models::{normalize_email, User, UserRole};
use crate::db::Database;
use anyhow::{Context, Result};
use bcrypt::{hash, verify};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";

/// Hashed once per store and checked when a login names no account, so the
/// miss costs one bcrypt verify like a wrong password does.
const DUMMY_PASSWORD: &str = "studyrec-no-such-account";

#[derive(Clone)]
pub struct UserStore {
    db: Database,
    bcrypt_cost: u32,
    dummy_hash: Arc<OnceLock<String>>,
    password_checks: Arc<AtomicU64>,
}

impl UserStore {
    pub fn new(db: Database, bcrypt_cost: u32) -> Self {
        Self {
            db,
            bcrypt_cost,
            dummy_hash: Arc::new(OnceLock::new()),
            password_checks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        hash(password, self.bcrypt_cost).context("Failed to hash password")
    }

    pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
        verify(password, password_hash).context("Failed to verify password")
    }

    /// Check a login password. With no account the password is verified
    /// against a dummy hash at the configured cost and the result is always
    /// false.
    pub fn check_credentials(&self, user: Option<&User>, password: &str) -> Result<bool> {
        self.password_checks.fetch_add(1, Ordering::Relaxed);
        match user {
            Some(user) => Self::verify_password(password, &user.password_hash),
            None => {
                Self::verify_password(password, self.dummy_hash()?)?;
                Ok(false)
            }
        }
    }

    /// Number of bcrypt verifications run by [`Self::check_credentials`].
    pub fn password_checks(&self) -> u64 {
        self.password_checks.load(Ordering::Relaxed)
    }

    fn dummy_hash(&self) -> Result<&str> {
        if let Some(existing) = self.dummy_hash.get() {
            return Ok(existing);
        }
        let fresh = self.hash_password(DUMMY_PASSWORD)?;
        Ok(self.dummy_hash.get_or_init(|| fresh))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.db.lock().await;
        Self::get_by_email_on(&conn, &normalize_email(email))
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.db.lock().await;
        Self::get_by_id_on(&conn, id)
    }

    /// Create a user outside the registration flow (admin bootstrap, tests).
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User> {
        let password_hash = self.hash_password(password)?;
        let conn = self.db.lock().await;
        Self::insert_on(&conn, name, &normalize_email(email), &password_hash, role)
    }

    /// Create the bootstrap admin when no admin account exists yet.
    /// Returns true when an account was created.
    pub async fn ensure_admin(&self, name: &str, email: &str, password: &str) -> Result<bool> {
        let password_hash = self.hash_password(password)?;
        let conn = self.db.lock().await;

        let admins: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for admin users")?;
        if admins > 0 {
            return Ok(false);
        }

        let email = normalize_email(email);
        if Self::get_by_email_on(&conn, &email)?.is_some() {
            warn!(email = %email, "Bootstrap admin email already belongs to a non-admin user");
            return Ok(false);
        }

        Self::insert_on(&conn, name, &email, &password_hash, UserRole::Admin)?;
        info!(email = %email, "Bootstrap admin user created");
        Ok(true)
    }

    /// `email` must already be normalized.
    pub fn get_by_email_on(conn: &Connection, email: &str) -> Result<Option<User>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1"
        ))?;

        match stmt.query_row(params![email], row_to_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("Failed to look up user by email"),
        }
    }

    pub fn get_by_id_on(conn: &Connection, id: i64) -> Result<Option<User>> {
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;

        match stmt.query_row(params![id], row_to_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("Failed to look up user by id"),
        }
    }

    /// `email` must already be normalized.
    pub fn insert_on(
        conn: &Connection,
        name: &str,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User> {
        let created_at = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO users (name, email, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, email, password_hash, role.as_str(), created_at],
        )
        .context("Failed to insert user")?;

        let user = User {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at,
        };

        info!(user_id = user.id, role = %user.role, "Created user");
        Ok(user)
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: UserRole::parse(&role_str).unwrap_or(UserRole::Student),
        created_at: row.get(5)?,
    })
}
