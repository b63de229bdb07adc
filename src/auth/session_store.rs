//! Refresh Session Storage
//!
//! One row per user in `refresh_sessions`, keyed by `user_id`. A new login
//! overwrites the previous row, so older refresh tokens stop resolving.
//!
//! The `*_on` functions run against a connection the caller already holds,
//! which lets the auth service combine them with user queries under a single
//! lock or transaction. The async methods lock the shared handle themselves.

use crate::auth::models::{ClientMeta, SessionRecord};
use crate::db::Database;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn put(
        &self,
        user_id: i64,
        token_id: &str,
        expires_at: i64,
        meta: &ClientMeta,
    ) -> Result<()> {
        let conn = self.db.lock().await;
        Self::put_on(&conn, user_id, token_id, expires_at, meta, now())
    }

    pub async fn find_valid(&self, token_id: &str, user_id: i64) -> Result<Option<SessionRecord>> {
        let conn = self.db.lock().await;
        Self::find_valid_on(&conn, token_id, user_id, now())
    }

    /// Returns whether a row was removed. Missing rows are not an error.
    pub async fn delete(&self, token_id: &str, user_id: i64) -> Result<bool> {
        let conn = self.db.lock().await;
        Self::delete_on(&conn, token_id, user_id)
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        let conn = self.db.lock().await;
        Self::purge_expired_on(&conn, now())
    }

    pub async fn count(&self) -> Result<i64> {
        let conn = self.db.lock().await;
        conn.query_row("SELECT COUNT(*) FROM refresh_sessions", [], |row| row.get(0))
            .context("Failed to count sessions")
    }

    /// Insert the user's session or replace it in one statement.
    pub fn put_on(
        conn: &Connection,
        user_id: i64,
        token_id: &str,
        expires_at: i64,
        meta: &ClientMeta,
        now: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO refresh_sessions
                (user_id, token_id, expires_at, client_ip, client_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                token_id = excluded.token_id,
                expires_at = excluded.expires_at,
                client_ip = excluded.client_ip,
                client_agent = excluded.client_agent,
                created_at = excluded.created_at",
            params![user_id, token_id, expires_at, meta.ip, meta.agent, now],
        )
        .context("Failed to upsert refresh session")?;

        debug!(user_id, "Refresh session stored");
        Ok(())
    }

    /// Row matching both ids whose expiry is strictly after `now`.
    pub fn find_valid_on(
        conn: &Connection,
        token_id: &str,
        user_id: i64,
        now: i64,
    ) -> Result<Option<SessionRecord>> {
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, token_id, expires_at, client_ip, client_agent, created_at
             FROM refresh_sessions
             WHERE token_id = ?1 AND user_id = ?2 AND expires_at > ?3",
        )?;

        match stmt.query_row(params![token_id, user_id, now], row_to_session) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("Failed to look up refresh session"),
        }
    }

    pub fn delete_on(conn: &Connection, token_id: &str, user_id: i64) -> Result<bool> {
        let removed = conn
            .execute(
                "DELETE FROM refresh_sessions WHERE token_id = ?1 AND user_id = ?2",
                params![token_id, user_id],
            )
            .context("Failed to delete refresh session")?;

        debug!(user_id, removed, "Refresh session delete");
        Ok(removed > 0)
    }

    pub fn purge_expired_on(conn: &Connection, now: i64) -> Result<usize> {
        let purged = conn
            .execute(
                "DELETE FROM refresh_sessions WHERE expires_at <= ?1",
                params![now],
            )
            .context("Failed to purge expired sessions")?;

        if purged > 0 {
            info!(purged, "Purged expired refresh sessions");
        }
        Ok(purged)
    }
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        user_id: row.get(0)?,
        token_id: row.get(1)?,
        expires_at: row.get(2)?,
        client_ip: row.get(3)?,
        client_agent: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn now() -> i64 {
    Utc::now().timestamp()
}
