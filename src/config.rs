//! Runtime configuration.
//!
//! Every setting can come from a command-line flag or the matching
//! environment variable. `.env` files are loaded before parsing (see main.rs).

use crate::auth::jwt::TokenLifetimes;
use crate::middleware::RateLimitPolicy;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 2_592_000; // 30 days
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

#[derive(Parser, Debug, Clone)]
#[command(name = "studyrec")]
#[command(about = "Study recommender backend - authentication and session service")]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000")]
    pub bind_addr: SocketAddr,

    /// SQLite database holding users and refresh sessions
    #[arg(long, env = "AUTH_DB_PATH", default_value = "studyrec_auth.db")]
    pub db_path: String,

    /// HMAC secret used to sign access and refresh tokens
    #[arg(long, env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value_t = DEFAULT_ACCESS_TOKEN_TTL_SECS)]
    pub access_token_ttl_secs: i64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS", default_value_t = DEFAULT_REFRESH_TOKEN_TTL_SECS)]
    pub refresh_token_ttl_secs: i64,

    /// bcrypt work factor for password hashes
    #[arg(long, env = "BCRYPT_COST", default_value_t = DEFAULT_BCRYPT_COST)]
    pub bcrypt_cost: u32,

    /// How often expired refresh sessions are purged
    #[arg(long, env = "SESSION_PURGE_INTERVAL_SECS", default_value_t = 3600)]
    pub session_purge_interval_secs: u64,

    /// Register/login attempts allowed per client IP per minute
    #[arg(long, env = "AUTH_RATE_LIMIT_PER_MINUTE", default_value_t = 5)]
    pub auth_rate_limit_per_minute: u32,

    /// Extra attempts tolerated above the per-minute limit
    #[arg(long, env = "AUTH_RATE_LIMIT_BURST", default_value_t = 5)]
    pub auth_rate_limit_burst: u32,

    /// SQLite busy timeout in milliseconds
    #[arg(long, env = "DB_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub db_busy_timeout_ms: u64,

    /// Browser origin allowed by CORS
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Bootstrap admin account, created on startup if no admin exists
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    #[arg(long, env = "ADMIN_NAME", default_value = "Administrator")]
    pub admin_name: String,
}

impl Config {
    pub fn token_lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access_secs: self.access_token_ttl_secs,
            refresh_secs: self.refresh_token_ttl_secs,
        }
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            per_window: self.auth_rate_limit_per_minute,
            burst: self.auth_rate_limit_burst,
            window: Duration::from_secs(60),
        }
    }

    pub fn db_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.db_busy_timeout_ms)
    }

    pub fn session_purge_interval(&self) -> Duration {
        Duration::from_secs(self.session_purge_interval_secs.max(1))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    /// Admin bootstrap credentials, only when both email and password are set.
    pub fn admin_bootstrap(&self) -> Option<(&str, &str)> {
        match (self.admin_email.as_deref(), self.admin_password.as_deref()) {
            (Some(email), Some(password)) if !email.trim().is_empty() => Some((email, password)),
            _ => None,
        }
    }
}
