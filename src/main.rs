//! Study Recommender - authentication and session service
//!
//! Boots the auth database, token codec and HTTP router, then serves until
//! Ctrl-C. Expired refresh sessions are purged on a background interval.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studyrec_backend::{
    api::{cors_layer, create_router},
    auth::{AuthService, TokenCodec},
    config::Config,
    db::Database,
    maintenance::run_maintenance,
    middleware::AuthRateLimiter,
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::parse();
    info!("Study recommender auth service starting");

    if config.uses_dev_secret() {
        warn!("JWT_SECRET not set, using the development secret. Set it in production!");
    }

    let db = Database::open(&config.db_path, config.db_busy_timeout())?;
    let codec = TokenCodec::new(&config.jwt_secret, config.token_lifetimes());
    let service = Arc::new(AuthService::new(db, codec, config.bcrypt_cost));

    if let Some((email, password)) = config.admin_bootstrap() {
        service
            .users()
            .ensure_admin(&config.admin_name, email, password)
            .await
            .context("Failed to create bootstrap admin")?;
    }

    let limiter = AuthRateLimiter::new(config.rate_limit_policy());
    tokio::spawn(run_maintenance(
        service.clone(),
        limiter.clone(),
        config.session_purge_interval(),
    ));

    let cors = cors_layer(&config.cors_origin).context("Invalid CORS_ORIGIN")?;
    let app = create_router(service, limiter, cors);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studyrec_backend=debug,studyrec=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate directory.
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
