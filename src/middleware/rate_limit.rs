//! Per-IP rate limiting for the credential endpoints.
//!
//! Fixed window per client address with a small burst allowance. Requests
//! without a known peer address (in-process tests, unix sockets) pass through.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::RETRY_AFTER, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Requests allowed per window before the burst allowance kicks in
    pub per_window: u32,
    /// Extra requests tolerated above `per_window`
    pub burst: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            per_window: 5,
            burst: 5,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Allow,
    Reject { retry_after: Duration },
}

struct Window {
    started: Instant,
    hits: u32,
}

#[derive(Clone)]
pub struct AuthRateLimiter {
    policy: RateLimitPolicy,
    windows: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

impl AuthRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Decision {
        let mut windows = self.windows.lock();
        let window = windows.entry(ip).or_insert(Window {
            started: now,
            hits: 0,
        });

        if now.duration_since(window.started) >= self.policy.window {
            window.started = now;
            window.hits = 0;
        }
        window.hits = window.hits.saturating_add(1);

        if window.hits > self.policy.per_window.saturating_add(self.policy.burst) {
            let resets_at = window.started + self.policy.window;
            Decision::Reject {
                retry_after: resets_at.saturating_duration_since(now),
            }
        } else {
            Decision::Allow
        }
    }

    /// Drop windows that have been idle for two periods. Called from the
    /// maintenance task.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let idle = self.policy.window * 2;
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < idle);
        before - windows.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<AuthRateLimiter>,
    connect: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(ConnectInfo(addr)) = connect else {
        return next.run(request).await;
    };

    match limiter.check_at(addr.ip(), Instant::now()) {
        Decision::Allow => next.run(request).await,
        Decision::Reject { retry_after } => {
            let secs = retry_after.as_secs().max(1);
            warn!(
                ip = %addr.ip(),
                path = %request.uri().path(),
                retry_after_secs = secs,
                "Auth rate limit exceeded"
            );

            (
                StatusCode::TOO_MANY_REQUESTS,
                [(RETRY_AFTER, secs.to_string())],
                Json(serde_json::json!({
                    "error": "Too many requests. Please slow down.",
                    "retry_after_seconds": secs,
                })),
            )
                .into_response()
        }
    }
}
