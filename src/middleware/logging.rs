//! Request logging middleware.
//!
//! One line per request with method, path, status and latency. Rejected
//! credentials, role denials and throttled clients are tagged so they can be
//! filtered apart from ordinary traffic.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{info, warn};

pub async fn request_logging(
    connect: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == "/health" {
        return next.run(request).await;
    }

    let client_ip = connect
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    let code = status.as_u16();
    if status.is_server_error() {
        warn!(%method, %path, status = code, latency_ms, %client_ip, "Request failed (5xx)");
    } else if let Some(denial) = denial_kind(status) {
        info!(%method, %path, status = code, latency_ms, %client_ip, denial, "Request denied");
    } else {
        info!(%method, %path, status = code, latency_ms, %client_ip, "Request completed");
    }

    response
}

fn denial_kind(status: StatusCode) -> Option<&'static str> {
    match status {
        StatusCode::UNAUTHORIZED => Some("unauthenticated"),
        StatusCode::FORBIDDEN => Some("forbidden"),
        StatusCode::TOO_MANY_REQUESTS => Some("rate_limited"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_kind() {
        assert_eq!(denial_kind(StatusCode::UNAUTHORIZED), Some("unauthenticated"));
        assert_eq!(denial_kind(StatusCode::FORBIDDEN), Some("forbidden"));
        assert_eq!(denial_kind(StatusCode::TOO_MANY_REQUESTS), Some("rate_limited"));
        assert_eq!(denial_kind(StatusCode::BAD_REQUEST), None);
        assert_eq!(denial_kind(StatusCode::OK), None);
    }
}
