//! End-to-end tests for the auth HTTP surface.
//!
//! Each test builds the full router over an in-memory database and drives it
//! with `oneshot` requests, so no socket is opened.

use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;

use studyrec_backend::{
    api::create_router,
    auth::{AuthService, TokenCodec, TokenLifetimes, UserRole},
    db::Database,
    middleware::{AuthRateLimiter, RateLimitPolicy},
};

struct TestApp {
    router: Router,
    service: Arc<AuthService>,
}

fn test_app() -> TestApp {
    app_with_policy(RateLimitPolicy::default())
}

fn app_with_policy(policy: RateLimitPolicy) -> TestApp {
    let service = Arc::new(AuthService::new(
        Database::open_in_memory().unwrap(),
        TokenCodec::new("integration-test-secret", TokenLifetimes::default()),
        4,
    ));
    let router = create_router(
        service.clone(),
        AuthRateLimiter::new(policy),
        CorsLayer::permissive(),
    );
    TestApp { router, service }
}

/// App whose requests all appear to come from one peer address, so the
/// credential rate limit applies.
fn app_behind_peer(policy: RateLimitPolicy) -> TestApp {
    let mut app = app_with_policy(policy);
    app.router = app
        .router
        .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 41000))));
    app
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn post_raw(&self, uri: &str, body: Value) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Value {
        let (status, body) = self
            .post_json(
                "/api/auth/register",
                json!({ "name": name, "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

#[tokio::test]
async fn health_check_is_public() {
    let app = test_app();
    let (status, body) = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn register_login_refresh_logout_flow() {
    let app = test_app();

    let registered = app.register("Ann", "ann@x.com", "password1").await;
    assert_eq!(registered["message"], "User registered successfully");
    assert_eq!(registered["user"]["role"], "student");
    assert_eq!(registered["user"]["email"], "ann@x.com");
    assert!(registered["user"].get("password_hash").is_none());

    let (status, body) = app
        .post_json(
            "/api/auth/login",
            json!({ "email": "ann@x.com", "password": "wrong" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, logged_in) = app
        .post_json(
            "/api/auth/login",
            json!({ "email": "ANN@x.com", "password": "password1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(logged_in["refreshToken"], registered["refreshToken"]);

    // Registration session was superseded by the login.
    let (status, _) = app
        .post_json(
            "/api/auth/refresh",
            json!({ "refreshToken": registered["refreshToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, refreshed) = app
        .post_json(
            "/api/auth/refresh",
            json!({ "refreshToken": logged_in["refreshToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(refreshed["accessToken"].is_string());
    assert!(refreshed.get("refreshToken").is_none());
    assert_eq!(refreshed["user"]["id"], logged_in["user"]["id"]);

    for _ in 0..2 {
        let (status, body) = app
            .post_json(
                "/api/auth/logout",
                json!({ "refreshToken": logged_in["refreshToken"] }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out successfully");
    }

    let (status, _) = app
        .post_json(
            "/api/auth/refresh",
            json!({ "refreshToken": logged_in["refreshToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_bad_input() {
    let app = test_app();

    let (status, body) = app
        .post_json("/api/auth/register", json!({ "name": "Ann" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing fields: email, password");

    let (status, _) = app
        .post_json(
            "/api/auth/register",
            json!({ "name": "Ann", "email": "ann@x.com", "password": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Request::post("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_duplicate_email_is_conflict() {
    let app = test_app();
    app.register("Ann", "ann@x.com", "password1").await;

    let (status, body) = app
        .post_json(
            "/api/auth/register",
            json!({ "name": "Ann", "email": " Ann@X.com", "password": "password1" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Email already registered");
}

#[tokio::test]
async fn refresh_requires_token_and_rejects_access_tokens() {
    let app = test_app();
    let registered = app.register("Ann", "ann@x.com", "password1").await;

    let (status, body) = app.post_json("/api/auth/refresh", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Refresh token required");

    let (status, body) = app
        .post_json(
            "/api/auth/refresh",
            json!({ "refreshToken": registered["accessToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token type");
}

#[tokio::test]
async fn logout_never_fails() {
    let app = test_app();

    let (status, _) = app.post_json("/api/auth/logout", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post_json("/api/auth/logout", json!({ "refreshToken": "garbage" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Request::post("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn me_requires_bearer_token() {
    let app = test_app();
    let registered = app.register("Ann", "ann@x.com", "password1").await;
    let access = registered["accessToken"].as_str().unwrap();

    let (status, body) = app
        .send(Request::get("/api/auth/me").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");

    let (status, body) = app
        .send(
            Request::get("/api/auth/me")
                .header(header::AUTHORIZATION, bearer(access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], registered["user"]["id"]);
    assert_eq!(body["email"], "ann@x.com");
    assert_eq!(body["role"], "student");

    let refresh = registered["refreshToken"].as_str().unwrap();
    let (status, _) = app
        .send(
            Request::get("/api/auth/me")
                .header(header::AUTHORIZATION, bearer(refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_enforce_role() {
    let app = test_app();
    let student = app.register("Ann", "ann@x.com", "password1").await;

    let (status, body) = app
        .send(
            Request::post("/api/admin/sessions/purge")
                .header(
                    header::AUTHORIZATION,
                    bearer(student["accessToken"].as_str().unwrap()),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Insufficient permissions");

    app.service
        .users()
        .create_user("Root", "root@school.edu", "changeme123", UserRole::Admin)
        .await
        .unwrap();
    let (status, admin) = app
        .post_json(
            "/api/auth/login",
            json!({ "email": "root@school.edu", "password": "changeme123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(admin["user"]["role"], "admin");

    let (status, body) = app
        .send(
            Request::post("/api/admin/sessions/purge")
                .header(
                    header::AUTHORIZATION,
                    bearer(admin["accessToken"].as_str().unwrap()),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["purged"], 0);
}

#[tokio::test]
async fn credential_endpoints_are_rate_limited_per_client() {
    let app = app_behind_peer(RateLimitPolicy {
        per_window: 1,
        burst: 0,
        window: Duration::from_secs(60),
    });
    let login = json!({ "email": "nobody@x.com", "password": "password1" });

    let first = app.post_raw("/api/auth/login", login.clone()).await;
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    assert!(first.headers().get(header::RETRY_AFTER).is_none());

    let second = app.post_raw("/api/auth/login", login).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = second
        .headers()
        .get(header::RETRY_AFTER)
        .expect("429 carries Retry-After")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    // Register shares the client's window.
    let register = app
        .post_raw(
            "/api/auth/register",
            json!({ "name": "Ann", "email": "ann@x.com", "password": "password1" }),
        )
        .await;
    assert_eq!(register.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn refresh_and_logout_are_not_rate_limited() {
    let app = app_behind_peer(RateLimitPolicy {
        per_window: 1,
        burst: 0,
        window: Duration::from_secs(60),
    });
    let registered = app.register("Ann", "ann@x.com", "password1").await;
    let refresh_token = registered["refreshToken"].clone();

    for _ in 0..5 {
        let (status, _) = app
            .post_json(
                "/api/auth/refresh",
                json!({ "refreshToken": refresh_token }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    for _ in 0..5 {
        let (status, _) = app
            .post_json("/api/auth/logout", json!({ "refreshToken": refresh_token }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}
