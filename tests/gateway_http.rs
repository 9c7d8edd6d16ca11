//! HTTP surface tests driving the router directly.

mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

use chatbot_auth::gateway::{AllowList, AppState, build_router};
use common::{Harness, harness, harness_with};

const PEER: &str = "192.0.2.1:40000";

fn state(h: &Harness) -> AppState {
    AppState::new(
        h.auth.clone(),
        AllowList::from_entries(&h.config.gateway.public_paths),
        None,
    )
}

fn router(h: &Harness) -> Router {
    build_router(Arc::new(state(h)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    post_from(uri, body, bearer, PEER, None)
}

fn post_from(
    uri: &str,
    body: Value,
    bearer: Option<&str>,
    peer: &str,
    forwarded_for: Option<&str>,
) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(addr));
    if let Some(hops) = forwarded_for {
        builder = builder.header("x-forwarded-for", hops);
    }
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn login_token(app: &Router, username: &str, password: &str, user_type: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/api/v1/auth/login",
            json!({"username": username, "password": password, "userType": user_type}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["data"]["accessToken"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_login_success_envelope() {
    let h = harness();
    h.user("alice", "alice-pass").await;
    let app = router(&h);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/auth/login",
            json!({"username": "alice", "password": "alice-pass", "userType": "user"}),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["tokenType"], "Bearer");
    assert_eq!(body["data"]["expiresIn"], 900);
    assert_eq!(body["data"]["user"]["username"], "alice");
    assert_eq!(body["data"]["user"]["userType"], "user");
    assert!(body["data"]["user"].get("adminLevel").is_none());
    assert!(body["data"]["refreshToken"].is_string());
}

#[tokio::test]
async fn test_login_errors() {
    let h = harness();
    h.user("alice", "alice-pass").await;
    let app = router(&h);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/auth/login",
            json!({"username": "alice", "password": "nope", "userType": "user"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2001);
    assert_eq!(body["error"], "INVALID_CREDENTIALS");

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/auth/login",
            json!({"username": "", "password": "x", "userType": "user"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1001);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/auth/login",
            json!({"username": "alice", "password": "x", "userType": "superuser"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_PARAMETER");
}

#[tokio::test]
async fn test_two_factor_login_over_http() {
    let h = harness();
    let (_, secret) = h.admin_with_two_factor("root", "root-pass").await;
    let app = router(&h);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/auth/login",
            json!({"username": "root", "password": "root-pass", "userType": "admin"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 2004);
    assert_eq!(body["msg"], "TWO_FACTOR_REQUIRED");
    assert_eq!(body["data"]["requiresTwoFactor"], true);
    assert_eq!(body["data"]["username"], "root");
    assert!(body["data"].get("accessToken").is_none());
    let temp_token = body["data"]["tempToken"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/admin/2fa/verify-login",
            json!({"username": "root", "code": "12345", "tempToken": temp_token}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MALFORMED_CODE");

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/admin/2fa/verify-login",
            json!({"username": "root", "code": h.code(&secret), "tempToken": temp_token}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["user"]["adminLevel"], 1);
}

#[tokio::test]
async fn test_forwarded_for_does_not_reset_login_quota() {
    let h = harness();
    let app = router(&h);

    // Login quota is 3 per 60s per client
    let mut statuses = Vec::new();
    for i in 0..5 {
        let (status, _) = send(
            &app,
            post_from(
                "/api/v1/auth/login",
                json!({"username": format!("ghost{}", i), "password": "x", "userType": "user"}),
                None,
                "198.51.100.9:5000",
                Some(&format!("203.0.113.{}", i)),
            ),
        )
        .await;
        statuses.push(status);
    }
    assert_eq!(
        statuses,
        [
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
}

#[tokio::test]
async fn test_forwarded_for_does_not_reset_two_factor_quota() {
    let h = harness();
    let (_, secret) = h.admin_with_two_factor("root", "root-pass").await;
    let app = router(&h);
    let peer = "198.51.100.10:5000";

    let (_, body) = send(
        &app,
        post_from(
            "/api/v1/auth/login",
            json!({"username": "root", "password": "root-pass", "userType": "admin"}),
            None,
            peer,
            Some("203.0.113.200"),
        ),
    )
    .await;
    let temp_token = body["data"]["tempToken"].as_str().unwrap().to_string();

    let verify = |code: String, hop: String| {
        post_from(
            "/api/v1/admin/2fa/verify-login",
            json!({"username": "root", "code": code, "tempToken": temp_token}),
            None,
            peer,
            Some(&hop),
        )
    };

    // The login used one of three slots
    for i in 0..2 {
        let (status, _) = send(&app, verify(h.wrong_code(&secret), format!("203.0.113.{}", i))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = send(&app, verify(h.wrong_code(&secret), "203.0.113.50".into())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], 2003);

    let (status, _) = send(&app, verify(h.code(&secret), "203.0.113.51".into())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_trusted_proxy_forwards_client_address() {
    let h = harness();
    let proxy = "10.0.0.1:443";
    let state = state(&h).with_trusted_proxies(vec!["10.0.0.1".parse().unwrap()]);
    let app = build_router(Arc::new(state));

    let attempt = |client: &str| {
        post_from(
            "/api/v1/auth/login",
            json!({"username": "ghost", "password": "x", "userType": "user"}),
            None,
            proxy,
            Some(client),
        )
    };

    for _ in 0..3 {
        let (status, _) = send(&app, attempt("203.0.113.1")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = send(&app, attempt("203.0.113.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // A different client behind the same proxy has its own window
    let (status, _) = send(&app, attempt("203.0.113.2")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_requires_identity() {
    let h = harness();
    h.user("alice", "alice-pass").await;
    let app = router(&h);

    let (status, body) = send(&app, get("/api/v1/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHENTICATED");

    // An invalid token leaves the request anonymous rather than failing it
    let (status, body) = send(&app, get("/api/v1/me", Some("garbage.token.value"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHENTICATED");

    let token = login_token(&app, "alice", "alice-pass", "user").await;
    let (status, body) = send(&app, get("/api/v1/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");
}

#[tokio::test]
async fn test_public_paths_ignore_bad_tokens() {
    let h = harness();
    h.user("alice", "alice-pass").await;
    let app = router(&h);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/auth/login",
            json!({"username": "alice", "password": "alice-pass", "userType": "user"}),
            Some("expired-or-forged"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
}

#[tokio::test]
async fn test_admin_routes_reject_users() {
    let h = harness();
    h.user("alice", "alice-pass").await;
    h.admin("root", "root-pass").await;
    let app = router(&h);

    let user_token = login_token(&app, "alice", "alice-pass", "user").await;
    let (status, body) = send(
        &app,
        post_json("/api/v1/admin/2fa/setup", json!({}), Some(&user_token)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");

    let (status, _) = send(&app, get("/api/v1/admin/2fa/status", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin_token = login_token(&app, "root", "root-pass", "admin").await;
    let (status, body) = send(
        &app,
        post_json("/api/v1/admin/2fa/setup", json!({}), Some(&admin_token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let secret = body["data"]["secret"].as_str().unwrap().to_string();
    assert!(
        body["data"]["qrCodeUrl"]
            .as_str()
            .unwrap()
            .starts_with("otpauth://totp/")
    );

    let (status, body) = send(&app, get("/api/v1/admin/2fa/status", Some(&admin_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["setupPending"], true);

    let (status, _) = send(
        &app,
        post_json(
            "/api/v1/admin/2fa/verify",
            json!({"code": h.code(&secret)}),
            Some(&admin_token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, get("/api/v1/admin/2fa/status", Some(&admin_token))).await;
    assert_eq!(body["data"]["enabled"], true);
}

#[tokio::test]
async fn test_refresh_over_http() {
    let h = harness();
    h.user("alice", "alice-pass").await;
    let app = router(&h);

    let (_, body) = send(
        &app,
        post_json(
            "/api/v1/auth/login",
            json!({"username": "alice", "password": "alice-pass", "userType": "user"}),
            None,
        ),
    )
    .await;
    let refresh_token = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/auth/refresh",
            json!({"refreshToken": refresh_token}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["refreshToken"], refresh_token.as_str());

    let (status, body) = send(
        &app,
        post_json("/api/v1/auth/refresh", json!({"refreshToken": "x.y.z"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "TOKEN_MALFORMED");
}

#[tokio::test]
async fn test_api_rate_limit() {
    let yaml = common::CONFIG.replace(
        "api: { count: 100, window_secs: 60 }",
        "api: { count: 2, window_secs: 60 }",
    );
    let h = harness_with(&yaml);
    h.user("alice", "alice-pass").await;
    let app = router(&h);
    let token = login_token(&app, "alice", "alice-pass", "user").await;

    for _ in 0..2 {
        let (status, _) = send(&app, get("/api/v1/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&app, get("/api/v1/me", Some(&token))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], 2003);

    // Login is outside the general API quota
    login_token(&app, "alice", "alice-pass", "user").await;
}

#[tokio::test]
async fn test_health_and_docs() {
    let h = harness();
    let app = router(&h);

    let (status, body) = send(&app, get("/api/v1/auth/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert!(body["data"].get("database").is_none());

    let (status, body) = send(&app, get("/api-docs/openapi.json", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/auth/login"].is_object());
}
