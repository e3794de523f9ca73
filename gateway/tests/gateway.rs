//! End-to-end tests of the gateway request chain
//!
//! Requests go straight into `handle_request`; the user service and the
//! item backend are wiremock servers, the event bus is in-process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, COOKIE, ORIGIN, SET_COOKIE};
use hyper::{Method, Request, Response, StatusCode};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gateway::server::{handle_request, AppState};
use gateway::sessions::fanout;
use gateway::sites::SiteRegistry;
use gateway::Args;
use platform_core::clients::{HttpUserClient, Site};
use platform_core::events::topics::{self, LoginEmailRequest};
use platform_core::events::{publish_json, MemoryBus};

const ORIGIN_OK: &str = "https://ethicalbuzz.com";

struct Harness {
    _dir: TempDir,
    _users: MockServer,
    state: Arc<AppState>,
    bus: Arc<MemoryBus>,
    items: MockServer,
}

async fn harness(extra: &[&str]) -> Harness {
    let dir = TempDir::new().unwrap();
    let db_url = dir.path().join("gateway.db").to_string_lossy().to_string();

    let users = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/internal/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "usr_0123456789abcdefghijKL",
            "email": "test@testing.com",
            "is_admin": false
        })))
        .mount(&users)
        .await;
    let items = MockServer::start().await;

    let users_url = users.uri();
    let items_url = items.uri();
    let mut argv = vec![
        "gateway",
        "--database-url",
        &db_url,
        "--csrf-secret",
        "test-secret",
        "--users-url",
        &users_url,
        "--items-url",
        &items_url,
    ];
    argv.extend_from_slice(extra);
    let args = Args::parse_from(argv);

    let pool = gateway::db::open(&args.database_url).await.unwrap();
    let bus = Arc::new(MemoryBus::new());
    let http = reqwest::Client::new();
    let sites = Arc::new(SiteRegistry::new(vec![]));
    sites
        .replace(&[Site {
            name: "ethicalbuzz".into(),
            url: ORIGIN_OK.into(),
        }])
        .await;

    let state = AppState::new(
        args,
        pool,
        http.clone(),
        Arc::new(HttpUserClient::new(http, &users_url)),
        bus.clone(),
        sites,
    )
    .unwrap();

    Harness {
        _dir: dir,
        _users: users,
        state: Arc::new(state),
        bus,
        items,
    }
}

fn addr() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

async fn send(h: &Harness, req: Request<Full<Bytes>>) -> Response<Full<Bytes>> {
    handle_request(h.state.clone(), addr(), req).await
}

async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn cookie_value(response: &Response<Full<Bytes>>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

/// Fetch a CSRF cookie and a matching header token
async fn csrf_pair(h: &Harness) -> (String, String) {
    let response = send(
        h,
        Request::get("/health").body(Full::new(Bytes::new())).unwrap(),
    )
    .await;
    let cookie = cookie_value(&response, "_csrf").unwrap();
    let token = response.headers()["x-csrf-token"].to_str().unwrap().to_string();
    (cookie, token)
}

/// Run the email login flow and return the session cookie
async fn log_in(h: &Harness) -> String {
    let body = serde_json::json!({"email": "test@testing.com", "language": "en"});
    let response = send(
        h,
        Request::post("/auth/request-login-email")
            .header("content-type", "application/json")
            .header(ORIGIN, ORIGIN_OK)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let event: LoginEmailRequest = h
        .bus
        .published(topics::LOGIN_EMAIL_REQUEST)
        .last()
        .unwrap()
        .json()
        .unwrap();

    let login = serde_json::json!({"login_token": event.login_token});
    let response = send(
        h,
        Request::post("/auth/login")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(login.to_string())))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    cookie_value(&response, "session").unwrap()
}

#[tokio::test]
async fn test_login_happy_path() {
    let h = harness(&[]).await;

    let body = serde_json::json!({"email": "test@testing.com", "language": "en"});
    let response = send(
        &h,
        Request::post("/auth/request-login-email")
            .header("content-type", "application/json")
            .header(ORIGIN, ORIGIN_OK)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let published = h.bus.published(topics::LOGIN_EMAIL_REQUEST);
    assert_eq!(published.len(), 1);
    let event: LoginEmailRequest = published[0].json().unwrap();
    assert_eq!(event.site, "ethicalbuzz");
    assert_eq!(event.language, "en");
    assert_eq!(event.login_token.len(), 6);
    assert!(event.login_token.chars().all(|c| c.is_ascii_digit()));

    let login = serde_json::json!({"login_token": event.login_token}).to_string();
    let response = send(
        &h,
        Request::post("/auth/login")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(login.clone())))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session = cookie_value(&response, "session").unwrap();
    assert_eq!(session.len(), 16);
    let set_cookie: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
    assert!(set_cookie
        .iter()
        .any(|v| v.to_str().unwrap().starts_with("session=") && v.to_str().unwrap().contains("HttpOnly")));

    let user = body_json(response).await;
    assert_eq!(user["email"], "test@testing.com");
    assert_eq!(user["is_admin"], false);
    assert!(user["id"].as_str().unwrap().starts_with("usr_"));

    let again = send(
        &h,
        Request::post("/auth/login")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(login)))
            .unwrap(),
    )
    .await;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(again).await["message"], "Unknown login token");
}

#[tokio::test]
async fn test_logout_all_invalidates_every_session() {
    let h = harness(&[]).await;
    let s1 = log_in(&h).await;
    let s2 = log_in(&h).await;
    assert_ne!(s1, s2);

    let (csrf_cookie, csrf_token) = csrf_pair(&h).await;
    let response = send(
        &h,
        Request::post("/auth/logout-all")
            .header(COOKIE, format!("session={}; _csrf={}", s1, csrf_cookie))
            .header("x-csrf-token", csrf_token)
            .body(Full::new(Bytes::new()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for session in [s1, s2] {
        let response = send(
            &h,
            Request::get("/me")
                .header(COOKIE, format!("session={}", session))
                .body(Full::new(Bytes::new()))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_client_auth_headers_never_reach_backend() {
    let h = harness(&[]).await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("x-auth-method", "none"))
        .and(header("x-auth-is-admin", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&h.items)
        .await;

    let response = send(
        &h,
        Request::get("/items?format=summary")
            .header("x-auth-method", "service-client")
            .header("x-auth-is-admin", "true")
            .header("x-auth-user-id", "usr_admin")
            .body(Full::new(Bytes::new()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_user_is_forwarded() {
    let h = harness(&[]).await;
    let session = log_in(&h).await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("x-auth-method", "session"))
        .and(header("x-auth-user-id", "usr_0123456789abcdefghijKL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&h.items)
        .await;

    let response = send(
        &h,
        Request::get("/items")
            .header(COOKIE, format!("session={}", session))
            .header("x-auth-method", "api-key")
            .body(Full::new(Bytes::new()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_required_for_state_changes() {
    let h = harness(&[]).await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})))
        .mount(&h.items)
        .await;

    let response = send(
        &h,
        Request::post("/items")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(cookie_value(&response, "_csrf").is_some());

    let (cookie, token) = csrf_pair(&h).await;
    let response = send(
        &h,
        Request::post("/items")
            .header(COOKIE, format!("_csrf={}", cookie))
            .header("x-csrf-token", token)
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    // a valid cookie is not re-issued
    assert!(cookie_value(&response, "_csrf").is_none());
    assert!(response.headers().contains_key("x-csrf-token"));
}

#[tokio::test]
async fn test_dev_mode_skips_csrf() {
    let h = harness(&["--dev-mode"]).await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})))
        .mount(&h.items)
        .await;

    let response = send(
        &h,
        Request::post("/items")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(!cookie.contains("Secure"));
}

#[tokio::test]
async fn test_cors_follows_registry() {
    let h = harness(&[]).await;

    let allowed = send(
        &h,
        Request::get("/health")
            .header(ORIGIN, "https://www.ethicalbuzz.com")
            .body(Full::new(Bytes::new()))
            .unwrap(),
    )
    .await;
    assert_eq!(
        allowed.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://www.ethicalbuzz.com"
    );
    assert_eq!(allowed.headers()["access-control-expose-headers"], "X-CSRF-Token");

    let refused = send(
        &h,
        Request::get("/health")
            .header(ORIGIN, "https://evil.example")
            .body(Full::new(Bytes::new()))
            .unwrap(),
    )
    .await;
    assert!(refused.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    let preflight = send(
        &h,
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/items")
            .header(ORIGIN, ORIGIN_OK)
            .body(Full::new(Bytes::new()))
            .unwrap(),
    )
    .await;
    assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
    assert_eq!(preflight.headers()["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn test_unknown_route_and_auth_required() {
    let h = harness(&[]).await;

    let response = send(&h, Request::get("/nope").body(Full::new(Bytes::new())).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["message"], "Not found");

    let response = send(&h, Request::get("/me").body(Full::new(Bytes::new())).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_throttle_answers_503_when_saturated() {
    let h = harness(&["--max-in-flight", "1"]).await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"items": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&h.items)
        .await;

    let state = h.state.clone();
    let slow = tokio::spawn(async move {
        handle_request(state, addr(), Request::get("/items").body(Full::new(Bytes::new())).unwrap())
            .await
            .status()
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = send(&h, Request::get("/health").body(Full::new(Bytes::new())).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(slow.await.unwrap(), StatusCode::OK);
}

#[tokio::test]
async fn test_user_updated_event_reaches_sessions() {
    let h = harness(&[]).await;
    let _task = tokio_test::assert_ok!(fanout::start(h.bus.clone(), h.state.sessions.clone()).await);
    let session = log_in(&h).await;

    publish_json(
        h.bus.as_ref(),
        topics::USER_UPDATED,
        &serde_json::json!({
            "id": "usr_0123456789abcdefghijKL",
            "email": "renamed@testing.com",
            "is_admin": true
        }),
    )
    .await
    .unwrap();

    let mut updated = false;
    for _ in 0..50 {
        let current = h.state.sessions.lookup_session(&session).await.unwrap();
        if current.is_admin && current.email == "renamed@testing.com" {
            updated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(updated);

    publish_json(
        h.bus.as_ref(),
        topics::USER_DELETED,
        &serde_json::json!({"id": "usr_0123456789abcdefghijKL"}),
    )
    .await
    .unwrap();
    for _ in 0..50 {
        if h.state.sessions.lookup_session(&session).await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session survived user-deleted");
}
