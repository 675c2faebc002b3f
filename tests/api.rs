//! In-process router tests for the REST surface, built the way the pack's
//! `oneshot`-based axum tests are: no real TCP listener, just
//! `tower::ServiceExt::oneshot` against the router `app::build_router`
//! returns.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use rc_host::app::{build_router, test_state};
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "test-token";

fn app() -> axum::Router {
    let dir = std::env::temp_dir().join(format!("rc-host-test-{}", std::process::id()));
    build_router(test_state(TOKEN, dir))
}

async fn request(
    app: axum::Router,
    method: Method,
    path: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    let req = if let Some(body) = body {
        builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    } else {
        builder.body(Body::empty()).unwrap()
    };
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let val: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, val)
}

#[tokio::test]
async fn healthz_requires_no_auth() {
    let (status, val) = request(app(), Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(val["ok"], true);
}

#[tokio::test]
async fn api_routes_reject_missing_bearer() {
    let (status, _) = request(app(), Method::GET, "/api/sessions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_routes_reject_wrong_bearer() {
    let (status, _) =
        request(app(), Method::GET, "/api/sessions", Some("Bearer nope"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_routes_accept_raw_or_bearer_prefixed_token() {
    let app = app();
    let (status, _) = request(
        app.clone(),
        Method::GET,
        "/api/sessions",
        Some(&format!("Bearer {TOKEN}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(app, Method::GET, "/api/sessions", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn empty_sessions_list_on_startup() {
    let (status, val) = request(
        app(),
        Method::GET,
        "/api/sessions",
        Some(&format!("Bearer {TOKEN}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(val.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn engines_list_always_includes_shell() {
    let (status, val) = request(
        app(),
        Method::GET,
        "/api/engines",
        Some(&format!("Bearer {TOKEN}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(val.as_array().unwrap().iter().any(|v| v == "shell"));
}

#[tokio::test]
async fn create_session_rejects_unknown_engine() {
    let (status, val) = request(
        app(),
        Method::POST,
        "/api/sessions",
        Some(&format!("Bearer {TOKEN}")),
        Some(json!({"engine": "not-a-real-engine"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(val["error"]["code"], "invalid_engine");
}

#[tokio::test]
async fn create_session_rejects_nonexistent_workspace() {
    let (status, val) = request(
        app(),
        Method::POST,
        "/api/sessions",
        Some(&format!("Bearer {TOKEN}")),
        Some(json!({"engine": "shell", "workspacePath": "/no/such/directory/anywhere"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(val["error"]["code"], "invalid_workspace");
}

#[tokio::test]
async fn create_codex_session_without_binary_is_424_and_scrubbed() {
    let (status, val) = request(
        app(),
        Method::POST,
        "/api/sessions",
        Some(&format!("Bearer {TOKEN}")),
        Some(json!({"engine": "codex"})),
    )
    .await;
    assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
    let code = val["error"]["code"].as_str().unwrap_or_default();
    assert!(code == "codex_unavailable" || code == "codex_failed");
    assert!(!val["error"]["message"].as_str().unwrap_or_default().to_lowercase().contains(&format!("bearer {TOKEN}").to_lowercase()));
}

#[tokio::test]
async fn terminate_unknown_session_is_404() {
    let (status, val) = request(
        app(),
        Method::POST,
        "/api/sessions/does-not-exist/terminate",
        Some(&format!("Bearer {TOKEN}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(val["error"]["code"], "not_found");
}

#[tokio::test]
async fn ws_ticket_is_issued_and_short_lived() {
    let (status, val) = request(
        app(),
        Method::POST,
        "/api/ws-ticket",
        Some(&format!("Bearer {TOKEN}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(val["ticket"].as_str().is_some_and(|t| !t.is_empty()));
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let expires_ms = val["expires_ms"].as_u64().unwrap();
    assert!(expires_ms > now_ms && expires_ms <= now_ms + 61_000);
}

#[tokio::test]
async fn create_shell_session_then_list_then_terminate() {
    let app = app();
    let (status, created) = request(
        app.clone(),
        Method::POST,
        "/api/sessions",
        Some(&format!("Bearer {TOKEN}")),
        Some(json!({"engine": "shell", "name": "s1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["name"], "s1");

    let (status, list) = request(
        app.clone(),
        Method::GET,
        "/api/sessions",
        Some(&format!("Bearer {TOKEN}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = request(
        app.clone(),
        Method::POST,
        &format!("/api/sessions/{id}/terminate"),
        Some(&format!("Bearer {TOKEN}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, list) = request(
        app,
        Method::GET,
        "/api/sessions",
        Some(&format!("Bearer {TOKEN}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 0);
}

fn app_with_web_dir(web_dir: std::path::PathBuf) -> axum::Router {
    let log_dir = std::env::temp_dir().join(format!("rc-host-test-spa-{}", std::process::id()));
    let mut state = rc_host::app::test_state(TOKEN, log_dir);
    state.config = std::sync::Arc::new(rc_host::Config {
        bind: "127.0.0.1".to_string(),
        port: 0,
        token: TOKEN.to_string(),
        log_dir: state.config.log_dir.clone(),
        web_dir: Some(web_dir),
    });
    build_router(state)
}

#[tokio::test]
async fn spa_fallback_serves_index_for_deep_link() {
    let dir = std::env::temp_dir().join(format!("rc-host-test-webdir-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "<div id=\"root\"></div>").unwrap();

    let req = Request::builder()
        .method(Method::GET)
        .uri("/sessions/abc123")
        .header("accept", "text/html,application/xhtml+xml")
        .body(Body::empty())
        .unwrap();
    let resp = app_with_web_dir(dir).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("id=\"root\""));
}

#[tokio::test]
async fn spa_fallback_404s_for_missing_asset_with_extension() {
    let dir = std::env::temp_dir().join(format!("rc-host-test-webdir2-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "index").unwrap();

    let req = Request::builder()
        .method(Method::GET)
        .uri("/assets/missing.js")
        .header("accept", "*/*")
        .body(Body::empty())
        .unwrap();
    let resp = app_with_web_dir(dir).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_echoes_dev_ui_origin_but_not_arbitrary_origin() {
    let app = app();
    let req = Request::builder()
        .method(Method::GET)
        .uri("/healthz")
        .header("origin", "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:5173"
    );

    let req = Request::builder()
        .method(Method::GET)
        .uri("/healthz")
        .header("origin", "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn options_request_always_short_circuits_to_204() {
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/sessions/does-not-exist/terminate")
        .header("origin", "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:5173"
    );
}
