//! Router assembly, factored out of `main` so integration tests can build
//! the same app in-process (spec.md §8: `tower::ServiceExt::oneshot`).

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Router};
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::auth::{require_bearer, ApiToken};
use crate::{routes, ws, AppState};

/// Builds the full router for one [`AppState`]: public `/healthz`, the
/// bearer-gated `/api/*` surface, the two WebSocket upgrade routes, an
/// optional static SPA fallback, and the CORS/tracing layers.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new().route("/healthz", get(routes::health::healthz));

    let authed_routes = Router::new()
        .route("/api/engines", get(routes::engines::list))
        .route(
            "/api/sessions",
            get(routes::sessions::list).post(routes::sessions::create),
        )
        .route("/api/sessions/{id}/terminate", post(routes::sessions::terminate))
        .route("/api/ws-ticket", post(routes::ws_ticket::issue))
        .layer(middleware::from_fn(require_bearer));

    let ws_routes = Router::new()
        .route("/ws/events/{id}", get(ws::events::upgrade))
        .route("/ws/sessions/{id}", get(ws::legacy::upgrade));

    let app = Router::new()
        .merge(public_routes)
        .merge(authed_routes)
        .merge(ws_routes)
        .layer(Extension(ApiToken(state.config.token.clone())))
        .fallback(spa_fallback)
        .with_state(state);

    app.layer(middleware::from_fn(short_circuit_options))
        .layer(build_cors())
        .layer(TraceLayer::new_for_http())
}

/// Every `OPTIONS` request short-circuits with a bare `204`, before it can
/// reach `spa_fallback` or any route — spec.md §4.10/§4.11 and the
/// pre-distillation `cors.go`'s `corsMiddleware` both treat `OPTIONS` as a
/// dedicated case, never routed, with CORS headers from [`build_cors`]
/// layered on around this response.
async fn short_circuit_options(req: Request, next: middleware::Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    next.run(req).await
}

/// Static SPA fallback (spec.md §9 supplemental decision, §8 property 12):
/// serves an existing file from `--web-dir` if present; otherwise, for a
/// GET/HEAD request with no extension whose `Accept` contains `text/html`
/// (or omits `Accept` entirely), serves `index.html` as a history-API deep
/// link; any other miss — including a missing asset that *does* have an
/// extension — is a plain 404. A no-op 404 when `--web-dir` wasn't set.
async fn spa_fallback(State(state): State<AppState>, req: Request) -> Response {
    let Some(web_dir) = state.config.web_dir.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let accepts_html = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_none_or(|a| a.is_empty() || a.to_lowercase().contains("text/html"));

    match ServeDir::new(&web_dir).oneshot(req).await {
        Ok(res) if res.status() != StatusCode::NOT_FOUND => res.into_response(),
        _ => {
            let has_extension = Path::new(&path).extension().is_some();
            let is_navigation = matches!(method, Method::GET | Method::HEAD);
            if is_navigation && !has_extension && accepts_html {
                let index_req = Request::builder()
                    .method(Method::GET)
                    .uri("/")
                    .body(Body::empty())
                    .expect("valid index.html request");
                match ServeFile::new(web_dir.join("index.html")).oneshot(index_req).await {
                    Ok(res) => res.into_response(),
                    Err(_) => StatusCode::NOT_FOUND.into_response(),
                }
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
    }
}

/// CORS policy (spec.md §4.10): echo `Origin` only when it matches the
/// request's own `Host` or is a `http://127.0.0.1:*`/`http://localhost:*`
/// dev-UI origin; `GET,POST,OPTIONS` only; `Authorization, Content-Type` only.
#[must_use]
pub fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            |origin: &HeaderValue, parts: &axum::http::request::Parts| {
                let Ok(origin_str) = origin.to_str() else {
                    return false;
                };
                if is_dev_ui_origin(origin_str) {
                    return true;
                }
                matches_request_host(origin_str, parts)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
}

fn is_dev_ui_origin(origin: &str) -> bool {
    origin.starts_with("http://127.0.0.1:")
        || origin == "http://127.0.0.1"
        || origin.starts_with("http://localhost:")
        || origin == "http://localhost"
}

fn matches_request_host(origin: &str, parts: &axum::http::request::Parts) -> bool {
    let Some(host) = parts.headers.get(axum::http::header::HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };
    let origin_host = origin.split("://").nth(1).unwrap_or(origin);
    origin_host == host
}

/// Convenience constructor used by tests: a fresh [`AppState`] rooted at
/// `log_dir` with the given token and no static web UI.
#[must_use]
pub fn test_state(token: impl Into<String>, log_dir: std::path::PathBuf) -> AppState {
    AppState {
        config: Arc::new(crate::Config {
            bind: "127.0.0.1".to_string(),
            port: 0,
            token: token.into(),
            log_dir: log_dir.clone(),
            web_dir: None,
        }),
        start_time: std::time::Instant::now(),
        sessions: Arc::new(crate::SessionManager::new(log_dir)),
        tickets: Arc::new(crate::auth::TicketStore::new()),
    }
}
