//! Bearer auth and single-use WebSocket tickets (spec.md §4.10).
//!
//! Two code paths share one secret:
//! - **API auth.** Required on all `/api/*` except `/healthz`. Accepts
//!   `Authorization: Bearer <token>` or raw `Authorization: <token>`.
//!   Query-string tokens are never accepted here. Empty configured token is a
//!   server misconfiguration (500); mismatch is 401.
//! - **WS auth.** Prefers the `Authorization` header; if absent, accepts
//!   `?ticket=<t>` consumed single-use against the ticket store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use rand::RngCore;
use tokio::sync::Mutex;

use crate::error::{ApiError, ErrorCode};

/// Extension type carrying the expected bearer token.
#[derive(Clone)]
pub struct ApiToken(pub String);

/// Extracts a bearer token from an `Authorization` header value, accepting
/// either `Bearer <token>` or a raw `<token>` (spec.md §8 property 6).
#[must_use]
pub fn extract_bearer(header_value: &str) -> &str {
    header_value.strip_prefix("Bearer ").unwrap_or(header_value)
}

/// Constant-time byte comparison; always iterates the full length of
/// `expected` so response timing can't reveal token length.
#[must_use]
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, &e) in expected.iter().enumerate() {
        let p = provided.get(i).copied().unwrap_or(0xff);
        diff |= e ^ p;
    }
    diff == 0
}

/// Axum middleware enforcing bearer auth on `/api/*` routes.
pub async fn require_bearer(request: Request, next: Next) -> Response {
    let Some(ApiToken(expected)) = request.extensions().get::<ApiToken>().cloned() else {
        return ApiError::new(ErrorCode::InternalError, "server misconfigured: no token").into_response();
    };
    if expected.is_empty() {
        return ApiError::new(ErrorCode::InternalError, "server misconfigured: empty token").into_response();
    }

    let provided = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(extract_bearer);

    match provided {
        Some(p) if constant_time_eq(expected.as_bytes(), p.as_bytes()) => next.run(request).await,
        _ => ApiError::new(ErrorCode::Unauthorized, "missing or invalid bearer token").into_response(),
    }
}

/// Checks WS auth per spec.md §4.10: header first, then `?ticket=`.
pub async fn check_ws_auth(
    expected_token: &str,
    auth_header: Option<&str>,
    ticket_query: Option<&str>,
    tickets: &TicketStore,
) -> bool {
    if let Some(h) = auth_header {
        return constant_time_eq(expected_token.as_bytes(), extract_bearer(h).as_bytes());
    }
    if let Some(t) = ticket_query {
        return tickets.consume(t).await;
    }
    false
}

/// TTL for issued tickets (spec.md §3): 60 seconds.
pub const TICKET_TTL: Duration = Duration::from_secs(60);

/// Single-use, short-lived WebSocket upgrade credential store.
pub struct TicketStore {
    expires: Mutex<HashMap<String, Instant>>,
}

impl TicketStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            expires: Mutex::new(HashMap::new()),
        }
    }

    /// Mints a ticket: 24 random bytes, base64url (no padding), TTL 60s.
    pub async fn issue(&self) -> (String, Instant) {
        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        let ticket = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes);
        let expires_at = Instant::now() + TICKET_TTL;
        self.expires.lock().await.insert(ticket.clone(), expires_at);
        (ticket, expires_at)
    }

    /// Validates and deletes a ticket unconditionally (single-use); returns
    /// `true` iff it existed and had not yet expired.
    pub async fn consume(&self, ticket: &str) -> bool {
        let mut map = self.expires.lock().await;
        match map.remove(ticket) {
            Some(expires_at) => Instant::now() < expires_at,
            None => false,
        }
    }
}

impl Default for TicketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_and_raw_forms_extract_same_token() {
        assert_eq!(extract_bearer("Bearer abc123"), "abc123");
        assert_eq!(extract_bearer("abc123"), "abc123");
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_length() {
        assert!(!constant_time_eq(b"secret", b"sec"));
        assert!(constant_time_eq(b"secret", b"secret"));
    }

    #[tokio::test]
    async fn ticket_single_use() {
        let store = TicketStore::new();
        let (ticket, _) = store.issue().await;
        assert!(store.consume(&ticket).await);
        assert!(!store.consume(&ticket).await);
    }

    #[tokio::test]
    async fn unknown_ticket_rejected() {
        let store = TicketStore::new();
        assert!(!store.consume("does-not-exist").await);
    }
}
