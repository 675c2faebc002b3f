//! Structured JSON error envelope, stable error codes, and secret redaction
//! (spec.md §4.13, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::RngCore;
use serde::Serialize;

/// Stable snake_case error codes (spec.md §7). Not type names — a single
/// catch-all envelope carries one of these in `error.code`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    InvalidEngine,
    InvalidWorkspace,
    CodexUnavailable,
    CodexFailed,
    NotFound,
    Unauthorized,
    InternalError,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::InvalidEngine => "invalid_engine",
            Self::InvalidWorkspace => "invalid_workspace",
            Self::CodexUnavailable => "codex_unavailable",
            Self::CodexFailed => "codex_failed",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::InternalError => "internal_error",
        }
    }

    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest | Self::InvalidEngine | Self::InvalidWorkspace => StatusCode::BAD_REQUEST,
            Self::CodexUnavailable | Self::CodexFailed => StatusCode::FAILED_DEPENDENCY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorPayload {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

/// An API error ready to be turned into an HTTP response.
pub struct ApiError {
    code: ErrorCode,
    message: String,
    hint: Option<String>,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = ErrorEnvelope {
            error: ErrorPayload {
                code: self.code.as_str(),
                message: sanitize(&self.message),
                hint: self.hint.as_deref().map(sanitize),
                request_id: new_request_id(),
            },
        };
        (self.code.status(), Json(payload)).into_response()
    }
}

/// 8 random bytes, hex-encoded, minted fresh per error response.
#[must_use]
pub fn new_request_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex(&bytes)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

static RE_BEARER: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"(?i)\bAuthorization:\s*Bearer\s+[A-Za-z0-9._-]{6,}").unwrap()
});
static RE_TOKEN_QUERY: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r#"(?i)([?&](token|ticket|access_token|refresh_token)=)[^&\s"]+"#).unwrap()
});
static RE_JSON_FIELD: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r#"(?i)("?(access_token|refresh_token)"?\s*:\s*")[^"]+"#).unwrap()
});

/// Masks bearer tokens, `?token=`/`?ticket=`/`?access_token=`/`?refresh_token=`
/// query parameters, and `"access_token"`/`"refresh_token"` JSON fields with
/// `REDACTED`. Ported from the pre-distillation scrubber's regex set.
#[must_use]
pub fn sanitize(input: &str) -> String {
    let out = RE_BEARER.replace_all(input, "Authorization: Bearer REDACTED");
    let out = RE_TOKEN_QUERY.replace_all(&out, "${1}REDACTED");
    RE_JSON_FIELD.replace_all(&out, "${1}REDACTED").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_bearer_header() {
        let s = "failed request: Authorization: Bearer abc123.def-456 to upstream";
        let r = sanitize(s);
        assert!(r.contains("Authorization: Bearer REDACTED"));
        assert!(!r.contains("abc123"));
    }

    #[test]
    fn redacts_query_token() {
        let s = "GET /ws/events/1?token=supersecret&foo=bar";
        let r = sanitize(s);
        assert!(r.contains("token=REDACTED"));
        assert!(!r.contains("supersecret"));
        assert!(r.contains("foo=bar"));
    }

    #[test]
    fn redacts_json_access_token_field() {
        let s = r#"{"access_token":"abcd1234","ok":true}"#;
        let r = sanitize(s);
        assert!(r.contains("\"access_token\":\"REDACTED\""));
        assert!(!r.contains("abcd1234"));
    }

    #[test]
    fn error_response_never_leaks_request_token() {
        let err = ApiError::new(ErrorCode::Unauthorized, "rejected ?token=leaked-secret-value");
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
