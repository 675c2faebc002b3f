//! Typed session events: the uniform record every engine adapter emits.
//!
//! An event is schemaless by design — `payload` is an opaque JSON value whose
//! shape is defined per `kind` in documentation, not in the type system (see
//! the notification mapping tables in [`crate::sessions::codex`] and
//! [`crate::sessions::cursor`]).

pub mod dedupe;
pub mod ring;
pub mod store;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The kind of a [`SessionEvent`]. Serializes to its snake_case wire form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    System,
    User,
    Assistant,
    ThinkingDelta,
    ThinkingDone,
    ToolCall,
    ToolOutput,
    Status,
    Error,
    Metrics,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::ThinkingDelta => "thinking_delta",
            Self::ThinkingDone => "thinking_done",
            Self::ToolCall => "tool_call",
            Self::ToolOutput => "tool_output",
            Self::Status => "status",
            Self::Error => "error",
            Self::Metrics => "metrics",
        }
    }
}

/// A single typed, sequenced record describing something a session did or observed.
///
/// Invariants (enforced by [`EventRing::append`](ring::EventRing::append), the
/// sole assigner of `seq`): `seq >= 1`, `ts_ms > 0`, `session_id` and `engine`
/// nonempty; `seq` is unique and strictly increasing per session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub engine: String,
    pub ts_ms: i64,
    pub seq: u64,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl SessionEvent {
    /// Builds a not-yet-published event: `seq` is zero and assigned later by
    /// the ring, `ts_ms` defaults to now if the caller doesn't stamp it.
    #[must_use]
    pub fn new(session_id: impl Into<String>, engine: impl Into<String>, kind: EventKind, payload: Option<serde_json::Value>) -> Self {
        Self {
            session_id: session_id.into(),
            engine: engine.into(),
            ts_ms: now_ms(),
            seq: 0,
            kind,
            payload,
        }
    }
}

/// Current unix time in milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
