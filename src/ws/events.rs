//! Typed event WebSocket route: `GET /ws/events/{id}` (spec.md §4.11, §4.12).
//!
//! Attach resolution order: `from_seq=S` → resident events with `seq>S`;
//! else `last_n=N` (N>0) → last N resident events; else the last 256. After
//! replay, a synthetic `status{attached}` marker is sent directly to this
//! connection (it is not published through the session's ring, so it never
//! consumes a `seq` or reaches other subscribers). Keepalive is
//! protocol-level: a WebSocket PING every 25 s, with a 90 s read deadline
//! reset only by an observed PONG.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::warn;

use crate::auth::check_ws_auth;
use crate::events::{EventKind, SessionEvent};
use crate::sessions::Session;
use crate::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(25);
const READ_DEADLINE: Duration = Duration::from_secs(90);
const DEFAULT_REPLAY: usize = 256;

#[derive(Deserialize)]
pub struct EventsQuery {
    pub from_seq: Option<u64>,
    pub last_n: Option<usize>,
    pub ticket: Option<String>,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<EventsQuery>,
    headers: HeaderMap,
) -> Response {
    let auth_header = headers.get("authorization").and_then(|v| v.to_str().ok());
    let authed =
        check_ws_auth(&state.config.token, auth_header, q.ticket.as_deref(), &state.tickets).await;
    if !authed {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    let Some(session) = state.sessions.get(&id).await else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    ws.on_upgrade(move |socket| run(socket, session, q.from_seq, q.last_n))
}

async fn run(socket: WebSocket, session: Arc<Session>, from_seq: Option<u64>, last_n: Option<usize>) {
    let (mut sink, mut stream) = socket.split();

    let replay = match (from_seq, last_n) {
        (Some(s), _) => session.replay_from_seq(s).await,
        (None, Some(n)) if n > 0 => session.replay_last_n(n).await,
        _ => session.replay_last_n(DEFAULT_REPLAY).await,
    };
    for ev in replay {
        let Ok(text) = serde_json::to_string(&ev) else {
            continue;
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }

    if session.is_closed() {
        let info = session.info().await;
        let marker = SessionEvent::new(
            &session.id,
            &session.engine,
            EventKind::Status,
            Some(serde_json::json!({"state": "exited", "exit_code": info.exit_code})),
        );
        if let Ok(text) = serde_json::to_string(&marker) {
            let _ = sink.send(Message::Text(text.into())).await;
        }
        let _ = sink.close().await;
        return;
    }

    let attached = SessionEvent::new(
        &session.id,
        &session.engine,
        EventKind::Status,
        Some(serde_json::json!({"state": "attached"})),
    );
    if let Ok(text) = serde_json::to_string(&attached) {
        if sink.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }

    let (sub_id, mut rx) = session.subscribe_events().await;
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await;
    let mut deadline = tokio::time::Instant::now() + READ_DEADLINE;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            ev = rx.recv() => {
                match ev {
                    Some(ev) => {
                        let Ok(text) = serde_json::to_string(&ev) else { continue };
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        deadline = tokio::time::Instant::now() + READ_DEADLINE;
                    }
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&session, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            () = tokio::time::sleep_until(deadline) => {
                warn!(session_id = %session.id, "read deadline elapsed without a PONG");
                break;
            }
        }
    }

    session.unsubscribe_events(sub_id).await;
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Input { data: String },
    Resize { cols: u16, rows: u16 },
    Ping {
        #[serde(default)]
        ts: Option<i64>,
    },
}

/// Unknown types and unparseable frames are ignored (spec.md §4.11).
async fn handle_client_frame(session: &Arc<Session>, text: &str) {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(text) else {
        return;
    };
    match frame {
        ClientFrame::Input { data } => {
            let _ = session.write_input(data.as_bytes()).await;
        }
        ClientFrame::Resize { cols, rows } => {
            let _ = session.resize(cols, rows);
        }
        ClientFrame::Ping { .. } => {}
    }
}
