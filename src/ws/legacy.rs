//! Legacy byte-stream WebSocket route: `GET /ws/sessions/{id}` (spec.md §6).
//!
//! Replays the raw PTY scrollback from the byte ring on attach, then streams
//! subsequent chunks as `{type:"output", stream:"stdout", data}` frames.
//! Client `input`/`resize` frames are forwarded to the session exactly like
//! the typed event socket; a client `ping` frame gets an application-level
//! `pong` reply in addition to the shared protocol-level PING/PONG keepalive
//! (spec.md §9 standardizes on the latter — the former is just a shape this
//! older wire protocol happens to also carry).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::auth::check_ws_auth;
use crate::sessions::byte_ring::DEFAULT_SIZE;
use crate::sessions::Session;
use crate::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(25);
const READ_DEADLINE: Duration = Duration::from_secs(90);

#[derive(Deserialize)]
pub struct SessionsQuery {
    pub ticket: Option<String>,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<SessionsQuery>,
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
    ws.on_upgrade(move |socket| run(socket, session))
}

async fn run(socket: WebSocket, session: Arc<Session>) {
    let (mut sink, mut stream) = socket.split();

    let snapshot = session.byte_snapshot(DEFAULT_SIZE).await;
    let replay_text = String::from_utf8_lossy(&snapshot).into_owned();
    let replay_msg = json!({"type": "replay", "data": replay_text}).to_string();
    if sink.send(Message::Text(replay_msg.into())).await.is_err() {
        return;
    }

    if session.is_closed() {
        let info = session.info().await;
        let status = json!({"type": "status", "state": "exited", "code": info.exit_code}).to_string();
        let _ = sink.send(Message::Text(status.into())).await;
        let _ = sink.close().await;
        return;
    }

    let status = json!({"type": "status", "state": "attached"}).to_string();
    if sink.send(Message::Text(status.into())).await.is_err() {
        return;
    }

    let (sub_id, mut rx) = session.subscribe_bytes().await;
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
            chunk = rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        let data = String::from_utf8_lossy(&bytes).into_owned();
                        let msg = json!({"type": "output", "stream": "stdout", "data": data}).to_string();
                        if sink.send(Message::Text(msg.into())).await.is_err() {
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
                        if let Some(reply) = handle_client_frame(&session, &text).await {
                            if sink.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
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

    session.unsubscribe_bytes(sub_id).await;
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
async fn handle_client_frame(session: &Arc<Session>, text: &str) -> Option<String> {
    let frame: ClientFrame = serde_json::from_str(text).ok()?;
    match frame {
        ClientFrame::Input { data } => {
            let _ = session.write_input(data.as_bytes()).await;
            None
        }
        ClientFrame::Resize { cols, rows } => {
            let _ = session.resize(cols, rows);
            None
        }
        ClientFrame::Ping { ts } => Some(json!({"type": "pong", "ts": ts}).to_string()),
    }
}
