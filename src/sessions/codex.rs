//! Codex JSON-RPC engine adapter: `initialize` → `thread/start` → optional
//! `turn/start`, with notification-to-event mapping (spec.md §4.6).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::warn;

use super::{Engine, Session};
use crate::events::store::EventStore;
use crate::events::EventKind;
use crate::policy::engine_env;
use crate::rpc::{Client, ClientError};

const INIT_TIMEOUT: Duration = Duration::from_secs(10);
const TURN_TIMEOUT: Duration = Duration::from_secs(60);

/// Distinguishes "binary missing / client refused to start" from "RPC error
/// during init or thread-start", per spec.md §9's closed-enum guidance —
/// callers map this to `codex_unavailable` vs. `codex_failed`.
#[derive(Debug, thiserror::Error)]
pub enum CodexError {
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

pub async fn spawn(
    id: String,
    name: String,
    workspace: &str,
    prompt: Option<&str>,
    log_dir: &Path,
) -> Result<Arc<Session>, CodexError> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let (sanitized, _removed) = engine_env(env);

    let client = Client::start("codex", &["app-server", "--listen", "stdio://"], Some(sanitized))
        .map_err(|e| CodexError::Unavailable(format!("failed to spawn codex: {e}")))?;
    let client = Arc::new(client);

    let init_params = json!({
        "clientInfo": {"name": "rc-host", "version": env!("CARGO_PKG_VERSION")},
        "capabilities": {"experimentalApi": true},
    });
    client
        .call::<_, Value>("initialize", &init_params, INIT_TIMEOUT)
        .await
        .map_err(|e| classify_startup_error("initialize", e))?;

    let thread_params = json!({
        "approvalPolicy": "never",
        "cwd": workspace,
        "sandbox": "workspace-write",
    });
    let thread: Value = client
        .call("thread/start", &thread_params, INIT_TIMEOUT)
        .await
        .map_err(|e| classify_startup_error("thread/start", e))?;
    let thread_id = thread
        .get("thread")
        .and_then(|t| t.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default();
    if thread_id.is_empty() {
        return Err(CodexError::Failed("thread/start returned empty thread id".to_string()));
    }

    let store = match EventStore::create(&log_dir.join("events"), &id).await {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(session_id = %id, error = %e, "failed to open event store");
            None
        }
    };

    let session = Session::new(id.clone(), name, "codex".to_string(), store, Engine::Rpc, 0);

    let notif_session = session.clone();
    client
        .set_notification_handler(move |method, params| {
            let session = notif_session.clone();
            let method = method.to_string();
            tokio::spawn(async move {
                handle_notification(&session, &method, params).await;
            });
        })
        .await;

    if let Some(prompt) = prompt {
        let turn_params = json!({
            "threadId": thread_id,
            "input": [{"type": "text", "text": prompt}],
        });
        let turn_client = client.clone();
        tokio::spawn(async move {
            let _: Result<Value, ClientError> =
                turn_client.call("turn/start", &turn_params, TURN_TIMEOUT).await;
        });
    }

    let wait_session = session.clone();
    let wait_client = client.clone();
    tokio::spawn(async move {
        let code = match wait_client.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(_) => -1,
        };
        wait_session.mark_exited(code).await;
    });

    Ok(session)
}

fn classify_startup_error(step: &str, err: ClientError) -> CodexError {
    match err {
        ClientError::Spawn(e) => CodexError::Unavailable(format!("{step} failed to start: {e}")),
        ClientError::Io(e) => CodexError::Failed(format!("{step} io error: {e}")),
        ClientError::Rpc(e) => CodexError::Failed(format!("{step} rejected: {e}")),
        ClientError::Cancelled => CodexError::Failed(format!("{step} timed out")),
    }
}

async fn handle_notification(session: &Arc<Session>, method: &str, params: Option<Value>) {
    match method {
        "item/agentMessage/delta" => {
            let delta = params.as_ref().and_then(|p| p.get("delta")).and_then(Value::as_str).unwrap_or("");
            if !delta.is_empty() {
                session.publish_event(EventKind::Assistant, Some(json!({"data": delta}))).await;
            }
        }
        "item/reasoning/textDelta" => {
            let delta = params.as_ref().and_then(|p| p.get("delta")).and_then(Value::as_str).unwrap_or("");
            if !delta.is_empty() {
                session.publish_event(EventKind::ThinkingDelta, Some(json!({"delta": delta}))).await;
            }
        }
        "item/completed" => {
            let is_agent_message = params
                .as_ref()
                .and_then(|p| p.get("item"))
                .and_then(|item| item.get("type"))
                .and_then(Value::as_str)
                == Some("agentMessage");
            if is_agent_message {
                let text = params
                    .as_ref()
                    .and_then(|p| p.get("item"))
                    .and_then(|item| item.get("content"))
                    .and_then(Value::as_array)
                    .map(|parts| {
                        parts
                            .iter()
                            .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                            .filter_map(|part| part.get("text").and_then(Value::as_str))
                            .collect::<String>()
                    })
                    .unwrap_or_default();
                if !text.is_empty() {
                    session.publish_event(EventKind::Assistant, Some(json!({"data": text}))).await;
                }
            }
        }
        "turn/completed" => {
            session.publish_event(EventKind::ThinkingDone, Some(json!({}))).await;
        }
        "error" => {
            let message = params
                .as_ref()
                .and_then(|p| p.get("error"))
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("");
            if !message.is_empty() {
                session.publish_event(EventKind::Error, Some(json!({"message": message}))).await;
            }
        }
        _ => {}
    }
}
