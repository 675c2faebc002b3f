//! NDJSON streaming engine adapter for Cursor, with PTY fallback (spec.md §4.7).
//!
//! Binary precedence: `cursor agent` as a subcommand first, then a standalone
//! `agent` binary. If neither can be spawned, falls back to a shell-PTY
//! session labelled `cursor` so the session is still usable interactively.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::warn;

use super::shell;
use super::{Engine, Session};
use crate::engines::find_on_path;
use crate::events::dedupe::{DedupeOptions, Deduper};
use crate::events::store::EventStore;
use crate::events::{EventKind, SessionEvent};
use crate::policy::engine_env;

enum Binary {
    CursorSubcommand,
    Agent,
}

fn detect() -> Option<Binary> {
    if find_on_path("cursor") {
        Some(Binary::CursorSubcommand)
    } else if find_on_path("agent") {
        Some(Binary::Agent)
    } else {
        None
    }
}

fn build_command(bin: Binary, prompt: &str, workspace: Option<&str>, env: HashMap<String, String>) -> Command {
    let mut cmd = match bin {
        Binary::CursorSubcommand => {
            let mut c = Command::new("cursor");
            c.arg("agent");
            c
        }
        Binary::Agent => Command::new("agent"),
    };
    cmd.args(["--print", "--output-format", "stream-json", "--stream-partial-output", prompt]);
    if let Some(ws) = workspace {
        cmd.current_dir(ws);
    }
    cmd.env_clear().envs(env);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawns the NDJSON session, falling back to a PTY shell labelled `cursor`
/// if the streaming CLI cannot be started.
pub async fn spawn(
    id: String,
    name: String,
    workspace: Option<&str>,
    prompt: &str,
    log_dir: &Path,
) -> std::io::Result<Arc<Session>> {
    let Some(bin) = detect() else {
        warn!(session_id = %id, "no cursor binary on PATH, falling back to shell PTY");
        return shell::spawn(id, name, "cursor", workspace.unwrap_or("."), log_dir).await;
    };

    let env: HashMap<String, String> = std::env::vars().collect();
    let (sanitized, _removed) = engine_env(env);
    let sanitized_env: HashMap<String, String> = sanitized.into_iter().collect();

    let mut cmd = build_command(bin, prompt, workspace, sanitized_env);
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            warn!(session_id = %id, error = %e, "failed to spawn cursor NDJSON process, falling back to shell PTY");
            return shell::spawn(id, name, "cursor", workspace.unwrap_or("."), log_dir).await;
        }
    };

    #[allow(clippy::cast_possible_wrap)]
    let pgid = child.id().unwrap_or(0) as i32;
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let store = match EventStore::create(&log_dir.join("events"), &id).await {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(session_id = %id, error = %e, "failed to open event store");
            None
        }
    };

    let session = Session::new(
        id.clone(),
        name,
        "cursor".to_string(),
        store,
        Engine::Ndjson { input: None },
        pgid,
    );

    let stdout_session = session.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let mut dedup = Deduper::new(
            crate::events::dedupe::DEFAULT_CAPACITY,
            DedupeOptions { include_timestamp_ms: false },
        );
        loop {
            match lines.next_line().await {
                Ok(Some(raw)) => {
                    let line = raw.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match classify(line) {
                        ParsedRow::ThinkingDelta(delta) => {
                            stdout_session
                                .publish_event(EventKind::ThinkingDelta, Some(serde_json::json!({"delta": delta})))
                                .await;
                        }
                        ParsedRow::ThinkingDone => {
                            stdout_session
                                .publish_event(EventKind::ThinkingDone, Some(serde_json::json!({})))
                                .await;
                        }
                        ParsedRow::Assistant(text) => {
                            let candidate = SessionEvent::new(&stdout_session.id, "cursor", EventKind::Assistant, Some(serde_json::json!({"data": text})));
                            if !dedup.seen(&candidate) {
                                stdout_session.publish_bytes(text.as_bytes()).await;
                                stdout_session
                                    .publish_event(EventKind::Assistant, Some(serde_json::json!({"data": text})))
                                    .await;
                            }
                        }
                        ParsedRow::None => {}
                        ParsedRow::Invalid => {
                            stdout_session
                                .publish_event(EventKind::Error, Some(serde_json::json!({"message": "invalid NDJSON line"})))
                                .await;
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
    });

    let stderr_session = session.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(raw)) = lines.next_line().await {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            stderr_session
                .publish_event(EventKind::Error, Some(serde_json::json!({"message": line})))
                .await;
        }
    });

    let exit_session = session.clone();
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(_) => -1,
        };
        exit_session.mark_exited(code).await;
    });

    Ok(session)
}

enum ParsedRow {
    ThinkingDelta(String),
    ThinkingDone,
    Assistant(String),
    None,
    Invalid,
}

fn classify(line: &str) -> ParsedRow {
    let Ok(v) = serde_json::from_str::<Value>(line) else {
        return ParsedRow::Invalid;
    };
    let ty = v.get("type").and_then(Value::as_str).unwrap_or("");
    match ty {
        "thinking" => {
            let subtype = v.get("subtype").and_then(Value::as_str).unwrap_or("");
            match subtype {
                "delta" => {
                    let text = v.get("text").and_then(Value::as_str).unwrap_or("");
                    if text.is_empty() {
                        ParsedRow::None
                    } else {
                        ParsedRow::ThinkingDelta(text.to_string())
                    }
                }
                "completed" => ParsedRow::ThinkingDone,
                _ => ParsedRow::None,
            }
        }
        "assistant" => {
            let text = v
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .collect::<String>()
                })
                .unwrap_or_default();
            if text.is_empty() {
                ParsedRow::None
            } else {
                ParsedRow::Assistant(text)
            }
        }
        _ => ParsedRow::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_assistant_text() {
        let line = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"hello"}]}}"#;
        match classify(line) {
            ParsedRow::Assistant(text) => assert_eq!(text, "hello"),
            _ => panic!("expected assistant row"),
        }
    }

    #[test]
    fn classifies_thinking_delta() {
        let line = r#"{"type":"thinking","subtype":"delta","text":"reasoning..."}"#;
        match classify(line) {
            ParsedRow::ThinkingDelta(t) => assert_eq!(t, "reasoning..."),
            _ => panic!("expected thinking delta"),
        }
    }

    #[test]
    fn unparseable_line_is_invalid() {
        matches!(classify("not json"), ParsedRow::Invalid);
    }
}
