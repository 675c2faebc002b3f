//! PTY-backed engine: an interactive shell (or, via the `engine_tag`
//! parameter, a PTY fallback for another engine) attached to a pseudo-terminal
//! (spec.md §4.4).
//!
//! Reads the PTY master in bounded chunks; each chunk is appended to the byte
//! ring, written to the session log file, delivered to byte subscribers, and
//! published as an `assistant {stream:"stdout", data}` event.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::pty::{allocate_pty, spawn_shell_pty};
use super::{Engine, Session};
use crate::events::store::EventStore;
use crate::events::EventKind;
use crate::policy::engine_env;

const DEFAULT_SHELL: &str = "/bin/bash";
const READ_CHUNK: usize = 4096;
const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

/// Spawns a shell attached to a PTY and wires it into a new [`Session`]
/// tagged `engine_tag` (`"shell"` for a real shell session, `"cursor"` when
/// used as the NDJSON adapter's interactive fallback).
pub async fn spawn(
    id: String,
    name: String,
    engine_tag: &str,
    workspace: &str,
    log_dir: &Path,
) -> std::io::Result<Arc<Session>> {
    let pty = allocate_pty(DEFAULT_ROWS, DEFAULT_COLS)?;

    let mut env: HashMap<String, String> = std::env::vars().collect();
    env.insert("TERM".to_string(), "xterm-256color".to_string());
    let (sanitized, _removed) = engine_env(env);
    let sanitized_env: HashMap<String, String> = sanitized.into_iter().collect();

    let shell = std::env::var("SHELL").unwrap_or_else(|_| DEFAULT_SHELL.to_string());
    let mut child = spawn_shell_pty(&pty, &shell, workspace, Some(&sanitized_env))?;
    #[allow(clippy::cast_possible_wrap)]
    let pgid = child.id().unwrap_or(0) as i32;

    let log_path = log_dir.join(format!("{id}.log"));
    if let Some(parent) = log_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let mut log_file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(&log_path)
        .await?;

    let store = match EventStore::create(&log_dir.join("events"), &id).await {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(session_id = %id, error = %e, "failed to open event store");
            None
        }
    };

    let master_raw = pty.master.as_raw_fd();
    // SAFETY: dup() on a live fd we own; each dup becomes independently owned
    // by the reader/writer task and is closed when that task's File drops.
    let writer_fd = unsafe { libc::dup(master_raw) };
    let reader_fd = unsafe { libc::dup(master_raw) };
    if writer_fd < 0 || reader_fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let mut master_write =
        tokio::fs::File::from_std(unsafe { std::fs::File::from_raw_fd(writer_fd) });
    let mut master_read =
        tokio::fs::File::from_std(unsafe { std::fs::File::from_raw_fd(reader_fd) });

    let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(64);
    tokio::spawn(async move {
        while let Some(data) = input_rx.recv().await {
            if master_write.write_all(&data).await.is_err() {
                break;
            }
            let _ = master_write.flush().await;
        }
    });

    let session = Session::new(
        id.clone(),
        name,
        engine_tag.to_string(),
        store,
        Engine::Pty {
            input: input_tx,
            master: pty.master,
        },
        pgid,
    );

    let read_session = session.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match master_read.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = &buf[..n];
                    read_session.publish_bytes(chunk).await;
                    if let Err(e) = log_file.write_all(chunk).await {
                        warn!(session_id = %read_session.id, error = %e, "failed to write session log");
                    }
                    let text = String::from_utf8_lossy(chunk).into_owned();
                    read_session
                        .publish_event(
                            EventKind::Assistant,
                            Some(serde_json::json!({"stream": "stdout", "data": text})),
                        )
                        .await;
                }
            }
        }
        info!(session_id = %read_session.id, "PTY output closed");
    });

    let exit_session = session.clone();
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                warn!(session_id = %exit_session.id, error = %e, "wait() failed");
                -1
            }
        };
        exit_session.mark_exited(code).await;
    });

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    /// spec.md §8 S1: a shell session echoes input back as an `assistant`
    /// event within 2s.
    #[tokio::test]
    async fn echoed_input_arrives_as_assistant_event() {
        let log_dir = std::env::temp_dir().join(format!("rc-host-test-shell-{}", std::process::id()));
        let session = spawn(
            "t1".to_string(),
            "s1".to_string(),
            "shell",
            ".",
            &log_dir,
        )
        .await
        .expect("spawn shell session");

        let (_sub_id, mut rx) = session.subscribe_events().await;
        session
            .write_input(b"echo __OK__\n")
            .await
            .expect("write input");

        let found = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                let ev = rx.recv().await.expect("event channel closed early");
                if ev.kind == EventKind::Assistant {
                    let data = ev
                        .payload
                        .as_ref()
                        .and_then(|p| p.get("data"))
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("");
                    if data.contains("__OK__") {
                        return;
                    }
                }
            }
        })
        .await;

        assert!(found.is_ok(), "expected an assistant event containing __OK__ within 2s");
        session.terminate().await;
    }
}
