//! Line-delimited JSON-RPC 2.0 client over a child process's stdio.
//!
//! One JSON object per line on stdin/stdout. Request ids are monotonically
//! increasing integers allocated by this client; a single-slot delivery
//! channel is registered per outbound id, and the read loop dispatches
//! responses by id while forwarding notifications (messages with `method`
//! and no `id`) to a registered handler. Inbound requests (both `id` and
//! `method` set) are declined with error `-32601` since this client never
//! implements server-side methods. Ids are decoded as either an integer or a
//! numeric string, matching what the Codex app-server emits.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::warn;

#[derive(Debug, Clone, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorWire {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorWire>,
}

/// Error starting or talking to the child process itself (not an RPC-level
/// `error` reply). Distinguished from [`RpcError`] so callers can classify
/// "engine unavailable" vs. "engine reported a failure" per spec.md §9.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to spawn: {0}")]
    Spawn(std::io::Error),
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error(transparent)]
    Rpc(RpcError),
    #[error("call cancelled")]
    Cancelled,
}

type NotificationHandler = Box<dyn Fn(&str, Option<Value>) + Send + Sync>;

struct Pending {
    next_id: AtomicI64,
    waiters: Mutex<HashMap<i64, oneshot::Sender<Result<Value, RpcError>>>>,
}

/// A JSON-RPC line client wrapping a spawned child process.
pub struct Client {
    child: Mutex<Child>,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: Arc<Pending>,
    notif_handler: Arc<Mutex<Option<NotificationHandler>>>,
}

impl Client {
    /// Spawns `program args...` with the given environment, wiring stdin/
    /// stdout/stderr as pipes, and starts the background read loop plus a
    /// stderr drain task.
    pub fn start(
        program: &str,
        args: &[&str],
        env: Option<Vec<(String, String)>>,
    ) -> Result<Self, std::io::Error> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(vars) = env {
            cmd.env_clear();
            cmd.envs(vars);
        }
        let mut child = cmd.spawn()?;
        let stdin = Arc::new(Mutex::new(child.stdin.take().expect("piped stdin")));
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let pending = Arc::new(Pending {
            next_id: AtomicI64::new(0),
            waiters: Mutex::new(HashMap::new()),
        });
        let notif_handler: Arc<Mutex<Option<NotificationHandler>>> = Arc::new(Mutex::new(None));

        let read_pending = pending.clone();
        let read_notif = notif_handler.clone();
        let read_stdin = stdin.clone();
        tokio::spawn(async move {
            read_loop(stdout, read_pending, read_notif, read_stdin).await;
        });
        tokio::spawn(async move {
            drain_stderr(stderr).await;
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin,
            pending,
            notif_handler,
        })
    }

    /// Registers the handler invoked for each inbound notification
    /// (messages with `method` set and no `id`).
    pub async fn set_notification_handler<F>(&self, handler: F)
    where
        F: Fn(&str, Option<Value>) + Send + Sync + 'static,
    {
        *self.notif_handler.lock().await = Some(Box::new(handler));
    }

    /// Sends `method(params)` and waits for the matching response, or for
    /// `timeout` to elapse.
    pub async fn call<P: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: &P,
        timeout: std::time::Duration,
    ) -> Result<R, ClientError> {
        let id = self.pending.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.waiters.lock().await.insert(id, tx);

        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = serde_json::to_vec(&req).map_err(|e| {
            ClientError::Io(std::io::Error::other(e))
        })?;
        line.push(b'\n');

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(&line).await {
                self.pending.waiters.lock().await.remove(&id);
                return Err(ClientError::Io(e));
            }
        }

        let result = tokio::time::timeout(timeout, rx).await;
        match result {
            Err(_) => {
                self.pending.waiters.lock().await.remove(&id);
                Err(ClientError::Cancelled)
            }
            Ok(Err(_)) => Err(ClientError::Cancelled),
            Ok(Ok(Err(rpc_err))) => Err(ClientError::Rpc(rpc_err)),
            Ok(Ok(Ok(value))) => {
                serde_json::from_value(value).map_err(|e| ClientError::Io(std::io::Error::other(e)))
            }
        }
    }

    /// Waits for the child process to exit.
    pub async fn wait(&self) -> std::io::Result<std::process::ExitStatus> {
        self.child.lock().await.wait().await
    }
}

async fn read_loop(
    stdout: tokio::process::ChildStdout,
    pending: Arc<Pending>,
    notif_handler: Arc<Mutex<Option<NotificationHandler>>>,
    stdin: Arc<Mutex<ChildStdin>>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => {
                warn!("rpc read error: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let msg: Message = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(_) => continue,
        };

        if let (Some(id), Some(_method)) = (msg.id.clone(), msg.method.as_ref()) {
            decline_unsupported_request(&stdin, id).await;
            continue;
        }

        if let Some(method) = msg.method {
            if msg.id.is_none() {
                let handler = notif_handler.lock().await;
                if let Some(f) = handler.as_ref() {
                    f(&method, msg.params);
                }
            }
            continue;
        }

        if let Some(id_value) = msg.id {
            let Some(id) = parse_id(&id_value) else {
                continue;
            };
            let mut waiters = pending.waiters.lock().await;
            if let Some(tx) = waiters.remove(&id) {
                let outcome = if let Some(err) = msg.error {
                    Err(RpcError {
                        code: err.code,
                        message: err.message,
                        data: err.data,
                    })
                } else {
                    Ok(msg.result.unwrap_or(Value::Null))
                };
                let _ = tx.send(outcome);
            }
        }
    }
}

async fn decline_unsupported_request(stdin: &Arc<Mutex<ChildStdin>>, id: Value) {
    let resp = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": -32601, "message": "method not implemented by client"},
    });
    let Ok(mut line) = serde_json::to_vec(&resp) else {
        return;
    };
    line.push(b'\n');
    let mut stdin = stdin.lock().await;
    let _ = stdin.write_all(&line).await;
}

fn parse_id(raw: &Value) -> Option<i64> {
    if let Some(n) = raw.as_i64() {
        return Some(n);
    }
    raw.as_str()?.parse::<i64>().ok()
}

async fn drain_stderr(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(_)) = lines.next_line().await {
        // Discarded: engine stderr is not part of the event stream.
    }
}
