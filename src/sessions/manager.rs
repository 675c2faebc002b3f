//! Session ID allocation, lookup, listing, and termination (spec.md §4.9).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::codex::CodexError;
use super::{codex, cursor, shell, Session};

/// Engine kind requested at session creation (spec.md §6's `engine` field).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineKind {
    Shell,
    Codex,
    Cursor,
}

impl EngineKind {
    /// Parses the wire value; empty string defaults to `shell`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "shell" => Some(Self::Shell),
            "codex" => Some(Self::Codex),
            "cursor" => Some(Self::Cursor),
            _ => None,
        }
    }
}

pub struct CreateRequest {
    pub engine: EngineKind,
    pub name: Option<String>,
    pub workspace: Option<PathBuf>,
    pub prompt: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("workspacePath does not exist or is not a directory")]
    InvalidWorkspace,
    #[error("codex unavailable: {0}")]
    CodexUnavailable(String),
    #[error("codex failed: {0}")]
    CodexFailed(String),
    #[error("failed to start engine: {0}")]
    Io(std::io::Error),
}

/// Maps `id -> Session`; single authority for id allocation, lookup, list,
/// and terminate.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    next_id: AtomicU64,
    log_dir: PathBuf,
}

/// Base-36 encoding of a monotonic counter, matching the pre-existing
/// session-id scheme (`strconv.FormatUint(n, 36)` in the prior
/// implementation) rather than a UUID.
fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

impl SessionManager {
    #[must_use]
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            log_dir,
        }
    }

    fn allocate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        to_base36(n)
    }

    /// Allocates an id, dispatches to the engine constructor, and registers
    /// the session for lookup. Workspace existence is validated first so a
    /// bad path never spawns a subprocess.
    pub async fn create(&self, req: CreateRequest) -> Result<Arc<Session>, CreateError> {
        if let Some(ws) = &req.workspace {
            if !ws.is_dir() {
                return Err(CreateError::InvalidWorkspace);
            }
        }

        let id = self.allocate_id();
        let name = req.name.unwrap_or_else(|| format!("session-{id}"));

        let session = match req.engine {
            EngineKind::Shell => {
                let workspace = req
                    .workspace
                    .as_deref()
                    .and_then(|p| p.to_str())
                    .unwrap_or(".")
                    .to_string();
                shell::spawn(id.clone(), name, "shell", &workspace, &self.log_dir)
                    .await
                    .map_err(CreateError::Io)?
            }
            EngineKind::Cursor => {
                let workspace = req.workspace.as_deref().and_then(|p| p.to_str());
                let prompt = req.prompt.as_deref().unwrap_or("");
                cursor::spawn(id.clone(), name, workspace, prompt, &self.log_dir)
                    .await
                    .map_err(CreateError::Io)?
            }
            EngineKind::Codex => {
                let workspace = req
                    .workspace
                    .as_deref()
                    .and_then(|p| p.to_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        std::env::current_dir()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|_| ".".to_string())
                    });
                codex::spawn(id.clone(), name, &workspace, req.prompt.as_deref(), &self.log_dir)
                    .await
                    .map_err(|e| match e {
                        CodexError::Unavailable(m) => CreateError::CodexUnavailable(m),
                        CodexError::Failed(m) => CreateError::CodexFailed(m),
                    })?
            }
        };

        self.sessions.write().await.insert(id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Removes the session before killing it, so its id is instantly
    /// unavailable to new lookups even while termination is in flight.
    /// Returns `false` if no session with that id exists.
    pub async fn terminate(&self, id: &str) -> bool {
        let session = self.sessions.write().await.remove(id);
        match session {
            Some(s) => {
                s.terminate().await;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_roundtrip_monotone() {
        assert_eq!(to_base36(1), "1");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn engine_kind_parses_empty_as_shell() {
        assert_eq!(EngineKind::parse(""), Some(EngineKind::Shell));
        assert_eq!(EngineKind::parse("bogus"), None);
    }

    #[tokio::test]
    async fn terminate_unknown_id_returns_false() {
        let manager = SessionManager::new(PathBuf::from("/tmp/rc-host-test-manager"));
        assert!(!manager.terminate("does-not-exist").await);
    }
}
