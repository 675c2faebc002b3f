//! Per-session append-only line-delimited event log on disk (the durable tail).
//!
//! File layout: `<dir>/<session_id>.jsonl`, one full [`SessionEvent`] JSON
//! object per line, mode 0600; directory mode 0700. Keeps a long-lived open
//! file handle per session (the teacher's journal-writer idiom) rather than
//! reopening on every append, but the on-disk *line format* matches the
//! pre-distillation store exactly: no metadata header, one complete event
//! per line.

use std::io::SeekFrom;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::warn;

use super::SessionEvent;

pub struct EventStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl EventStore {
    /// Creates (or opens for append) `<dir>/<session_id>.jsonl`. `dir` is
    /// created with mode 0700 if missing.
    pub async fn create(dir: &Path, session_id: &str) -> std::io::Result<Self> {
        if !dir.exists() {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(dir)?;
        }
        let path = dir.join(format!("{session_id}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Appends one marshalled event line. Failures are the caller's to log;
    /// they must never be treated as fatal to the publish path.
    pub async fn append(&self, ev: &SessionEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(ev).map_err(std::io::Error::other)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the trailing `max` well-formed events from disk. Malformed
    /// lines are skipped, not fatal. Returns an empty vec if the file is
    /// absent (not an error).
    pub async fn load_tail(dir: &Path, session_id: &str, max: usize) -> Vec<SessionEvent> {
        let path = dir.join(format!("{session_id}.jsonl"));
        let Ok(file) = File::open(&path).await else {
            return Vec::new();
        };
        let mut reader = BufReader::new(file);
        // Not strictly needed (File::open starts at 0) but documents intent
        // when this helper is reused against an already-open handle.
        let _ = reader.seek(SeekFrom::Start(0)).await;
        let mut out: Vec<SessionEvent> = Vec::new();
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<SessionEvent>(&line) {
                        Ok(ev) => {
                            out.push(ev);
                            if out.len() > max {
                                out.remove(0);
                            }
                        }
                        Err(e) => warn!("skipping malformed event line in {}: {e}", path.display()),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("error reading event tail {}: {e}", path.display());
                    break;
                }
            }
        }
        out
    }

    /// Removes the backing file. Used when a session's store is torn down
    /// explicitly; normal operation leaves history on disk.
    pub async fn remove(dir: &Path, session_id: &str) {
        let path = dir.join(format!("{session_id}.jsonl"));
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove event store {}: {e}", path.display());
            }
        }
    }
}
