//! Session object: the fan-out core owning one engine instance, its ring
//! buffers, subscriber sets, and lifecycle state (spec.md §4.8).
//!
//! `publish_event` is the sole entry point for typed events: it assigns a
//! sequence number via the ring, persists the line if a store is configured,
//! and fans the event out to subscribers without holding any lock during the
//! sends — a slow subscriber drops events rather than stalling the producer
//! or its peers.

pub mod byte_ring;
pub mod codex;
pub mod cursor;
pub mod manager;
pub mod pty;
pub mod shell;

use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use byte_ring::ByteRing;
use crate::events::ring::EventRing;
use crate::events::store::EventStore;
use crate::events::{EventKind, SessionEvent};

/// Buffered channel capacity for a single event subscriber (spec.md §4.8).
pub const EVENT_SUB_CAPACITY: usize = 256;
/// Buffered channel capacity for a single byte subscriber.
pub const BYTE_SUB_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    Exited,
}

/// Error returned by operations on a session that has already transitioned
/// to `exited`, or that hit an I/O failure forwarding to the engine.
#[derive(Debug)]
pub enum SessionError {
    Closed,
    Io(std::io::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "session is closed"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// How a session forwards `write_input`/`resize` to its underlying engine.
pub enum Engine {
    /// Interactive shell attached to a PTY. `master` is kept alive for
    /// terminal resize; the actual read/write streams are separately
    /// duplicated file descriptors owned by background tasks.
    Pty {
        input: mpsc::Sender<Vec<u8>>,
        master: OwnedFd,
    },
    /// Codex JSON-RPC engine, driven entirely by structured calls made at
    /// construction time and by notification handling; there is no generic
    /// byte-input path, so `write_input` always fails for these sessions.
    Rpc,
    /// Cursor NDJSON engine. `input` is `None` for the one-shot streaming
    /// CLI (no interactive stdin path); the PTY fallback instead constructs
    /// a `Pty` engine labelled with the `cursor` tag.
    Ndjson { input: Option<mpsc::Sender<Vec<u8>>> },
}

/// A running engine subprocess plus its event/byte history and subscribers.
pub struct Session {
    pub id: String,
    pub name: String,
    pub engine: String,
    pub created: SystemTime,
    state: Mutex<SessionState>,
    exit_code: Mutex<Option<i32>>,
    closed: AtomicBool,
    ring: EventRing,
    byte_ring: ByteRing,
    store: Option<EventStore>,
    event_subs: Mutex<HashMap<u64, mpsc::Sender<SessionEvent>>>,
    byte_subs: Mutex<HashMap<u64, mpsc::Sender<Vec<u8>>>>,
    next_sub_id: AtomicU64,
    pgid: i32,
    io: Engine,
}

impl Session {
    #[must_use]
    pub fn new(
        id: String,
        name: String,
        engine: String,
        store: Option<EventStore>,
        io: Engine,
        pgid: i32,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name,
            engine,
            created: SystemTime::now(),
            state: Mutex::new(SessionState::Running),
            exit_code: Mutex::new(None),
            closed: AtomicBool::new(false),
            ring: EventRing::new(crate::events::ring::DEFAULT_CAPACITY),
            byte_ring: ByteRing::new(byte_ring::DEFAULT_SIZE),
            store,
            event_subs: Mutex::new(HashMap::new()),
            byte_subs: Mutex::new(HashMap::new()),
            next_sub_id: AtomicU64::new(1),
            pgid,
            io,
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Assigns a seq, persists, and fans out to subscribers. Never blocks on
    /// a subscriber; persistence failures are logged and never propagate.
    pub async fn publish_event(
        &self,
        kind: EventKind,
        payload: Option<serde_json::Value>,
    ) -> SessionEvent {
        let ev = SessionEvent::new(&self.id, &self.engine, kind, payload);
        let published = self.ring.append(ev).await;

        if let Some(store) = &self.store {
            if let Err(e) = store.append(&published).await {
                warn!(session_id = %self.id, error = %e, "failed to persist event");
            }
        }

        let subs: Vec<mpsc::Sender<SessionEvent>> =
            self.event_subs.lock().await.values().cloned().collect();
        for tx in subs {
            let _ = tx.try_send(published.clone());
        }
        published
    }

    /// Appends to the byte scrollback and fans raw bytes out to byte
    /// subscribers. Used by the PTY engine and mirrored by the NDJSON
    /// adapter's deduplicated assistant text.
    pub async fn publish_bytes(&self, data: &[u8]) {
        self.byte_ring.write(data).await;
        let subs: Vec<mpsc::Sender<Vec<u8>>> =
            self.byte_subs.lock().await.values().cloned().collect();
        for tx in subs {
            let _ = tx.try_send(data.to_vec());
        }
    }

    /// Forwards to the engine (PTY write or adapter stdin); on success
    /// publishes a `user` event carrying the bytes as text.
    pub async fn write_input(&self, data: &[u8]) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let sent = match &self.io {
            Engine::Pty { input, .. } => input.send(data.to_vec()).await.is_ok(),
            Engine::Ndjson { input: Some(tx) } => tx.send(data.to_vec()).await.is_ok(),
            Engine::Ndjson { input: None } | Engine::Rpc => false,
        };
        if !sent {
            return Err(SessionError::Closed);
        }
        self.publish_event(
            EventKind::User,
            Some(serde_json::json!({"data": String::from_utf8_lossy(data)})),
        )
        .await;
        Ok(())
    }

    /// Forwards to the PTY if one exists, otherwise a no-op.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), SessionError> {
        match &self.io {
            Engine::Pty { master, .. } => {
                pty::resize_pty(master, rows, cols).map_err(|e| SessionError::Io(std::io::Error::other(e)))
            }
            Engine::Rpc | Engine::Ndjson { .. } => Ok(()),
        }
    }

    /// Registers a new event subscriber. If the session is already closed,
    /// the sender is dropped immediately so the receiver observes a closed
    /// channel right away.
    pub async fn subscribe_events(&self) -> (u64, mpsc::Receiver<SessionEvent>) {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(EVENT_SUB_CAPACITY);
        if self.is_closed() {
            drop(tx);
        } else {
            self.event_subs.lock().await.insert(id, tx);
        }
        (id, rx)
    }

    pub async fn unsubscribe_events(&self, id: u64) {
        self.event_subs.lock().await.remove(&id);
    }

    pub async fn subscribe_bytes(&self) -> (u64, mpsc::Receiver<Vec<u8>>) {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(BYTE_SUB_CAPACITY);
        if self.is_closed() {
            drop(tx);
        } else {
            self.byte_subs.lock().await.insert(id, tx);
        }
        (id, rx)
    }

    pub async fn unsubscribe_bytes(&self, id: u64) {
        self.byte_subs.lock().await.remove(&id);
    }

    /// Transitions to `exited`, publishes the terminal status event, and
    /// closes every subscriber channel exactly once. Called by the
    /// wait-for-exit task; not meant to be called directly by API handlers
    /// (use [`Session::terminate`] to kill the child first).
    pub async fn mark_exited(&self, exit_code: i32) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock().await = SessionState::Exited;
        *self.exit_code.lock().await = Some(exit_code);
        self.publish_event(
            EventKind::Status,
            Some(serde_json::json!({"state": "exited", "exit_code": exit_code})),
        )
        .await;
        self.event_subs.lock().await.clear();
        self.byte_subs.lock().await.clear();
    }

    /// Kills the child (process group, SIGTERM then SIGKILL) and waits up
    /// to 2 s for the wait-for-exit task to observe exit and call
    /// `mark_exited`.
    pub async fn terminate(&self) {
        if self.pgid > 0 {
            // SAFETY: kill(2) with a negative pid targets the process group.
            unsafe {
                libc::kill(-self.pgid, libc::SIGTERM);
            }
        }
        let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(2);
        while !self.is_closed() {
            if tokio::time::Instant::now() >= deadline {
                if self.pgid > 0 {
                    unsafe {
                        libc::kill(-self.pgid, libc::SIGKILL);
                    }
                }
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }
    }

    pub async fn info(&self) -> SessionInfo {
        let state = *self.state.lock().await;
        let exit_code = *self.exit_code.lock().await;
        let last_seq = self.ring.last_seq().await;
        SessionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            engine: self.engine.clone(),
            state,
            exit_code,
            last_seq,
            created: chrono::DateTime::<chrono::Utc>::from(self.created).to_rfc3339(),
        }
    }

    pub async fn replay_from_seq(&self, from: u64) -> Vec<SessionEvent> {
        self.ring.replay_from_seq(from).await
    }

    pub async fn replay_last_n(&self, n: usize) -> Vec<SessionEvent> {
        self.ring.replay_last_n(n).await
    }

    pub async fn byte_snapshot(&self, limit: usize) -> Vec<u8> {
        self.byte_ring.snapshot(limit).await
    }
}

/// REST session-info shape (spec.md §6).
#[derive(Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub engine: String,
    pub state: SessionState,
    pub exit_code: Option<i32>,
    pub last_seq: u64,
    pub created: String,
}
