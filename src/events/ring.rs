//! Fixed-capacity in-memory history of [`SessionEvent`]s with sequence assignment.
//!
//! Mirrors the `VecDeque` + `Notify` idiom this codebase's byte-oriented
//! scrollback ring uses, but over typed events rather than raw byte chunks,
//! and exposes the two replay operations the resume protocol needs.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

use super::SessionEvent;

struct Inner {
    entries: VecDeque<SessionEvent>,
    capacity: usize,
    next_seq: u64,
}

/// Thread-safe for one writer and many readers (readers take a read lock;
/// `append` takes a write lock and is the sole assigner of `seq`).
pub struct EventRing {
    inner: RwLock<Inner>,
    notify: Arc<Notify>,
}

/// Default ring capacity per spec.md §3.
pub const DEFAULT_CAPACITY: usize = 2048;

impl EventRing {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        Self {
            inner: RwLock::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                next_seq: 0,
            }),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Assigns the next `seq`, stamps `ts_ms` if unset, stores the event
    /// (overwriting the oldest resident entry once at capacity), and wakes
    /// any waiters. Returns the published event (with `seq`/`ts_ms` filled in).
    pub async fn append(&self, mut ev: SessionEvent) -> SessionEvent {
        let mut inner = self.inner.write().await;
        inner.next_seq += 1;
        ev.seq = inner.next_seq;
        if ev.ts_ms <= 0 {
            ev.ts_ms = super::now_ms();
        }
        if inner.entries.len() >= inner.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(ev.clone());
        drop(inner);
        self.notify.notify_waiters();
        ev
    }

    /// Highest assigned seq. Never resets on eviction.
    pub async fn last_seq(&self) -> u64 {
        self.inner.read().await.next_seq
    }

    /// All currently-resident events with `seq > from`, in order.
    pub async fn replay_from_seq(&self, from: u64) -> Vec<SessionEvent> {
        let inner = self.inner.read().await;
        inner
            .entries
            .iter()
            .filter(|e| e.seq > from)
            .cloned()
            .collect()
    }

    /// The last `min(n, size)` resident events, in order.
    pub async fn replay_last_n(&self, n: usize) -> Vec<SessionEvent> {
        let inner = self.inner.read().await;
        let len = inner.entries.len();
        let skip = len.saturating_sub(n);
        inner.entries.iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn ev(session: &str) -> SessionEvent {
        SessionEvent::new(session, "shell", EventKind::Status, None)
    }

    #[tokio::test]
    async fn ring_bounds_and_last_seq() {
        let ring = EventRing::new(3);
        for _ in 0..5 {
            ring.append(ev("s1")).await;
        }
        assert_eq!(ring.last_seq().await, 5);
        let from0 = ring.replay_from_seq(0).await;
        assert_eq!(from0.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4, 5]);
        let last2 = ring.replay_last_n(2).await;
        assert_eq!(last2.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[tokio::test]
    async fn replay_prefix_is_exact() {
        let ring = EventRing::new(10);
        for _ in 0..4 {
            ring.append(ev("s1")).await;
        }
        let tail = ring.replay_from_seq(2).await;
        assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn monotone_unique_seq() {
        let ring = EventRing::new(100);
        let mut seqs = Vec::new();
        for _ in 0..20 {
            let published = ring.append(ev("s1")).await;
            seqs.push(published.seq);
        }
        for w in seqs.windows(2) {
            assert!(w[0] < w[1]);
        }
    }
}
