//! Byte-granular scrollback ring for raw PTY output, used only to replay
//! history on attach to the legacy `/ws/sessions/{id}` stream — the typed
//! event stream never reads from this buffer (spec.md §4.2).

use tokio::sync::RwLock;

/// Default size per spec.md §3: 64 KiB.
pub const DEFAULT_SIZE: usize = 64 * 1024;

pub struct ByteRing {
    inner: RwLock<Vec<u8>>,
    cap: usize,
}

impl ByteRing {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        let cap = if cap == 0 { DEFAULT_SIZE } else { cap };
        Self {
            inner: RwLock::new(Vec::new()),
            cap,
        }
    }

    pub async fn write(&self, data: &[u8]) {
        let mut buf = self.inner.write().await;
        buf.extend_from_slice(data);
        if buf.len() > self.cap {
            let excess = buf.len() - self.cap;
            buf.drain(0..excess);
        }
    }

    /// Returns the last `<= limit` bytes (all of it when `limit == 0`).
    pub async fn snapshot(&self, limit: usize) -> Vec<u8> {
        let buf = self.inner.read().await;
        if limit == 0 || buf.len() <= limit {
            buf.clone()
        } else {
            buf[buf.len() - limit..].to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_only_tail() {
        let ring = ByteRing::new(4);
        ring.write(b"abcdef").await;
        assert_eq!(ring.snapshot(0).await, b"cdef");
    }

    #[tokio::test]
    async fn snapshot_limit_caps_read() {
        let ring = ByteRing::new(10);
        ring.write(b"abcdefgh").await;
        assert_eq!(ring.snapshot(3).await, b"fgh");
    }
}
