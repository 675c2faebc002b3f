//! Content-hash filter for replayed/duplicated events from streaming engines.
//!
//! Ported from the bounded-FIFO `Deduper` pattern, keeping its exact key
//! construction: `sha256(kind "\n" session_id "\n" normalized(payload) ["\n" ts_ms])`.

use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};

use super::SessionEvent;

/// When `true`, a timestamp suffix is folded into the dedupe key. The
/// timestamp used is read **from inside the payload** under the keys
/// `timestamp_ms`/`ts_ms` (not the event's own `ts_ms` field) — this mirrors
/// the pre-distillation implementation, which extracts the suffix from the
/// payload object rather than the envelope, and is the resolution to an
/// otherwise-ambiguous point in the spec text.
#[derive(Clone, Copy, Debug, Default)]
pub struct DedupeOptions {
    pub include_timestamp_ms: bool,
}

/// Default capacity per spec.md §4.3.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Bounded FIFO of content hashes. Not `Send`-shared directly; callers wrap
/// in a `Mutex` if needed across tasks (engine adapters use one deduper per
/// reader task, so no locking is required there).
pub struct Deduper {
    max: usize,
    queue: VecDeque<String>,
    seen: HashSet<String>,
    opts: DedupeOptions,
}

impl Deduper {
    #[must_use]
    pub fn new(max: usize, opts: DedupeOptions) -> Self {
        let max = if max == 0 { DEFAULT_CAPACITY } else { max };
        Self {
            max,
            queue: VecDeque::with_capacity(max),
            seen: HashSet::with_capacity(max),
            opts,
        }
    }

    /// Returns `true` if an event with this key was already recorded;
    /// otherwise records it (evicting the oldest key if over capacity) and
    /// returns `false`.
    pub fn seen(&mut self, ev: &SessionEvent) -> bool {
        let key = dedupe_key(ev, self.opts);
        if self.seen.contains(&key) {
            return true;
        }
        self.seen.insert(key.clone());
        self.queue.push_back(key);
        if self.queue.len() > self.max {
            if let Some(old) = self.queue.pop_front() {
                self.seen.remove(&old);
            }
        }
        false
    }
}

#[must_use]
pub fn dedupe_key(ev: &SessionEvent, opts: DedupeOptions) -> String {
    let payload_norm = normalize_payload(ev.payload.as_ref());
    let mut src = format!("{}\n{}\n{}", ev.kind.as_str(), ev.session_id, payload_norm);
    if opts.include_timestamp_ms {
        if let Some(ts) = extract_timestamp_ms(ev.payload.as_ref()) {
            src.push('\n');
            src.push_str(&ts.to_string());
        }
    }
    let mut hasher = Sha256::new();
    hasher.update(src.as_bytes());
    hex_encode(&hasher.finalize())
}

fn normalize_payload(payload: Option<&serde_json::Value>) -> String {
    match payload {
        None => "null".to_string(),
        Some(v) => serde_json::to_string(v).unwrap_or_else(|_| "null".to_string()),
    }
}

fn extract_timestamp_ms(payload: Option<&serde_json::Value>) -> Option<i64> {
    let obj = payload?.as_object()?;
    for key in ["timestamp_ms", "ts_ms"] {
        if let Some(v) = obj.get(key) {
            if let Some(n) = v.as_i64() {
                return Some(n);
            }
            if let Some(f) = v.as_f64() {
                #[allow(clippy::cast_possible_truncation)]
                return Some(f as i64);
            }
        }
    }
    None
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;

    #[test]
    fn dedup_idempotence_without_timestamp() {
        let mut d = Deduper::new(10, DedupeOptions { include_timestamp_ms: false });
        let mk = || SessionEvent::new("s1", "cursor", EventKind::Assistant, Some(json!({"data": "hello"})));
        assert!(!d.seen(&mk()));
        assert!(d.seen(&mk()));
        assert!(d.seen(&mk()));
    }

    #[test]
    fn distinct_payloads_both_pass() {
        let mut d = Deduper::new(10, DedupeOptions::default());
        let a = SessionEvent::new("s1", "cursor", EventKind::Assistant, Some(json!({"data": "a"})));
        let b = SessionEvent::new("s1", "cursor", EventKind::Assistant, Some(json!({"data": "b"})));
        assert!(!d.seen(&a));
        assert!(!d.seen(&b));
    }

    #[test]
    fn eviction_lets_oldest_repeat() {
        let mut d = Deduper::new(2, DedupeOptions::default());
        let a = SessionEvent::new("s1", "cursor", EventKind::Assistant, Some(json!({"data": "a"})));
        let b = SessionEvent::new("s1", "cursor", EventKind::Assistant, Some(json!({"data": "b"})));
        let c = SessionEvent::new("s1", "cursor", EventKind::Assistant, Some(json!({"data": "c"})));
        assert!(!d.seen(&a));
        assert!(!d.seen(&b));
        assert!(!d.seen(&c)); // evicts `a`'s key
        assert!(!d.seen(&a)); // `a` now forgotten, treated as new
    }
}
