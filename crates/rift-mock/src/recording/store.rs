//! Append-only request log.

use super::types::{LogEntry, Outcome};
use crate::model::HttpRequest;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default cap on retained entries.
pub const DEFAULT_MAX_ENTRIES: usize = 60_000;

/// Sequence-numbered log of every inbound request.
///
/// Sequence numbers are assigned under the write lock, so log order and sequence
/// order agree. When the cap is exceeded the oldest entries are dropped; numbers are
/// never reused.
#[derive(Debug)]
pub struct RequestLog {
    entries: RwLock<VecDeque<Arc<LogEntry>>>,
    next_seq: AtomicU64,
    max_entries: usize,
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl RequestLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            max_entries: max_entries.max(1),
        }
    }

    pub fn append(&self, request: HttpRequest, matched_expectation_id: Option<String>, outcome: Outcome) -> u64 {
        let mut entries = self.entries.write();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.push_back(Arc::new(LogEntry {
            seq,
            timestamp: chrono::Utc::now(),
            request,
            matched_expectation_id,
            outcome,
        }));
        while entries.len() > self.max_entries {
            if let Some(evicted) = entries.pop_front() {
                debug!(seq = evicted.seq, "Evicted oldest log entry");
            }
        }
        seq
    }

    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry for which `predicate` holds; returns how many were removed.
    pub fn remove_where(&self, predicate: impl Fn(&LogEntry) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !predicate(e));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> HttpRequest {
        HttpRequest::new("GET", path)
    }

    #[test]
    fn test_append_assigns_increasing_seq() {
        let log = RequestLog::default();
        assert_eq!(log.append(request("/a"), None, Outcome::NoMatch), 0);
        assert_eq!(log.append(request("/b"), Some("id".into()), Outcome::NoMatch), 1);
        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].matched_expectation_id.as_deref(), Some("id"));
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let log = RequestLog::new(2);
        for path in ["/1", "/2", "/3"] {
            log.append(request(path), None, Outcome::NoMatch);
        }
        let entries = log.snapshot();
        assert_eq!(entries.iter().map(|e| e.seq).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(entries[0].request.path, "/2");
    }

    #[test]
    fn test_remove_where_and_clear() {
        let log = RequestLog::default();
        log.append(request("/keep"), None, Outcome::NoMatch);
        log.append(request("/drop"), None, Outcome::NoMatch);
        assert_eq!(log.remove_where(|e| e.request.path == "/drop"), 1);
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
        // sequence numbers continue after a clear
        assert_eq!(log.append(request("/x"), None, Outcome::NoMatch), 2);
    }

    #[test]
    fn test_concurrent_appends_are_ordered() {
        let log = Arc::new(RequestLog::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        log.append(request("/c"), None, Outcome::NoMatch);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let seqs: Vec<u64> = log.snapshot().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (0..200).collect::<Vec<_>>());
    }
}
