//! In-memory expectation store.
//!
//! Expectations are kept in match order: priority descending, then creation order.
//! Structural changes take the write lock; matching works on a snapshot of the
//! `Arc` list and consumes a use with a compare-and-swap on the expectation's own
//! counter, so concurrent requests never over-consume a limited expectation.

use crate::matcher::{CompiledMatcher, MatcherError};
use crate::model::{Expectation, HttpRequest, RequestDefinition, Times};
use crate::openapi::OpenApiCache;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// An expectation as held by the store, with its live counters.
#[derive(Debug)]
pub struct StoredExpectation {
    expectation: Expectation,
    matcher: CompiledMatcher,
    remaining: AtomicU64,
    created_seq: u64,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredExpectation {
    fn new(expectation: Expectation, matcher: CompiledMatcher, created_seq: u64) -> Self {
        let expires_at = expectation
            .time_to_live
            .duration()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .and_then(|d| Utc::now().checked_add_signed(d));
        Self {
            remaining: AtomicU64::new(expectation.times.remaining_times),
            expectation,
            matcher,
            created_seq,
            expires_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.expectation.id
    }

    pub fn priority(&self) -> i32 {
        self.expectation.priority
    }

    pub fn created_seq(&self) -> u64 {
        self.created_seq
    }

    pub fn matcher(&self) -> &CompiledMatcher {
        &self.matcher
    }

    pub fn expectation(&self) -> &Expectation {
        &self.expectation
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let has_uses = self.expectation.times.unlimited || self.remaining() > 0;
        let alive = self.expires_at.is_none_or(|at| now < at);
        has_uses && alive
    }

    /// Take one use. Fails once the counter has reached zero.
    fn try_consume(&self) -> bool {
        if self.expectation.times.unlimited {
            return true;
        }
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// The expectation with its current remaining count.
    pub fn snapshot(&self) -> Expectation {
        let mut expectation = self.expectation.clone();
        if !expectation.times.unlimited {
            expectation.times = Times::exactly(self.remaining());
        }
        expectation
    }
}

/// Ordered, concurrently readable set of expectations.
#[derive(Debug, Default)]
pub struct ExpectationStore {
    entries: RwLock<Vec<Arc<StoredExpectation>>>,
    next_seq: AtomicU64,
    openapi: OpenApiCache,
}

impl ExpectationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Compile a request definition against this store's OpenAPI cache.
    pub fn compile(&self, definition: &RequestDefinition) -> Result<CompiledMatcher, MatcherError> {
        CompiledMatcher::compile(definition, &self.openapi)
    }

    /// Insert or replace expectations, returning them as stored (ids assigned).
    ///
    /// Every matcher is compiled before the store is touched, so a failure leaves
    /// it unchanged.
    pub fn upsert(&self, expectations: Vec<Expectation>) -> Result<Vec<Expectation>, MatcherError> {
        let compiled = expectations
            .into_iter()
            .map(|mut expectation| {
                if expectation.id.is_empty() {
                    expectation.id = uuid::Uuid::new_v4().to_string();
                }
                let matcher = self.compile(&expectation.http_request)?;
                Ok((expectation, matcher))
            })
            .collect::<Result<Vec<_>, MatcherError>>()?;

        let mut entries = self.entries.write();
        let mut stored = Vec::with_capacity(compiled.len());
        for (expectation, matcher) in compiled {
            let existing = entries.iter().position(|e| e.id() == expectation.id);
            let created_seq = match existing {
                Some(i) => entries[i].created_seq,
                None => self.next_seq.fetch_add(1, Ordering::Relaxed),
            };
            let entry = Arc::new(StoredExpectation::new(expectation, matcher, created_seq));
            info!(
                expectation_id = entry.id(),
                priority = entry.priority(),
                action = entry.expectation.action.key(),
                replaced = existing.is_some(),
                "Upserted expectation"
            );
            stored.push(entry.expectation.clone());
            match existing {
                Some(i) => entries[i] = entry,
                None => entries.push(entry),
            }
        }
        entries.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then(a.created_seq.cmp(&b.created_seq))
        });
        Ok(stored)
    }

    /// First active expectation accepting `request`, with one use consumed.
    pub fn match_request(&self, request: &HttpRequest) -> Option<Arc<StoredExpectation>> {
        let snapshot = self.entries.read().clone();
        let now = Utc::now();
        for entry in snapshot {
            if !entry.is_active_at(now) || !entry.matcher.matches(request) {
                continue;
            }
            if entry.try_consume() {
                debug!(
                    expectation_id = entry.id(),
                    method = %request.method,
                    path = %request.path,
                    "Request matched expectation"
                );
                return Some(entry);
            }
            // lost the race for the last use; keep scanning
        }
        None
    }

    pub fn get(&self, id: &str) -> Option<Arc<StoredExpectation>> {
        self.entries.read().iter().find(|e| e.id() == id).cloned()
    }

    pub fn clear_by_id(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.id() != id);
        let removed = before != entries.len();
        if removed {
            info!(expectation_id = id, "Cleared expectation");
        }
        removed
    }

    /// Remove every expectation compatible with `filter`; returns the removed ids.
    pub fn clear_matching(&self, filter: &RequestDefinition) -> Result<Vec<String>, MatcherError> {
        let compiled = self.compile(filter)?;
        let mut entries = self.entries.write();
        let mut removed = Vec::new();
        entries.retain(|e| {
            let hit = is_selected(filter, &compiled, e);
            if hit {
                removed.push(e.id().to_string());
            }
            !hit
        });
        info!(count = removed.len(), "Cleared expectations");
        Ok(removed)
    }

    pub fn reset(&self) {
        self.entries.write().clear();
        info!("Reset expectations");
    }

    /// Active expectations compatible with `filter` (all when `None`), in match order.
    pub fn retrieve_active(&self, filter: Option<&RequestDefinition>) -> Result<Vec<Expectation>, MatcherError> {
        let compiled = filter.map(|f| self.compile(f).map(|c| (f, c))).transpose()?;
        let snapshot = self.entries.read().clone();
        let now = Utc::now();
        Ok(snapshot
            .iter()
            .filter(|e| e.is_active_at(now))
            .filter(|e| {
                compiled
                    .as_ref()
                    .is_none_or(|(filter, matcher)| is_selected(filter, matcher, e))
            })
            .map(|e| e.snapshot())
            .collect())
    }
}

fn is_selected(filter: &RequestDefinition, compiled: &CompiledMatcher, entry: &StoredExpectation) -> bool {
    *filter == entry.expectation.http_request || compiled.is_compatible(&entry.matcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, HttpResponse, OpenApiDefinition, RequestMatcher, TimeToLive, TimeUnit};
    use std::time::Duration;

    fn respond(path: &str, status: u16) -> Expectation {
        Expectation::new(
            RequestMatcher::new().with_path(path),
            Action::Response(HttpResponse::new(status)),
        )
    }

    fn status_of(entry: &StoredExpectation) -> u16 {
        match &entry.expectation().action {
            Action::Response(r) => r.status(),
            _ => 0,
        }
    }

    #[test]
    fn test_upsert_assigns_ids() {
        let store = ExpectationStore::new();
        let stored = store.upsert(vec![respond("/a", 200), respond("/b", 200)]).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(uuid::Uuid::parse_str(&stored[0].id).is_ok());
        assert_ne!(stored[0].id, stored[1].id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_times_exhaustion() {
        let store = ExpectationStore::new();
        store.upsert(vec![respond("/p", 200).with_times(Times::exactly(2))]).unwrap();
        let request = HttpRequest::new("GET", "/p");
        assert!(store.match_request(&request).is_some());
        assert!(store.match_request(&request).is_some());
        assert!(store.match_request(&request).is_none());
        // exhausted expectations stay in the store
        assert_eq!(store.len(), 1);
        assert!(store.retrieve_active(None).unwrap().is_empty());
    }

    #[test]
    fn test_priority_then_creation_order() {
        let store = ExpectationStore::new();
        store
            .upsert(vec![
                respond("/p", 201),
                respond("/p", 202),
                respond("/p", 203).with_priority(10),
            ])
            .unwrap();
        let request = HttpRequest::new("GET", "/p");
        assert_eq!(status_of(&store.match_request(&request).unwrap()), 203);

        let store = ExpectationStore::new();
        store.upsert(vec![respond("/p", 201), respond("/p", 202)]).unwrap();
        assert_eq!(status_of(&store.match_request(&request).unwrap()), 201);
    }

    #[test]
    fn test_replace_keeps_creation_order() {
        let store = ExpectationStore::new();
        store
            .upsert(vec![respond("/p", 201).with_id("first"), respond("/p", 202)])
            .unwrap();
        store.upsert(vec![respond("/p", 299).with_id("first")]).unwrap();
        assert_eq!(store.len(), 2);
        let request = HttpRequest::new("GET", "/p");
        assert_eq!(status_of(&store.match_request(&request).unwrap()), 299);
    }

    #[test]
    fn test_expired_ttl_never_matches() {
        let store = ExpectationStore::new();
        store
            .upsert(vec![respond("/p", 200).with_time_to_live(TimeToLive::exactly(TimeUnit::Milliseconds, 0))])
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.match_request(&HttpRequest::new("GET", "/p")).is_none());
    }

    #[test]
    fn test_failed_compile_leaves_store_unchanged() {
        let store = ExpectationStore::new();
        store.upsert(vec![respond("/ok", 200)]).unwrap();
        let broken = Expectation::new(
            OpenApiDefinition {
                spec_url_or_payload: serde_json::json!("not a spec"),
                operation_id: None,
            },
            Action::Response(HttpResponse::ok()),
        );
        let before = store.len();
        assert!(store.upsert(vec![respond("/y", 200), broken]).is_err());
        assert_eq!(store.len(), before);
    }

    #[test]
    fn test_clear_by_id_is_idempotent() {
        let store = ExpectationStore::new();
        store.upsert(vec![respond("/a", 200).with_id("x")]).unwrap();
        assert!(store.clear_by_id("x"));
        assert!(!store.clear_by_id("x"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_matching_and_retrieve_filter() {
        let store = ExpectationStore::new();
        store
            .upsert(vec![
                respond("/some/a", 200).with_id("a"),
                respond("/some/b", 200).with_id("b"),
                respond("/other", 200).with_id("c"),
            ])
            .unwrap();
        let filter = RequestDefinition::Matcher(RequestMatcher::new().with_path("/some/.*"));
        let active = store.retrieve_active(Some(&filter)).unwrap();
        assert_eq!(active.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);

        let removed = store.clear_matching(&filter).unwrap();
        assert_eq!(removed, ["a", "b"]);
        assert!(store.clear_matching(&filter).unwrap().is_empty());
        assert_eq!(store.retrieve_active(None).unwrap()[0].id, "c");
    }

    #[test]
    fn test_snapshot_reflects_remaining() {
        let store = ExpectationStore::new();
        store.upsert(vec![respond("/p", 200).with_times(Times::exactly(3))]).unwrap();
        store.match_request(&HttpRequest::new("GET", "/p"));
        assert_eq!(store.retrieve_active(None).unwrap()[0].times, Times::exactly(2));
    }

    #[test]
    fn test_concurrent_consumption_never_over_consumes() {
        let store = Arc::new(ExpectationStore::new());
        store.upsert(vec![respond("/p", 200).with_times(Times::exactly(25))]).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| store.match_request(&HttpRequest::new("GET", "/p")).is_some())
                        .count()
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 25);
    }
}
