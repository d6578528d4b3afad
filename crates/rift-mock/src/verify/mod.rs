//! Verification of recorded traffic.
//!
//! Count verification checks how many log entries a request matcher (or an
//! expectation id) selects against `VerificationTimes`. Sequence verification checks
//! that targets occur in order, each consuming the earliest unconsumed matching
//! entry after the previous one. Failures carry deterministic messages built from
//! indented JSON renderings of the matchers and the log.
//!
//! # Module Structure
//!
//! - `types` - Verification payloads and targets

mod types;

pub use types::{ExpectationId, Verification, VerificationSequence, VerificationTarget};

use crate::expectation::ExpectationStore;
use crate::json_format::to_pretty_json;
use crate::matcher::{CompiledMatcher, MatcherError};
use crate::model::{RequestDefinition, VerificationTimes};
use crate::recording::{LogEntry, RequestLog};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum VerificationFailure {
    #[error("No expectation found with id {0}")]
    UnknownExpectationId(String),
    /// The log did not satisfy the verification
    #[error("{0}")]
    NotSatisfied(String),
    #[error(transparent)]
    Matcher(#[from] MatcherError),
}

/// A target resolved against the store: ids become the expectation's definition.
enum Resolved {
    Matcher {
        definition: RequestDefinition,
        matcher: CompiledMatcher,
    },
    Expectation {
        id: String,
        definition: RequestDefinition,
    },
}

impl Resolved {
    fn selects(&self, entry: &LogEntry) -> bool {
        match self {
            Resolved::Matcher { matcher, .. } => matcher.matches(&entry.request),
            Resolved::Expectation { id, .. } => entry.matched_expectation_id.as_deref() == Some(id),
        }
    }

    fn describe(&self) -> String {
        match self {
            Resolved::Matcher { definition, .. } | Resolved::Expectation { definition, .. } => {
                to_pretty_json(definition)
            }
        }
    }
}

/// Verifies a log against a store's expectations.
pub struct Verifier<'a> {
    store: &'a ExpectationStore,
    log: &'a RequestLog,
}

impl<'a> Verifier<'a> {
    pub fn new(store: &'a ExpectationStore, log: &'a RequestLog) -> Self {
        Self { store, log }
    }

    fn resolve(&self, target: &VerificationTarget) -> Result<Resolved, VerificationFailure> {
        match target {
            VerificationTarget::ExpectationId(id) => {
                let stored = self
                    .store
                    .get(id)
                    .ok_or_else(|| VerificationFailure::UnknownExpectationId(id.clone()))?;
                Ok(Resolved::Expectation {
                    id: id.clone(),
                    definition: stored.expectation().http_request.clone(),
                })
            }
            VerificationTarget::Request(definition) => Ok(Resolved::Matcher {
                matcher: self.store.compile(definition)?,
                definition: definition.clone(),
            }),
        }
    }

    pub fn verify(&self, verification: &Verification) -> Result<(), VerificationFailure> {
        let target = self.resolve(&verification.target())?;
        let entries = self.log.snapshot();
        let count = entries.iter().filter(|e| target.selects(e)).count() as u64;
        debug!(count, times = %verification.times, "Verifying request count");
        if verification.times.matches(count) {
            return Ok(());
        }
        Err(VerificationFailure::NotSatisfied(format!(
            "Request not found {}, expected:<{}>{}",
            verification.times,
            target.describe(),
            observed(&entries, verification.max_context_entries)
        )))
    }

    pub fn verify_sequence(&self, sequence: &VerificationSequence) -> Result<(), VerificationFailure> {
        let targets = sequence
            .targets()
            .iter()
            .map(|t| self.resolve(t))
            .collect::<Result<Vec<_>, _>>()?;
        let entries = self.log.snapshot();
        if find_subsequence(&targets, &entries) {
            return Ok(());
        }
        let expected: Vec<String> = targets.iter().map(Resolved::describe).collect();
        Err(VerificationFailure::NotSatisfied(format!(
            "Request sequence not found, expected:<[ {} ]>{}",
            expected.join(", "),
            observed(&entries, sequence.max_context_entries)
        )))
    }

    pub fn verify_zero_interactions(&self) -> Result<(), VerificationFailure> {
        let entries = self.log.snapshot();
        if entries.is_empty() {
            return Ok(());
        }
        Err(VerificationFailure::NotSatisfied(format!(
            "Request not found {}, expected:<{{ }}>{}",
            VerificationTimes::never(),
            observed(&entries, None)
        )))
    }
}

/// Single forward cursor; an entry is never used for two targets.
fn find_subsequence(targets: &[Resolved], entries: &[Arc<LogEntry>]) -> bool {
    let mut cursor = 0;
    for target in targets {
        match entries[cursor..].iter().position(|e| target.selects(e)) {
            Some(offset) => cursor += offset + 1,
            None => return false,
        }
    }
    true
}

/// The ` but was:<...>` tail, bounded by `max_context_entries`.
fn observed(entries: &[Arc<LogEntry>], max_context_entries: Option<usize>) -> String {
    if max_context_entries.is_some_and(|max| entries.len() > max) {
        return format!(" but was not found, found {} other requests", entries.len());
    }
    let rendered: Vec<String> = entries.iter().map(|e| to_pretty_json(&e.request)).collect();
    format!(" but was:<{}>", rendered.join(", "))
}
