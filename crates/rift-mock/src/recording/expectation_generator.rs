//! Expectations generated from forwarded traffic.

use super::types::{LogEntry, Outcome};
use crate::model::{Action, Expectation, RequestMatcher, Times};

/// Replay expectation for a forwarded entry: the recorded request as an exact
/// matcher, answered once with the upstream response.
pub fn recorded_expectation(entry: &LogEntry) -> Option<Expectation> {
    let Outcome::Forwarded { response } = &entry.outcome else {
        return None;
    };
    Some(
        Expectation::new(
            RequestMatcher::from_request(&entry.request),
            Action::Response(response.clone()),
        )
        .with_times(Times::once()),
    )
}
