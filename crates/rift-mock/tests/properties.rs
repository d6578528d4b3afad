//! Property tests for consumption limits and sequence verification.

use proptest::prelude::*;
use rift_mock::expectation::ExpectationStore;
use rift_mock::model::{Action, Expectation, HttpRequest, HttpResponse, RequestDefinition, RequestMatcher, Times};
use rift_mock::recording::{Outcome, RequestLog};
use rift_mock::verify::{VerificationSequence, Verifier};

const PATHS: [&str; 3] = ["/a", "/b", "/c"];

fn path_matcher(path: &str) -> RequestDefinition {
    RequestMatcher::new().with_path(path).into()
}

/// Whether `targets` occurs in `log` as a subsequence, by exhaustive search.
fn occurs_in_order(targets: &[usize], log: &[usize]) -> bool {
    match targets.split_first() {
        None => true,
        Some((first, rest)) => log
            .iter()
            .enumerate()
            .any(|(i, entry)| entry == first && occurs_in_order(rest, &log[i + 1..])),
    }
}

proptest! {
    #[test]
    fn prop_times_n_serves_exactly_n(n in 1u64..20, extra in 0usize..10) {
        let store = ExpectationStore::new();
        store
            .upsert(vec![Expectation::new(
                RequestMatcher::new().with_path("/p"),
                Action::Response(HttpResponse::ok()),
            )
            .with_times(Times::exactly(n))])
            .unwrap();

        let served = (0..n as usize + extra)
            .filter(|_| store.match_request(&HttpRequest::new("GET", "/p")).is_some())
            .count();
        prop_assert_eq!(served, n as usize);
        prop_assert_eq!(store.len(), 1);
    }

    #[test]
    fn prop_sequence_verifies_iff_subsequence(
        log in prop::collection::vec(0usize..3, 0..12),
        targets in prop::collection::vec(0usize..3, 1..5),
    ) {
        let store = ExpectationStore::new();
        let requests = RequestLog::new(100);
        for &index in &log {
            requests.append(HttpRequest::new("GET", PATHS[index]), None, Outcome::NoMatch);
        }

        let sequence = VerificationSequence::requests(targets.iter().map(|&i| path_matcher(PATHS[i])));
        let verified = Verifier::new(&store, &requests).verify_sequence(&sequence).is_ok();
        prop_assert_eq!(verified, occurs_in_order(&targets, &log));
    }
}
