//! Structural JSON comparison for `JSON` body matchers.
//!
//! Subset mode (`ONLY_MATCHING_FIELDS`) ignores extra object fields and treats
//! expected arrays as unordered subsets of actual arrays. Strict mode requires
//! identical key sets and ordered, equal-length arrays. In both modes an expected
//! string may be a placeholder such as `${json-unit.any-string}`.

use super::string_matcher::full_match_regex;
use crate::model::MatchType;
use serde_json::Value;

const REGEX_PLACEHOLDER: &str = "${json-unit.regex}";

pub fn json_matches(expected: &Value, actual: &Value, mode: MatchType) -> bool {
    if let Value::String(text) = expected {
        if let Some(result) = placeholder(text, actual) {
            return result;
        }
    }
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => {
            if mode == MatchType::Strict && e.len() != a.len() {
                return false;
            }
            e.iter().all(|(key, ev)| match a.get(key) {
                Some(av) => json_matches(ev, av, mode),
                None => matches!(ev, Value::String(s) if s == "${json-unit.ignore}"),
            })
        }
        (Value::Array(e), Value::Array(a)) => match mode {
            MatchType::Strict => {
                e.len() == a.len() && e.iter().zip(a).all(|(ev, av)| json_matches(ev, av, mode))
            }
            MatchType::OnlyMatchingFields => {
                let mut used = vec![false; a.len()];
                assign(e, a, &mut used, mode)
            }
        },
        _ => json_equal(expected, actual),
    }
}

/// Equality with numeric comparison across integer/float representations.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Match each expected element to a distinct actual element, backtracking on conflicts.
fn assign(expected: &[Value], actual: &[Value], used: &mut [bool], mode: MatchType) -> bool {
    let Some((first, rest)) = expected.split_first() else {
        return true;
    };
    for i in 0..actual.len() {
        if used[i] || !json_matches(first, &actual[i], mode) {
            continue;
        }
        used[i] = true;
        if assign(rest, actual, used, mode) {
            return true;
        }
        used[i] = false;
    }
    false
}

fn placeholder(text: &str, actual: &Value) -> Option<bool> {
    match text {
        "${json-unit.ignore}" | "${json-unit.ignore-element}" => Some(true),
        "${json-unit.any-string}" => Some(actual.is_string()),
        "${json-unit.any-number}" => Some(actual.is_number()),
        "${json-unit.any-boolean}" => Some(actual.is_boolean()),
        _ => {
            let pattern = text.strip_prefix(REGEX_PLACEHOLDER)?;
            let regex = full_match_regex(pattern, false)?;
            Some(actual.as_str().is_some_and(|s| regex.is_match(s)))
        }
    }
}
