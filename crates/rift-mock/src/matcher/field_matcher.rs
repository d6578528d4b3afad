//! Field matchers for headers, query parameters, path parameters and cookies.
//!
//! Names are themselves `NottableString`s, so a single entry may select several
//! actual names (regex keys) or assert that a name is absent (negated keys).
//! A name prefixed with `?` is optional: the entry holds when the name is absent,
//! and its values must match when it is present.

use super::string_matcher::CompiledNottable;
use super::MatcherError;
use crate::model::{CookieMap, CookieMatchers, KeyMatchers, MultiMap, NottableString};

/// Compile a name, stripping the optional-key marker.
fn compile_name(name: &NottableString, ignore_case: bool) -> Result<(CompiledNottable, bool), MatcherError> {
    match name.as_literal().and_then(|n| n.strip_prefix('?')) {
        Some(rest) if !rest.is_empty() => Ok((
            CompiledNottable::compile(&NottableString::string(rest), ignore_case)?,
            true,
        )),
        _ => Ok((CompiledNottable::compile(name, ignore_case)?, false)),
    }
}

/// One compiled `name: [values]` entry.
#[derive(Debug, Clone)]
struct CompiledEntry {
    name: CompiledNottable,
    optional: bool,
    values: Vec<CompiledNottable>,
}

impl CompiledEntry {
    /// Whether the actual values of one name satisfy every expected value.
    fn values_satisfy(&self, actual: &[String]) -> bool {
        if self.values.is_empty() {
            return true;
        }
        // an array schema describes the whole list of values
        if let [only] = self.values.as_slice() {
            if let Some(schema) = only.schema().filter(|s| s.is_array_schema()) {
                let refs: Vec<&String> = actual.iter().collect();
                return schema.is_valid_list(&refs) != only.is_not();
            }
        }
        self.values.iter().all(|expected| {
            if expected.is_not() {
                !actual.is_empty() && !actual.iter().any(|a| expected.matches_raw(a))
            } else {
                actual.iter().any(|a| expected.matches_raw(a))
            }
        })
    }

    fn matches<'a>(&self, mut candidates: impl Iterator<Item = (&'a str, &'a [String])>) -> bool {
        if self.name.is_not() {
            // absent, or present with values that differ from every expectation
            candidates.all(|(name, values)| {
                !self.name.matches_raw(name)
                    || (!self.values.is_empty() && !self.values_satisfy(values))
            })
        } else {
            // a regex name applies to every name it selects
            let mut found = false;
            for (name, values) in candidates {
                if self.name.matches_raw(name) {
                    if !self.values_satisfy(values) {
                        return false;
                    }
                    found = true;
                }
            }
            found || self.optional
        }
    }
}

/// Compiled matcher over a multi-valued map.
#[derive(Debug, Clone, Default)]
pub struct CompiledKeyMatchers {
    entries: Vec<CompiledEntry>,
}

impl CompiledKeyMatchers {
    /// Compile entries. Header names are matched case-insensitively.
    pub fn compile(matchers: &KeyMatchers, ignore_case_names: bool) -> Result<Self, MatcherError> {
        let entries = matchers
            .iter()
            .map(|entry| {
                let (name, optional) = compile_name(&entry.name, ignore_case_names)?;
                Ok(CompiledEntry {
                    name,
                    optional,
                    values: entry
                        .values
                        .iter()
                        .map(|v| CompiledNottable::compile(v, false))
                        .collect::<Result<_, MatcherError>>()?,
                })
            })
            .collect::<Result<_, MatcherError>>()?;
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matches(&self, actual: &MultiMap) -> bool {
        self.entries.iter().all(|entry| entry.matches(actual.iter()))
    }
}

#[derive(Debug, Clone)]
struct CompiledCookie {
    name: CompiledNottable,
    optional: bool,
    value: CompiledNottable,
}

/// Compiled cookie matcher. Cookie names compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct CompiledCookieMatchers {
    entries: Vec<CompiledCookie>,
}

impl CompiledCookieMatchers {
    pub fn compile(matchers: &CookieMatchers) -> Result<Self, MatcherError> {
        let entries = matchers
            .iter()
            .map(|c| {
                let (name, optional) = compile_name(&c.name, true)?;
                Ok(CompiledCookie {
                    name,
                    optional,
                    value: CompiledNottable::compile(&c.value, false)?,
                })
            })
            .collect::<Result<_, MatcherError>>()?;
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matches(&self, cookies: &CookieMap) -> bool {
        self.entries.iter().all(|cookie| {
            let mut present = cookies
                .entries()
                .iter()
                .filter(|(name, _)| cookie.name.matches_raw(name))
                .peekable();
            if cookie.name.is_not() {
                present.all(|(_, value)| !cookie.value.matches(value))
            } else if cookie.optional && present.peek().is_none() {
                true
            } else {
                present.any(|(_, value)| cookie.value.matches(value))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KeyToMultiValue, KeyToValue, NottableString};
    use serde_json::json;

    fn headers(pairs: &[(&str, &str)]) -> MultiMap {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    fn compile(entries: Vec<KeyToMultiValue>) -> CompiledKeyMatchers {
        CompiledKeyMatchers::compile(&KeyMatchers(entries), true).unwrap()
    }

    #[test]
    fn test_name_and_value() {
        let m = compile(vec![KeyToMultiValue::new("X-Test", vec!["a".into()])]);
        assert!(m.matches(&headers(&[("x-test", "a")])));
        assert!(!m.matches(&headers(&[("x-test", "b")])));
        assert!(!m.matches(&headers(&[])));
    }

    #[test]
    fn test_name_only() {
        let m = compile(vec![KeyToMultiValue::new("X-Test", vec![])]);
        assert!(m.matches(&headers(&[("X-Test", "anything")])));
        assert!(!m.matches(&headers(&[("Other", "x")])));
    }

    #[test]
    fn test_negated_name() {
        let m = compile(vec![KeyToMultiValue::new(
            NottableString::not("X-Test"),
            vec!["expected".into()],
        )]);
        assert!(m.matches(&headers(&[])));
        assert!(m.matches(&headers(&[("X-Test", "other")])));
        assert!(!m.matches(&headers(&[("X-Test", "expected")])));
    }

    #[test]
    fn test_negated_name_without_values() {
        let m = compile(vec![KeyToMultiValue::new(NottableString::not("X-Test"), vec![])]);
        assert!(m.matches(&headers(&[("Other", "x")])));
        assert!(!m.matches(&headers(&[("X-Test", "x")])));
    }

    #[test]
    fn test_negated_value() {
        let m = compile(vec![KeyToMultiValue::new("X-Test", vec![NottableString::not("a")])]);
        assert!(m.matches(&headers(&[("X-Test", "b")])));
        assert!(!m.matches(&headers(&[("X-Test", "a")])));
        assert!(!m.matches(&headers(&[])));
    }

    #[test]
    fn test_regex_name_and_value() {
        let m = compile(vec![KeyToMultiValue::new("X-.*", vec!["[0-9]+".into()])]);
        assert!(m.matches(&headers(&[("Accept", "x"), ("X-Id", "42")])));
        assert!(!m.matches(&headers(&[("X-Id", "abc")])));
    }

    #[test]
    fn test_multiple_values_all_required() {
        let m = compile(vec![KeyToMultiValue::new("tag", vec!["a".into(), "b".into()])]);
        assert!(m.matches(&headers(&[("tag", "a"), ("tag", "b"), ("tag", "c")])));
        assert!(!m.matches(&headers(&[("tag", "a")])));
    }

    #[test]
    fn test_array_schema_value() {
        let m = compile(vec![KeyToMultiValue::new(
            "tags",
            vec![NottableString::schema(json!({"type": "array", "items": {"type": "string"}, "minItems": 2}))],
        )]);
        assert!(m.matches(&headers(&[("tags", "tag1"), ("tags", "tag2")])));
        assert!(m.matches(&headers(&[("tags", "tag1,tag2")])));
        assert!(!m.matches(&headers(&[("tags", "tag1")])));
    }

    #[test]
    fn test_cookies() {
        let m = CompiledCookieMatchers::compile(&CookieMatchers(vec![KeyToValue {
            name: "session".into(),
            value: "abc.*".into(),
        }]))
        .unwrap();
        let mut cookies = CookieMap::new();
        cookies.push("Session", "abc123");
        assert!(m.matches(&cookies));
        assert!(!m.matches(&CookieMap::new()));

        let negated = CompiledCookieMatchers::compile(&CookieMatchers(vec![KeyToValue {
            name: NottableString::not("session"),
            value: "abc123".into(),
        }]))
        .unwrap();
        assert!(negated.matches(&CookieMap::new()));
        assert!(!negated.matches(&cookies));
    }

    #[test]
    fn test_optional_name_checks_schema_when_present() {
        let m = compile(vec![KeyToMultiValue::new(
            "?limit",
            vec![NottableString::schema(json!({"type": "integer"}))],
        )]);
        assert!(m.matches(&headers(&[])));
        assert!(m.matches(&headers(&[("limit", "10")])));
        assert!(!m.matches(&headers(&[("limit", "abc")])));
    }

    #[test]
    fn test_optional_cookie() {
        let m = CompiledCookieMatchers::compile(&CookieMatchers(vec![KeyToValue {
            name: "?session".into(),
            value: "[0-9]+".into(),
        }]))
        .unwrap();
        assert!(m.matches(&CookieMap::new()));
        let mut cookies = CookieMap::new();
        cookies.push("session", "42");
        assert!(m.matches(&cookies));
        let mut bad = CookieMap::new();
        bad.push("session", "abc");
        assert!(!m.matches(&bad));
    }
}
