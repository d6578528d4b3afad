//! Compiled `NottableString` values.
//!
//! A plain value matches when it equals the actual value, or when it is a valid
//! regular expression that matches the whole actual value. Schema values validate
//! the actual text against a JSON schema after coercing it to the schema's type.

use super::json_schema::JsonSchema;
use super::MatcherError;
use crate::model::NottableString;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum ValueKind {
    Text {
        raw: String,
        lower: String,
        /// `None` when the value has no regex metacharacters or is not a valid regex.
        regex: Option<Arc<Regex>>,
        ignore_case: bool,
    },
    Schema(Arc<JsonSchema>),
}

/// Compiled form of a `NottableString`.
#[derive(Debug, Clone)]
pub struct CompiledNottable {
    kind: ValueKind,
    not: bool,
}

impl CompiledNottable {
    pub fn compile(value: &NottableString, ignore_case: bool) -> Result<Self, MatcherError> {
        match value {
            NottableString::Plain { value, not } => Ok(Self {
                kind: ValueKind::Text {
                    raw: value.clone(),
                    lower: value.to_lowercase(),
                    regex: full_match_regex(value, ignore_case).map(Arc::new),
                    ignore_case,
                },
                not: *not,
            }),
            NottableString::Schema { schema, not } => Ok(Self {
                kind: ValueKind::Schema(Arc::new(JsonSchema::new(schema.clone())?)),
                not: *not,
            }),
        }
    }

    pub fn is_not(&self) -> bool {
        self.not
    }

    pub fn schema(&self) -> Option<&JsonSchema> {
        match &self.kind {
            ValueKind::Schema(schema) => Some(schema),
            ValueKind::Text { .. } => None,
        }
    }

    /// Match ignoring the negation flag.
    pub fn matches_raw(&self, actual: &str) -> bool {
        match &self.kind {
            ValueKind::Text {
                raw,
                lower,
                regex,
                ignore_case,
            } => {
                let equal = if *ignore_case {
                    actual.to_lowercase() == *lower
                } else {
                    actual == raw
                };
                equal || regex.as_ref().is_some_and(|r| r.is_match(actual))
            }
            ValueKind::Schema(schema) => schema.is_valid_text(actual),
        }
    }

    /// Match honouring the negation flag.
    pub fn matches(&self, actual: &str) -> bool {
        self.matches_raw(actual) != self.not
    }
}

/// Compile `^(?:pattern)$`, skipping plain literals and invalid patterns.
pub(crate) fn full_match_regex(pattern: &str, ignore_case: bool) -> Option<Regex> {
    if regex::escape(pattern) == pattern {
        return None;
    }
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(ignore_case)
        .dot_matches_new_line(true)
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(value: NottableString, ignore_case: bool) -> CompiledNottable {
        CompiledNottable::compile(&value, ignore_case).unwrap()
    }

    #[test]
    fn test_exact_and_regex() {
        let exact = compile(NottableString::string("some_path"), false);
        assert!(exact.matches("some_path"));
        assert!(!exact.matches("some_path_more"));

        let regex = compile(NottableString::string("some_path.*"), false);
        assert!(regex.matches("some_path"));
        assert!(regex.matches("some_path/extra"));
        assert!(!regex.matches("other/some_path"));
    }

    #[test]
    fn test_invalid_regex_falls_back_to_exact() {
        let value = compile(NottableString::string("a(b"), false);
        assert!(value.matches("a(b"));
        assert!(!value.matches("ab"));
    }

    #[test]
    fn test_negation() {
        let value = compile(NottableString::not("GET"), true);
        assert!(value.matches("POST"));
        assert!(!value.matches("get"));
        assert!(value.matches_raw("GET"));
    }

    #[test]
    fn test_case_insensitive() {
        let value = compile(NottableString::string("Content-Type"), true);
        assert!(value.matches("content-type"));
        let sensitive = compile(NottableString::string("Value"), false);
        assert!(!sensitive.matches("value"));
    }

    #[test]
    fn test_schema_value() {
        let value = compile(
            NottableString::schema(json!({"type": "integer", "minimum": 10})),
            false,
        );
        assert!(value.matches("12"));
        assert!(!value.matches("9"));
        assert!(!value.matches("abc"));
    }

    #[test]
    fn test_dot_matches_newline() {
        let value = compile(NottableString::string(".+"), false);
        assert!(value.matches("a\nb"));
        assert!(!value.matches(""));
    }
}
