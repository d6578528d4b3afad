//! Body matching for every `BodyMatcher` type.

use super::json_match::json_matches;
use super::json_schema::JsonSchema;
use super::xml::{parse_document, xml_matches, XmlElement};
use super::xml_schema::XmlSchema;
use super::MatcherError;
use crate::model::{BodyMatcher, MatchType};
use base64::Engine as _;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum BodyKind {
    Exact(String),
    SubString(String),
    Regex(Arc<Regex>),
    Json { expected: Value, mode: MatchType },
    Xml { expected: Arc<XmlElement>, mode: MatchType },
    JsonSchema(Arc<JsonSchema>),
    XmlSchema(Arc<XmlSchema>),
    Binary(Vec<u8>),
}

/// Compiled body matcher.
#[derive(Debug, Clone)]
pub struct CompiledBodyMatcher {
    kind: BodyKind,
    not: bool,
    content_type: Option<String>,
}

impl CompiledBodyMatcher {
    pub fn compile(matcher: &BodyMatcher) -> Result<Self, MatcherError> {
        let mut content_type = None;
        let kind = match matcher {
            BodyMatcher::String {
                string, sub_string, ..
            } => {
                if *sub_string {
                    BodyKind::SubString(string.clone())
                } else {
                    BodyKind::Exact(string.clone())
                }
            }
            BodyMatcher::Regex { regex, .. } => {
                let compiled = RegexBuilder::new(&format!("^(?:{regex})$"))
                    .dot_matches_new_line(true)
                    .build()
                    .map_err(|source| MatcherError::InvalidRegex {
                        pattern: regex.clone(),
                        source,
                    })?;
                BodyKind::Regex(Arc::new(compiled))
            }
            BodyMatcher::Json {
                json,
                match_type,
                content_type: ct,
                ..
            } => {
                content_type = ct.clone();
                let expected = match json {
                    // JSON given as text is parsed once here
                    Value::String(text) => serde_json::from_str(text)
                        .map_err(|e| MatcherError::InvalidJson(e.to_string()))?,
                    other => other.clone(),
                };
                BodyKind::Json {
                    expected,
                    mode: *match_type,
                }
            }
            BodyMatcher::Xml { xml, match_type, .. } => BodyKind::Xml {
                expected: Arc::new(parse_document(xml)?),
                mode: *match_type,
            },
            BodyMatcher::JsonSchema {
                json_schema,
                content_type: ct,
                ..
            } => {
                content_type = ct.clone();
                BodyKind::JsonSchema(Arc::new(JsonSchema::new(json_schema.clone())?))
            }
            BodyMatcher::XmlSchema { xml_schema, .. } => {
                BodyKind::XmlSchema(Arc::new(XmlSchema::new(xml_schema)?))
            }
            BodyMatcher::Binary { base64_bytes, .. } => {
                BodyKind::Binary(base64::engine::general_purpose::STANDARD.decode(base64_bytes)?)
            }
        };
        Ok(Self {
            kind,
            not: matcher.is_not(),
            content_type,
        })
    }

    pub fn matches(&self, body: &[u8], content_type: Option<&str>) -> bool {
        let content_type_ok = match (&self.content_type, content_type) {
            (None, _) => true,
            (Some(expected), Some(actual)) => media_type_matches(expected, actual),
            (Some(_), None) => false,
        };
        (content_type_ok && self.body_matches(body)) != self.not
    }

    fn body_matches(&self, body: &[u8]) -> bool {
        match &self.kind {
            BodyKind::Binary(expected) => body == expected.as_slice(),
            BodyKind::Exact(expected) => body == expected.as_bytes(),
            kind => {
                let text = String::from_utf8_lossy(body);
                match kind {
                    BodyKind::SubString(expected) => text.contains(expected.as_str()),
                    BodyKind::Regex(regex) => regex.is_match(&text),
                    BodyKind::Json { expected, mode } => serde_json::from_str::<Value>(&text)
                        .is_ok_and(|actual| json_matches(expected, &actual, *mode)),
                    BodyKind::JsonSchema(schema) => {
                        let instance = serde_json::from_str::<Value>(&text)
                            .unwrap_or_else(|_| Value::String(text.to_string()));
                        schema.is_valid(&instance)
                    }
                    BodyKind::Xml { expected, mode } => {
                        parse_document(&text).is_ok_and(|actual| xml_matches(expected, &actual, *mode))
                    }
                    BodyKind::XmlSchema(schema) => schema.is_valid_text(&text),
                    BodyKind::Exact(_) | BodyKind::Binary(_) => false,
                }
            }
        }
    }
}

/// Compare media types, ignoring `charset` parameters and case.
///
/// `application/json; charset=utf-8` matches `application/json`; anything else
/// (including look-alike vendor types) must be identical.
pub fn media_type_matches(expected: &str, actual: &str) -> bool {
    normalize_media_type(expected) == normalize_media_type(actual)
}

fn normalize_media_type(value: &str) -> String {
    value
        .split(';')
        .map(str::trim)
        .enumerate()
        .filter(|(i, part)| {
            *i == 0 || (!part.is_empty() && !part.to_ascii_lowercase().starts_with("charset="))
        })
        .map(|(_, part)| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}
