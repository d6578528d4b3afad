//! Body types: matcher bodies for requests and concrete bodies for responses.

use base64::Engine as _;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Structural comparison mode for JSON and XML bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    /// Full structural equality.
    Strict,
    /// Only the fields present in the expected document must match.
    #[default]
    OnlyMatchingFields,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_default_match_type(m: &MatchType) -> bool {
    *m == MatchType::OnlyMatchingFields
}

/// Request body matcher.
///
/// A bare JSON string deserializes as `String`; a JSON object without a `type`
/// field deserializes as `Json` in subset mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BodyMatcher {
    #[serde(rename_all = "camelCase")]
    String {
        string: String,
        #[serde(default, skip_serializing_if = "is_false")]
        sub_string: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        not: bool,
    },
    #[serde(rename_all = "camelCase")]
    Regex {
        regex: String,
        #[serde(default, skip_serializing_if = "is_false")]
        not: bool,
    },
    #[serde(rename_all = "camelCase")]
    Json {
        json: Value,
        #[serde(default, skip_serializing_if = "is_default_match_type")]
        match_type: MatchType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        not: bool,
    },
    #[serde(rename_all = "camelCase")]
    Xml {
        xml: String,
        #[serde(default, skip_serializing_if = "is_default_match_type")]
        match_type: MatchType,
        #[serde(default, skip_serializing_if = "is_false")]
        not: bool,
    },
    #[serde(rename_all = "camelCase")]
    JsonSchema {
        json_schema: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        not: bool,
    },
    #[serde(rename_all = "camelCase")]
    XmlSchema {
        xml_schema: String,
        #[serde(default, skip_serializing_if = "is_false")]
        not: bool,
    },
    #[serde(rename_all = "camelCase")]
    Binary {
        base64_bytes: String,
        #[serde(default, skip_serializing_if = "is_false")]
        not: bool,
    },
}

impl BodyMatcher {
    pub fn exact(text: impl Into<String>) -> Self {
        BodyMatcher::String {
            string: text.into(),
            sub_string: false,
            not: false,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        BodyMatcher::Regex {
            regex: pattern.into(),
            not: false,
        }
    }

    pub fn json(json: Value, match_type: MatchType) -> Self {
        BodyMatcher::Json {
            json,
            match_type,
            content_type: None,
            not: false,
        }
    }

    pub fn is_not(&self) -> bool {
        match self {
            BodyMatcher::String { not, .. }
            | BodyMatcher::Regex { not, .. }
            | BodyMatcher::Json { not, .. }
            | BodyMatcher::Xml { not, .. }
            | BodyMatcher::JsonSchema { not, .. }
            | BodyMatcher::XmlSchema { not, .. }
            | BodyMatcher::Binary { not, .. } => *not,
        }
    }

    /// Return a copy with the negation flag set.
    pub fn negated(mut self) -> Self {
        match &mut self {
            BodyMatcher::String { not, .. }
            | BodyMatcher::Regex { not, .. }
            | BodyMatcher::Json { not, .. }
            | BodyMatcher::Xml { not, .. }
            | BodyMatcher::JsonSchema { not, .. }
            | BodyMatcher::XmlSchema { not, .. }
            | BodyMatcher::Binary { not, .. } => *not = true,
        }
        self
    }

    /// The literal body text this matcher describes, when it describes exactly one.
    pub fn as_literal(&self) -> Option<Vec<u8>> {
        match self {
            BodyMatcher::String {
                string,
                sub_string: false,
                not: false,
            } => Some(string.as_bytes().to_vec()),
            BodyMatcher::Json {
                json, not: false, ..
            } => Some(json_text(json).into_bytes()),
            BodyMatcher::Xml { xml, not: false, .. } => Some(xml.as_bytes().to_vec()),
            BodyMatcher::Binary {
                base64_bytes,
                not: false,
            } => base64::engine::general_purpose::STANDARD
                .decode(base64_bytes)
                .ok(),
            _ => None,
        }
    }
}

/// Parsed through a JSON value so the shorthand forms can be recognized.
pub(crate) fn deserialize_body_matcher<'de, D>(deserializer: D) -> Result<Option<BodyMatcher>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(BodyMatcher::exact(text))),
        Some(Value::Object(map)) if map.contains_key("type") => {
            serde_json::from_value(Value::Object(map))
                .map(Some)
                .map_err(D::Error::custom)
        }
        Some(other) => Ok(Some(BodyMatcher::json(other, MatchType::OnlyMatchingFields))),
    }
}

/// Concrete body carried by a response or an override.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyContent {
    Text {
        text: String,
        content_type: Option<String>,
    },
    Json {
        json: Value,
        content_type: Option<String>,
    },
    Xml {
        xml: String,
        content_type: Option<String>,
    },
    Binary {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
}

impl BodyContent {
    pub fn text(text: impl Into<String>) -> Self {
        BodyContent::Text {
            text: text.into(),
            content_type: None,
        }
    }

    pub fn json(json: Value) -> Self {
        BodyContent::Json {
            json,
            content_type: None,
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        match self {
            BodyContent::Text { text, .. } => text.as_bytes().to_vec(),
            BodyContent::Json { json, .. } => json_text(json).into_bytes(),
            BodyContent::Xml { xml, .. } => xml.as_bytes().to_vec(),
            BodyContent::Binary { bytes, .. } => bytes.clone(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            BodyContent::Text { content_type, .. }
            | BodyContent::Json { content_type, .. }
            | BodyContent::Xml { content_type, .. }
            | BodyContent::Binary { content_type, .. } => content_type.as_deref(),
        }
    }

    /// Build the most specific body for raw bytes: text when UTF-8, binary otherwise.
    pub fn from_bytes(bytes: &[u8], content_type: Option<&str>) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        let content_type = content_type.map(str::to_string);
        Some(match std::str::from_utf8(bytes) {
            Ok(text) => BodyContent::Text {
                text: text.to_string(),
                content_type,
            },
            Err(_) => BodyContent::Binary {
                bytes: bytes.to_vec(),
                content_type,
            },
        })
    }
}

/// JSON bodies given as strings are kept verbatim.
fn json_text(json: &Value) -> String {
    match json {
        Value::String(s) => s.clone(),
        other => crate::json_format::to_pretty_json(other),
    }
}

impl Serialize for BodyContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match self {
            BodyContent::Text {
                text,
                content_type: None,
            } => serializer.serialize_str(text),
            _ => {
                let mut map = serializer.serialize_map(None)?;
                match self {
                    BodyContent::Text { text, .. } => {
                        map.serialize_entry("type", "STRING")?;
                        map.serialize_entry("string", text)?;
                    }
                    BodyContent::Json { json, .. } => {
                        map.serialize_entry("type", "JSON")?;
                        map.serialize_entry("json", json)?;
                    }
                    BodyContent::Xml { xml, .. } => {
                        map.serialize_entry("type", "XML")?;
                        map.serialize_entry("xml", xml)?;
                    }
                    BodyContent::Binary { bytes, .. } => {
                        map.serialize_entry("type", "BINARY")?;
                        map.serialize_entry(
                            "base64Bytes",
                            &base64::engine::general_purpose::STANDARD.encode(bytes),
                        )?;
                    }
                }
                if let Some(content_type) = self.content_type() {
                    map.serialize_entry("contentType", content_type)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for BodyContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let mut map = match raw {
            Value::String(text) => return Ok(BodyContent::text(text)),
            Value::Object(map) if map.contains_key("type") => map,
            other => return Ok(BodyContent::json(other)),
        };
        let content_type = match map.remove("contentType") {
            Some(Value::String(ct)) => Some(ct),
            _ => None,
        };
        let kind = map
            .remove("type")
            .and_then(|t| t.as_str().map(str::to_string))
            .unwrap_or_default();
        let field = |map: &mut serde_json::Map<String, Value>, key: &str| {
            map.remove(key)
                .ok_or_else(|| D::Error::custom(format!("{kind} body is missing \"{key}\"")))
        };
        match kind.as_str() {
            "STRING" => Ok(BodyContent::Text {
                text: value_string(field(&mut map, "string")?),
                content_type,
            }),
            "JSON" => Ok(BodyContent::Json {
                json: field(&mut map, "json")?,
                content_type,
            }),
            "XML" => Ok(BodyContent::Xml {
                xml: value_string(field(&mut map, "xml")?),
                content_type,
            }),
            "BINARY" => {
                let encoded = value_string(field(&mut map, "base64Bytes")?);
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(D::Error::custom)?;
                Ok(BodyContent::Binary {
                    bytes,
                    content_type,
                })
            }
            other => Err(D::Error::custom(format!("unsupported body type {other}"))),
        }
    }
}

fn value_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
