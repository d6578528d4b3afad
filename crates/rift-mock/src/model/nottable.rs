//! Negatable string values used for names and values in request matchers.
//!
//! Wire forms accepted:
//! - `"value"` - plain value (exact or full regex match)
//! - `"!value"` - negated plain value
//! - `{"not": true, "value": "value"}` - explicit negation
//! - `{"schema": {...}}` - value validated against a JSON schema (optionally `"not": true`)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A matcher value that may be negated or schema-typed.
#[derive(Debug, Clone, PartialEq)]
pub enum NottableString {
    Plain { value: String, not: bool },
    Schema { schema: Value, not: bool },
}

impl NottableString {
    pub fn string(value: impl Into<String>) -> Self {
        NottableString::Plain {
            value: value.into(),
            not: false,
        }
    }

    pub fn not(value: impl Into<String>) -> Self {
        NottableString::Plain {
            value: value.into(),
            not: true,
        }
    }

    pub fn schema(schema: Value) -> Self {
        NottableString::Schema { schema, not: false }
    }

    pub fn is_not(&self) -> bool {
        match self {
            NottableString::Plain { not, .. } | NottableString::Schema { not, .. } => *not,
        }
    }

    /// The plain value, if this is not a schema.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NottableString::Plain { value, .. } => Some(value),
            NottableString::Schema { .. } => None,
        }
    }

    /// Plain, non-negated value usable as a concrete request value.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            NottableString::Plain { value, not: false } => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for NottableString {
    fn from(value: &str) -> Self {
        NottableString::string(value)
    }
}

impl From<String> for NottableString {
    fn from(value: String) -> Self {
        NottableString::string(value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Text(String),
    Object {
        #[serde(default)]
        not: bool,
        value: Option<String>,
        schema: Option<Value>,
    },
}

impl<'de> Deserialize<'de> for NottableString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => match text.strip_prefix('!') {
                Some(rest) if !rest.is_empty() => Ok(NottableString::not(rest)),
                _ => Ok(NottableString::string(text)),
            },
            Repr::Object {
                not,
                schema: Some(schema),
                ..
            } => Ok(NottableString::Schema { schema, not }),
            Repr::Object {
                not,
                value: Some(value),
                ..
            } => Ok(NottableString::Plain { value, not }),
            Repr::Object { .. } => Err(serde::de::Error::custom(
                "expected a string, {\"not\", \"value\"} or {\"schema\"}",
            )),
        }
    }
}

impl Serialize for NottableString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match self {
            NottableString::Plain { value, not: false } => serializer.serialize_str(value),
            NottableString::Plain { value, not: true } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("not", &true)?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            NottableString::Schema { schema, not } => {
                let mut map = serializer.serialize_map(None)?;
                if *not {
                    map.serialize_entry("not", &true)?;
                }
                map.serialize_entry("schema", schema)?;
                map.end()
            }
        }
    }
}
