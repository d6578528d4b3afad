//! Request matching engine.
//!
//! Wire-level `RequestMatcher`s are compiled once, when an expectation is stored,
//! into `CompiledRequestMatcher`s that hold pre-built regexes, schemas and parsed
//! documents. Matching a request against a compiled matcher never fails: any
//! problem with the matcher itself is reported at compile time.
//!
//! # Module Structure
//!
//! - `string_matcher` - Negatable exact / regex / schema string values
//! - `json_schema` - JSON schema validation via `jsonschema`, with OpenAPI 3.0 keywords rewritten
//! - `field_matcher` - Headers, query parameters, path parameters and cookies
//! - `path_matcher` - Literal, regex and `{name}` templated paths
//! - `json_match` - Strict and subset JSON comparison
//! - `xml` / `xml_schema` - XML comparison and XSD validation
//! - `body_matcher` - Body matchers of every type
//! - `request` - Compiled request matchers and matcher compatibility

mod body_matcher;
mod field_matcher;
mod json_match;
mod json_schema;
mod path_matcher;
mod request;
mod string_matcher;
mod xml;
mod xml_schema;

#[allow(unused_imports)]
pub use body_matcher::{media_type_matches, CompiledBodyMatcher};
#[allow(unused_imports)]
pub use field_matcher::{CompiledCookieMatchers, CompiledKeyMatchers};
#[allow(unused_imports)]
pub use json_match::json_matches;
#[allow(unused_imports)]
pub use json_schema::{JsonSchema, SchemaViolation};
#[allow(unused_imports)]
pub use path_matcher::CompiledPathMatcher;
#[allow(unused_imports)]
pub use request::{CompiledMatcher, CompiledRequestMatcher};
#[allow(unused_imports)]
pub use string_matcher::CompiledNottable;
#[allow(unused_imports)]
pub use xml::{parse_document, xml_matches, XmlElement};
#[allow(unused_imports)]
pub use xml_schema::XmlSchema;

/// JSON type name as used in validation messages.
pub(crate) fn type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Errors raised while compiling a matcher.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("invalid regex {pattern}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid json schema: {0}")]
    InvalidSchema(String),
    #[error("invalid xml: {0}")]
    InvalidXml(String),
    #[error("invalid xml schema: {0}")]
    InvalidXmlSchema(String),
    #[error("invalid base64 body: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error(transparent)]
    OpenApi(#[from] crate::openapi::OpenApiError),
}
