//! Concrete requests and request matchers.

use super::body::{deserialize_body_matcher, BodyMatcher};
use super::multimap::{CookieMap, CookieMatchers, KeyMatchers, KeyToMultiValue, KeyToValue, MultiMap};
use super::nottable::NottableString;
use base64::Engine as _;
use bytes::Bytes;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A concrete HTTP request as received by the mock (and as recorded in the log).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "MultiMap::is_empty")]
    pub query_string_parameters: MultiMap,
    #[serde(default, skip_serializing_if = "MultiMap::is_empty")]
    pub headers: MultiMap,
    #[serde(default, skip_serializing_if = "CookieMap::is_empty")]
    pub cookies: CookieMap,
    #[serde(
        default,
        skip_serializing_if = "Bytes::is_empty",
        serialize_with = "serialize_raw_body",
        deserialize_with = "deserialize_raw_body"
    )]
    pub body: Bytes,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
}

fn default_keep_alive() -> bool {
    true
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            keep_alive: true,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        if name.eq_ignore_ascii_case("cookie") {
            self.cookies = CookieMap::parse_header([value]);
        }
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query_string_parameters.append(name, value);
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_first("content-type")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Path plus encoded query string.
    pub fn path_and_query(&self) -> String {
        if self.query_string_parameters.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query_string_parameters
            .iter()
            .flat_map(|(name, values)| {
                values.iter().map(move |v| {
                    format!("{}={}", urlencoding::encode(name), urlencoding::encode(v))
                })
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }

    /// Parse a raw query string into decoded parameters.
    pub fn parse_query(query: &str) -> MultiMap {
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(name), decode_component(value))
            })
            .collect()
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Bodies are recorded as text when valid UTF-8, base64 binary otherwise.
pub(crate) fn serialize_raw_body<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    match std::str::from_utf8(body) {
        Ok(text) => serializer.serialize_str(text),
        Err(_) => {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("type", "BINARY")?;
            map.serialize_entry(
                "base64Bytes",
                &base64::engine::general_purpose::STANDARD.encode(body),
            )?;
            map.end()
        }
    }
}

pub(crate) fn deserialize_raw_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let content = Option::<super::body::BodyContent>::deserialize(deserializer)?;
    Ok(content.map(|c| Bytes::from(c.bytes())).unwrap_or_default())
}

/// Field-wise predicate over an HTTP request. Unset fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<NottableString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<NottableString>,
    #[serde(default, skip_serializing_if = "KeyMatchers::is_empty")]
    pub path_parameters: KeyMatchers,
    #[serde(default, skip_serializing_if = "KeyMatchers::is_empty")]
    pub query_string_parameters: KeyMatchers,
    #[serde(default, skip_serializing_if = "KeyMatchers::is_empty")]
    pub headers: KeyMatchers,
    #[serde(default, skip_serializing_if = "CookieMatchers::is_empty")]
    pub cookies: CookieMatchers,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_body_matcher"
    )]
    pub body: Option<BodyMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<bool>,
}

impl RequestMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: impl Into<NottableString>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<NottableString>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<NottableString>, value: impl Into<NottableString>) -> Self {
        self.headers
            .0
            .push(KeyToMultiValue::new(name, vec![value.into()]));
        self
    }

    pub fn with_query(mut self, name: impl Into<NottableString>, value: impl Into<NottableString>) -> Self {
        self.query_string_parameters
            .0
            .push(KeyToMultiValue::new(name, vec![value.into()]));
        self
    }

    pub fn with_path_parameter(mut self, name: impl Into<NottableString>, value: NottableString) -> Self {
        self.path_parameters
            .0
            .push(KeyToMultiValue::new(name, vec![value]));
        self
    }

    pub fn with_cookie(mut self, name: impl Into<NottableString>, value: impl Into<NottableString>) -> Self {
        self.cookies.0.push(KeyToValue {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_body(mut self, body: BodyMatcher) -> Self {
        self.body = Some(body);
        self
    }

    /// An exact matcher describing a recorded request.
    ///
    /// Recorded text is regex-escaped so replay matches only the literal values.
    pub fn from_request(request: &HttpRequest) -> Self {
        let literal = |text: &str| NottableString::string(regex::escape(text));
        let key_matchers = |map: &MultiMap| {
            KeyMatchers(
                map.iter()
                    .map(|(name, values)| {
                        KeyToMultiValue::new(
                            literal(name),
                            values.iter().map(|v| literal(v.as_str())).collect(),
                        )
                    })
                    .collect(),
            )
        };
        Self {
            method: Some(literal(request.method.as_str())),
            path: Some(literal(request.path.as_str())),
            path_parameters: KeyMatchers::default(),
            query_string_parameters: key_matchers(&request.query_string_parameters),
            headers: key_matchers(&request.headers),
            cookies: CookieMatchers(
                request
                    .cookies
                    .entries()
                    .iter()
                    .map(|(n, v)| KeyToValue {
                        name: literal(n.as_str()),
                        value: literal(v.as_str()),
                    })
                    .collect(),
            ),
            body: (!request.body.is_empty()).then(|| match std::str::from_utf8(&request.body) {
                Ok(text) => BodyMatcher::exact(text),
                Err(_) => BodyMatcher::Binary {
                    base64_bytes: base64::engine::general_purpose::STANDARD.encode(&request.body),
                    not: false,
                },
            }),
            secure: None,
            keep_alive: None,
        }
    }
}

/// Reference to an OpenAPI document and optionally one of its operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OpenApiDefinition {
    /// Inline document (JSON object, or JSON/YAML text) or a file path.
    pub spec_url_or_payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

/// What an expectation, clear or verification selects requests by.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestDefinition {
    Matcher(RequestMatcher),
    OpenApi(OpenApiDefinition),
}

impl Default for RequestDefinition {
    fn default() -> Self {
        RequestDefinition::Matcher(RequestMatcher::default())
    }
}

impl From<RequestMatcher> for RequestDefinition {
    fn from(matcher: RequestMatcher) -> Self {
        RequestDefinition::Matcher(matcher)
    }
}

impl From<OpenApiDefinition> for RequestDefinition {
    fn from(definition: OpenApiDefinition) -> Self {
        RequestDefinition::OpenApi(definition)
    }
}

impl Serialize for RequestDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RequestDefinition::Matcher(m) => m.serialize(serializer),
            RequestDefinition::OpenApi(d) => d.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RequestDefinition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let is_openapi = raw
            .as_object()
            .map(|o| o.contains_key("specUrlOrPayload"))
            .unwrap_or(false);
        if is_openapi {
            serde_json::from_value(raw)
                .map(RequestDefinition::OpenApi)
                .map_err(D::Error::custom)
        } else {
            serde_json::from_value(raw)
                .map(RequestDefinition::Matcher)
                .map_err(D::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query_decodes() {
        let params = HttpRequest::parse_query("a=1&b=hello%20world&a=2&c=x+y&flag");
        assert_eq!(params.get("a").unwrap(), &["1".to_string(), "2".to_string()]);
        assert_eq!(params.get_first("b"), Some("hello world"));
        assert_eq!(params.get_first("c"), Some("x y"));
        assert_eq!(params.get_first("flag"), Some(""));
    }

    #[test]
    fn test_path_and_query() {
        let req = HttpRequest::new("GET", "/p").with_query("q", "a b");
        assert_eq!(req.path_and_query(), "/p?q=a%20b");
    }

    #[test]
    fn test_request_body_serialization() {
        let req = HttpRequest::new("POST", "/p").with_body("hi");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["body"], json!("hi"));

        let binary = HttpRequest::new("POST", "/p").with_body(vec![0xff, 0x00]);
        let value = serde_json::to_value(&binary).unwrap();
        assert_eq!(value["body"]["type"], json!("BINARY"));
        let back: HttpRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back.body.as_ref(), &[0xff, 0x00]);
    }

    #[test]
    fn test_request_definition_detects_openapi() {
        let def: RequestDefinition = serde_json::from_value(json!({
            "specUrlOrPayload": "openapi.yaml",
            "operationId": "listPets"
        }))
        .unwrap();
        assert!(matches!(def, RequestDefinition::OpenApi(_)));

        let def: RequestDefinition = serde_json::from_value(json!({"path": "/x"})).unwrap();
        assert_eq!(
            def,
            RequestDefinition::Matcher(RequestMatcher::new().with_path("/x"))
        );
    }

    #[test]
    fn test_matcher_rejects_unknown_fields() {
        assert!(serde_json::from_value::<RequestMatcher>(json!({"pathx": "/x"})).is_err());
    }

    #[test]
    fn test_from_request_is_exact() {
        let req = HttpRequest::new("GET", "/a").with_header("x", "1").with_body("b");
        let matcher = RequestMatcher::from_request(&req);
        assert_eq!(matcher.path, Some(NottableString::string("/a")));
        assert_eq!(matcher.body, Some(BodyMatcher::exact("b")));
        assert_eq!(matcher.headers.0.len(), 1);
        assert!(matcher.path_parameters.is_empty());
    }

    #[test]
    fn test_from_request_escapes_regex_metacharacters() {
        let req = HttpRequest::new("GET", "/a+b")
            .with_query("q", "(x)")
            .with_cookie("s", "a.b");
        let matcher = RequestMatcher::from_request(&req);
        assert_eq!(matcher.path, Some(NottableString::string(r"/a\+b")));
        assert_eq!(
            matcher.query_string_parameters.0[0].values,
            vec![NottableString::string(r"\(x\)")]
        );
        assert_eq!(matcher.cookies.0[0].value, NottableString::string(r"a\.b"));
    }
}
