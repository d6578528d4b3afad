//! Control-plane payload validation.
//!
//! Payloads are checked structurally before they are deserialized so that every
//! problem is reported at once, as an itemized list with JSON paths:
//!
//! ```text
//! incorrect expectation json format for:
//!
//!   { ... }
//!
//!  schema validation errors:
//!
//!   2 errors:
//!    - $.httpResponse.statusCode: string found, integer expected
//!    - $.incorrectField: is not defined in the schema and the schema does not allow additional properties
//! ```

use crate::json_format::{indent_lines, to_pretty_json};
use crate::matcher::type_name;
use crate::model::{Expectation, HttpTemplate, OpenApiExpectation, RequestDefinition, ACTION_KEYS};
use crate::verify::{Verification, VerificationSequence};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;

const TIME_UNITS: [&str; 7] = [
    "NANOSECONDS",
    "MICROSECONDS",
    "MILLISECONDS",
    "SECONDS",
    "MINUTES",
    "HOURS",
    "DAYS",
];
const TEMPLATE_TYPES: [&str; 2] = ["MUSTACHE", "RHAI"];
const SCHEMES: [&str; 2] = ["HTTP", "HTTPS"];

/// A payload that failed validation, with every problem found.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// What the payload was meant to be ("expectation", "request matcher", ...)
    pub subject: &'static str,
    /// The payload as received
    pub input: String,
    pub errors: Vec<String>,
}

impl ValidationError {
    pub fn new(subject: &'static str, input: impl Into<String>, mut errors: Vec<String>) -> Self {
        errors.sort();
        errors.dedup();
        Self {
            subject,
            input: input.into(),
            errors,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.errors.len();
        write!(
            f,
            "incorrect {} json format for:\n\n  {}\n\n schema validation errors:\n\n  {} error{}:",
            self.subject,
            indent_lines(self.input.trim(), "  "),
            count,
            if count == 1 { "" } else { "s" }
        )?;
        for error in &self.errors {
            write!(f, "\n   - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Accumulates problems found while walking a payload.
#[derive(Debug, Default)]
pub struct Checker {
    errors: Vec<String>,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, path: &str, message: impl fmt::Display) {
        self.errors.push(format!("{path}: {message}"));
    }

    fn wrong_type(&mut self, path: &str, value: &Value, expected: &str) {
        self.error(path, format_args!("{} found, {expected} expected", type_name(value)));
    }

    /// The value as an object, reporting anything else.
    pub fn object<'v>(&mut self, path: &str, value: &'v Value) -> Option<&'v Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            other => {
                self.wrong_type(path, other, "object");
                None
            }
        }
    }

    pub fn unknown_fields(&mut self, path: &str, map: &Map<String, Value>, allowed: &[&str]) {
        for key in map.keys().filter(|k| !allowed.contains(&k.as_str())) {
            self.error(
                &format!("{path}.{key}"),
                "is not defined in the schema and the schema does not allow additional properties",
            );
        }
    }

    pub fn required(&mut self, path: &str, map: &Map<String, Value>, key: &str) {
        if !map.contains_key(key) {
            self.error(&format!("{path}.{key}"), "is missing but it is required");
        }
    }

    pub fn string(&mut self, path: &str, map: &Map<String, Value>, key: &str) {
        if let Some(value) = map.get(key).filter(|v| !v.is_string()) {
            self.wrong_type(&format!("{path}.{key}"), value, "string");
        }
    }

    pub fn boolean(&mut self, path: &str, map: &Map<String, Value>, key: &str) {
        if let Some(value) = map.get(key).filter(|v| !v.is_boolean()) {
            self.wrong_type(&format!("{path}.{key}"), value, "boolean");
        }
    }

    /// Integer, optionally non-negative.
    pub fn integer(&mut self, path: &str, map: &Map<String, Value>, key: &str, unsigned: bool) {
        let Some(value) = map.get(key) else {
            return;
        };
        let path = format!("{path}.{key}");
        match value.as_i64() {
            Some(n) if unsigned && n < 0 => self.error(&path, "must have a minimum value of 0"),
            Some(_) => {}
            None if value.as_u64().is_some() => {}
            None => self.wrong_type(&path, value, "integer"),
        }
    }

    pub fn one_of(&mut self, path: &str, map: &Map<String, Value>, key: &str, allowed: &[&str]) {
        let Some(value) = map.get(key) else {
            return;
        };
        let path = format!("{path}.{key}");
        match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(_) => self.error(
                &path,
                format_args!("does not have a value in the enumeration [{}]", allowed.join(", ")),
            ),
            None => self.wrong_type(&path, value, "string"),
        }
    }

    fn nottable(&mut self, path: &str, map: &Map<String, Value>, key: &str) {
        if let Some(value) = map.get(key).filter(|v| !v.is_string() && !v.is_object()) {
            self.wrong_type(&format!("{path}.{key}"), value, "string");
        }
    }

    fn key_values(&mut self, path: &str, map: &Map<String, Value>, key: &str) {
        if let Some(value) = map.get(key).filter(|v| !v.is_object() && !v.is_array()) {
            self.wrong_type(&format!("{path}.{key}"), value, "object");
        }
    }

    fn delay(&mut self, path: &str, map: &Map<String, Value>) {
        let Some(value) = map.get("delay") else {
            return;
        };
        let path = format!("{path}.delay");
        if let Some(delay) = self.object(&path, value) {
            self.unknown_fields(&path, delay, &["timeUnit", "value"]);
            self.required(&path, delay, "value");
            self.one_of(&path, delay, "timeUnit", &TIME_UNITS);
            self.integer(&path, delay, "value", true);
        }
    }

    /// A `RequestMatcher`, or an OpenAPI definition when `specUrlOrPayload` is present.
    pub fn request_definition(&mut self, path: &str, value: &Value) {
        let Some(map) = self.object(path, value) else {
            return;
        };
        if map.contains_key("specUrlOrPayload") {
            self.unknown_fields(path, map, &["specUrlOrPayload", "operationId"]);
            if let Some(spec) = map.get("specUrlOrPayload").filter(|v| !v.is_string() && !v.is_object()) {
                self.wrong_type(&format!("{path}.specUrlOrPayload"), spec, "string");
            }
            self.string(path, map, "operationId");
            return;
        }

        let before = self.errors.len();
        self.unknown_fields(
            path,
            map,
            &[
                "method",
                "path",
                "pathParameters",
                "queryStringParameters",
                "headers",
                "cookies",
                "body",
                "secure",
                "keepAlive",
            ],
        );
        self.nottable(path, map, "method");
        self.nottable(path, map, "path");
        for key in ["pathParameters", "queryStringParameters", "headers", "cookies"] {
            self.key_values(path, map, key);
        }
        self.boolean(path, map, "secure");
        self.boolean(path, map, "keepAlive");
        if self.errors.len() > before {
            // neither alternative fits, so report the OpenAPI one too
            self.error(
                &format!("{path}.specUrlOrPayload"),
                "is missing, but is required, if specifying OpenAPI request matcher",
            );
        }
    }

    fn response(&mut self, path: &str, value: &Value) {
        let Some(map) = self.object(path, value) else {
            return;
        };
        self.unknown_fields(
            path,
            map,
            &["statusCode", "reasonPhrase", "headers", "cookies", "body", "delay"],
        );
        self.integer(path, map, "statusCode", true);
        self.string(path, map, "reasonPhrase");
        self.key_values(path, map, "headers");
        self.key_values(path, map, "cookies");
        self.delay(path, map);
    }

    fn forward(&mut self, path: &str, value: &Value) {
        let Some(map) = self.object(path, value) else {
            return;
        };
        self.unknown_fields(path, map, &["host", "port", "scheme", "delay"]);
        self.required(path, map, "host");
        self.string(path, map, "host");
        self.integer(path, map, "port", true);
        self.one_of(path, map, "scheme", &SCHEMES);
        self.delay(path, map);
    }

    fn override_forward(&mut self, path: &str, value: &Value) {
        let Some(map) = self.object(path, value) else {
            return;
        };
        self.unknown_fields(
            path,
            map,
            &[
                "requestOverride",
                "httpRequest",
                "requestModifier",
                "responseOverride",
                "httpResponse",
                "responseModifier",
                "delay",
            ],
        );
        for key in [
            "requestOverride",
            "httpRequest",
            "requestModifier",
            "responseOverride",
            "httpResponse",
            "responseModifier",
        ] {
            if let Some(value) = map.get(key) {
                self.object(&format!("{path}.{key}"), value);
            }
        }
        self.delay(path, map);
    }

    fn template(&mut self, path: &str, value: &Value) {
        let Some(map) = self.object(path, value) else {
            return;
        };
        self.unknown_fields(path, map, &["templateType", "template", "delay"]);
        self.required(path, map, "templateType");
        self.required(path, map, "template");
        self.one_of(path, map, "templateType", &TEMPLATE_TYPES);
        self.string(path, map, "template");
        self.delay(path, map);
        if !self.is_clean() {
            return;
        }
        if let Ok(template) = serde_json::from_value::<HttpTemplate>(value.clone()) {
            if let Err(e) = crate::template::check_syntax(&template) {
                self.error(&format!("{path}.template"), e);
            }
        }
    }

    fn callback(&mut self, path: &str, value: &Value) {
        let Some(map) = self.object(path, value) else {
            return;
        };
        self.unknown_fields(path, map, &["callbackName", "delay"]);
        self.required(path, map, "callbackName");
        self.string(path, map, "callbackName");
        self.delay(path, map);
    }

    fn times(&mut self, path: &str, map: &Map<String, Value>) {
        if let Some(value) = map.get("times") {
            let path = format!("{path}.times");
            if let Some(times) = self.object(&path, value) {
                self.unknown_fields(&path, times, &["remainingTimes", "unlimited"]);
                self.integer(&path, times, "remainingTimes", true);
                self.boolean(&path, times, "unlimited");
            }
        }
        if let Some(value) = map.get("timeToLive") {
            let path = format!("{path}.timeToLive");
            if let Some(ttl) = self.object(&path, value) {
                self.unknown_fields(&path, ttl, &["timeUnit", "timeToLive", "unlimited"]);
                self.one_of(&path, ttl, "timeUnit", &TIME_UNITS);
                self.integer(&path, ttl, "timeToLive", true);
                self.boolean(&path, ttl, "unlimited");
            }
        }
    }

    /// One expectation object.
    pub fn expectation(&mut self, value: &Value) {
        let Some(map) = self.object("$", value) else {
            return;
        };
        let mut allowed = vec!["id", "priority", "httpRequest", "times", "timeToLive"];
        allowed.extend(ACTION_KEYS.iter().map(|(key, _)| *key));
        self.unknown_fields("$", map, &allowed);
        self.string("$", map, "id");
        self.integer("$", map, "priority", false);
        if let Some(request) = map.get("httpRequest") {
            self.request_definition("$.httpRequest", request);
        }
        self.times("$", map);

        let present: Vec<&str> = ACTION_KEYS
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| map.contains_key(*key))
            .collect();
        if present.len() != 1 {
            if present.is_empty() {
                for (key, kind) in ACTION_KEYS {
                    self.error(
                        &format!("$.{key}"),
                        format_args!("is missing, but is required, if specifying action of type {kind}"),
                    );
                }
            }
            let keys: Vec<&str> = ACTION_KEYS.iter().map(|(key, _)| *key).collect();
            self.errors.push(format!(
                "oneOf of the following must be specified [{}]",
                keys.join(", ")
            ));
        }
        for key in present {
            let path = format!("$.{key}");
            let value = &map[key];
            match key {
                "httpResponse" => self.response(&path, value),
                "httpForward" => self.forward(&path, value),
                "httpOverrideForwardedRequest" => self.override_forward(&path, value),
                "httpResponseTemplate" | "httpForwardTemplate" => self.template(&path, value),
                _ => self.callback(&path, value),
            }
        }
    }

    pub fn openapi_expectation(&mut self, value: &Value) {
        let Some(map) = self.object("$", value) else {
            return;
        };
        self.unknown_fields("$", map, &["specUrlOrPayload", "operationsAndResponses"]);
        if !map.contains_key("specUrlOrPayload") {
            self.error(
                "$.specUrlOrPayload",
                "is missing, but is required, if specifying OpenAPI expectation",
            );
        }
        if let Some(ops) = map.get("operationsAndResponses") {
            if let Some(ops) = self.object("$.operationsAndResponses", ops) {
                for key in ops.keys() {
                    self.string("$.operationsAndResponses", ops, key);
                }
            }
        }
    }
}

/// Parse `body` as JSON, check it with `rules`, then deserialize it.
pub fn parse_with<T: DeserializeOwned>(
    subject: &'static str,
    body: &str,
    rules: impl Fn(&mut Checker, &Value),
) -> Result<T, ValidationError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ValidationError::new(subject, body, vec![format!("$: {e}")]))?;
    check_value(subject, body, &value, &rules)
}

fn check_value<T: DeserializeOwned>(
    subject: &'static str,
    input: &str,
    value: &Value,
    rules: &impl Fn(&mut Checker, &Value),
) -> Result<T, ValidationError> {
    let mut checker = Checker::new();
    rules(&mut checker, value);
    if !checker.is_clean() {
        return Err(ValidationError::new(subject, input, checker.errors));
    }
    serde_json::from_value(value.clone())
        .map_err(|e| ValidationError::new(subject, input, vec![format!("$: {e}")]))
}

/// One expectation or an array of them.
pub fn parse_expectations(body: &str) -> Result<Vec<Expectation>, ValidationError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ValidationError::new("expectation", body, vec![format!("$: {e}")]))?;
    match &value {
        Value::Array(items) => items
            .iter()
            .map(|item| check_value("expectation", &to_pretty_json(item), item, &Checker::expectation))
            .collect(),
        single => Ok(vec![check_value("expectation", body, single, &Checker::expectation)?]),
    }
}

pub fn parse_openapi_expectation(body: &str) -> Result<OpenApiExpectation, ValidationError> {
    parse_with("openapi expectation", body, Checker::openapi_expectation)
}

pub fn parse_request_definition(body: &str) -> Result<RequestDefinition, ValidationError> {
    parse_with("request matcher", body, |checker, value| {
        checker.request_definition("$", value)
    })
}

const VERIFICATION_FIELDS: [&str; 4] = [
    "httpRequest",
    "expectationId",
    "times",
    "maximumNumberOfRequestToReturnInVerificationFailure",
];

const SEQUENCE_FIELDS: [&str; 3] = [
    "httpRequests",
    "expectationIds",
    "maximumNumberOfRequestToReturnInVerificationFailure",
];

pub fn parse_verification(body: &str) -> Result<Verification, ValidationError> {
    parse_with("verification", body, |checker, value| {
        let Some(map) = checker.object("$", value) else {
            return;
        };
        checker.unknown_fields("$", map, &VERIFICATION_FIELDS);
        if let Some(request) = map.get("httpRequest") {
            checker.request_definition("$.httpRequest", request);
        }
        if let Some(times) = map.get("times") {
            checker.object("$.times", times);
        }
    })
}

pub fn parse_verification_sequence(body: &str) -> Result<VerificationSequence, ValidationError> {
    parse_with("verification sequence", body, |checker, value| {
        let Some(map) = checker.object("$", value) else {
            return;
        };
        checker.unknown_fields("$", map, &SEQUENCE_FIELDS);
        match map.get("httpRequests") {
            Some(Value::Array(requests)) => {
                for (i, request) in requests.iter().enumerate() {
                    checker.request_definition(&format!("$.httpRequests[{i}]"), request);
                }
            }
            Some(other) => checker.error("$.httpRequests", format_args!("{} found, array expected", type_name(other))),
            None => {}
        }
    })
}
