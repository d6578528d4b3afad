//! Operations of a resolved OpenAPI document and their request matchers.

use crate::model::{BodyMatcher, KeyToMultiValue, KeyToValue, NottableString, RequestMatcher};
use serde_json::Value;

/// Path item keys that hold operations, in the order operations are listed.
const METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// The declared `operationId`, or `METHOD path` when absent.
    pub operation_id: String,
    pub method: String,
    /// Full path template including the server base path.
    pub path: String,
    pub definition: Value,
    /// Path-level parameters merged with (and overridden by) operation-level ones.
    pub parameters: Vec<Value>,
}

impl Operation {
    pub fn responses(&self) -> Option<&serde_json::Map<String, Value>> {
        self.definition.get("responses").and_then(Value::as_object)
    }
}

/// Every operation in document order.
pub fn operations(document: &Value) -> Vec<Operation> {
    let base = base_path(document);
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (path, item) in paths {
        let shared = item
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for method in METHODS {
            let Some(definition) = item.get(method) else {
                continue;
            };
            let mut parameters = shared.clone();
            for param in definition
                .get("parameters")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                parameters.retain(|p| !same_parameter(p, param));
                parameters.push(param.clone());
            }
            let method = method.to_uppercase();
            let operation_id = definition
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{method} {path}"));
            out.push(Operation {
                operation_id,
                method,
                path: format!("{base}{path}"),
                definition: definition.clone(),
                parameters,
            });
        }
    }
    out
}

fn same_parameter(a: &Value, b: &Value) -> bool {
    a.get("name") == b.get("name") && a.get("in") == b.get("in")
}

/// Path component of the first server URL, with variables set to their defaults.
fn base_path(document: &Value) -> String {
    let Some(server) = document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
    else {
        return String::new();
    };
    let mut url = server
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if let Some(variables) = server.get("variables").and_then(Value::as_object) {
        for (name, variable) in variables {
            if let Some(default) = variable.get("default").and_then(Value::as_str) {
                url = url.replace(&format!("{{{name}}}"), default);
            }
        }
    }
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
        None if url.starts_with('/') => url.as_str(),
        None => "",
    };
    path.trim_end_matches('/').to_string()
}

/// Request matchers for one operation: one per accepted request-body media type,
/// plus a body-less variant when the body is optional.
pub fn request_matchers(operation: &Operation) -> Vec<RequestMatcher> {
    let mut base = RequestMatcher::new()
        .with_method(operation.method.as_str())
        .with_path(operation.path.as_str());

    for param in &operation.parameters {
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location = param.get("in").and_then(Value::as_str).unwrap_or_default();
        let required = location == "path" || param.get("required").and_then(Value::as_bool).unwrap_or(false);
        // optional parameters are only checked when present
        let name = if required { name.to_string() } else { format!("?{name}") };
        let name = name.as_str();
        let values: Vec<NottableString> = param
            .get("schema")
            .map(|s| vec![NottableString::schema(s.clone())])
            .unwrap_or_default();
        match location {
            "path" => base.path_parameters.0.push(KeyToMultiValue::new(name, values)),
            "query" => base.query_string_parameters.0.push(KeyToMultiValue::new(name, values)),
            "header" => base.headers.0.push(KeyToMultiValue::new(name, values)),
            "cookie" => base.cookies.0.push(KeyToValue {
                name: name.into(),
                value: values.into_iter().next().unwrap_or_else(|| ".*".into()),
            }),
            _ => {}
        }
    }

    let Some(body) = operation.definition.get("requestBody") else {
        return vec![base];
    };
    let required = body.get("required").and_then(Value::as_bool).unwrap_or(false);
    let content = body.get("content").and_then(Value::as_object);
    let mut variants = Vec::new();
    for (media_type, media) in content.into_iter().flatten() {
        if media_type == "*/*" {
            variants.push(base.clone());
        } else if is_json(media_type) {
            variants.push(base.clone().with_body(BodyMatcher::JsonSchema {
                json_schema: media
                    .get("schema")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default())),
                content_type: Some(media_type.clone()),
                not: false,
            }));
        } else {
            let pattern = format!("{}(\\s*;.*)?", regex::escape(media_type));
            variants.push(base.clone().with_header("content-type", pattern));
        }
    }
    if !required || variants.is_empty() {
        variants.push(base);
    }
    variants
}

fn is_json(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    essence == "application/json" || essence.ends_with("+json")
}
