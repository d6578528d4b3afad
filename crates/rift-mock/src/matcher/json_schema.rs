//! JSON schema validation for body, parameter and header matchers.
//!
//! Validation is done by the `jsonschema` crate. Schemas are first rewritten from
//! their OpenAPI 3.0 dialect: `nullable: true` becomes a `"null"` type member,
//! boolean `exclusiveMinimum`/`exclusiveMaximum` become their numeric form, and
//! local `$ref`s that cannot be resolved inside the schema (recursive references
//! left over from document inlining) accept any value.

use super::{type_name, MatcherError};
use jsonschema::Validator;
use serde_json::{Map, Value};
use std::fmt;

/// One violation, located by a `$.a.b[0]` style path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

pub struct JsonSchema {
    source: Value,
    /// `source` after the OpenAPI rewrite; what the validator was built from
    normalized: Value,
    validator: Validator,
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema").field("source", &self.source).finish()
    }
}

impl PartialEq for JsonSchema {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl JsonSchema {
    pub fn new(schema: Value) -> Result<Self, MatcherError> {
        let schema = match schema {
            // schemas are sometimes sent as JSON text
            Value::String(text) => serde_json::from_str(&text)
                .map_err(|e| MatcherError::InvalidSchema(e.to_string()))?,
            other => other,
        };
        if !schema.is_object() && !schema.is_boolean() {
            return Err(MatcherError::InvalidSchema(format!(
                "schema must be an object or boolean, found {}",
                type_name(&schema)
            )));
        }
        let normalized = normalize(&schema, &schema);
        let validator = jsonschema::validator_for(&normalized)
            .map_err(|e| MatcherError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            source: schema,
            normalized,
            validator,
        })
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn validate(&self, instance: &Value) -> Vec<SchemaViolation> {
        self.validator
            .iter_errors(instance)
            .map(|error| SchemaViolation {
                path: json_path(&error.instance_path.to_string()),
                message: error.to_string(),
            })
            .collect()
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Validate a text value (header, parameter) coerced to the schema's type.
    pub fn is_valid_text(&self, text: &str) -> bool {
        let target = self.resolve(&self.normalized);
        self.is_valid(&coerce(text, declared_type(target)))
    }

    /// Whether the top-level schema describes an array.
    pub fn is_array_schema(&self) -> bool {
        declared_type(self.resolve(&self.normalized)) == Some("array")
    }

    /// Validate several values of one parameter as a single array.
    pub fn is_valid_list(&self, values: &[&String]) -> bool {
        let target = self.resolve(&self.normalized);
        let item_type = target
            .get("items")
            .and_then(|items| declared_type(self.resolve(items)));
        // a single comma-separated value is the `form` style with explode=false
        let split: Vec<String>;
        let values: Vec<&str> = if values.len() == 1 && values[0].contains(',') {
            split = values[0].split(',').map(str::to_string).collect();
            split.iter().map(String::as_str).collect()
        } else {
            values.iter().map(|v| v.as_str()).collect()
        };
        let array = Value::Array(values.iter().map(|v| coerce(v, item_type)).collect());
        self.is_valid(&array)
    }

    /// Follow top-level local `$ref`s to the schema that declares the type.
    fn resolve<'a>(&'a self, mut schema: &'a Value) -> &'a Value {
        for _ in 0..16 {
            match schema
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| lookup(&self.normalized, r))
            {
                Some(target) => schema = target,
                None => break,
            }
        }
        schema
    }
}

fn lookup<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    if pointer.is_empty() {
        return Some(root);
    }
    root.pointer(pointer)
}

/// Rewrite OpenAPI 3.0 schema keywords into their JSON Schema equivalents.
fn normalize(root: &Value, node: &Value) -> Value {
    match node {
        Value::Object(map) => {
            let mut out: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| key.as_str() != "nullable")
                .map(|(key, value)| (key.clone(), normalize(root, value)))
                .collect();

            if map.get("nullable") == Some(&Value::Bool(true)) {
                match out.get_mut("type") {
                    Some(Value::Array(types)) => {
                        if !types.iter().any(|t| t == "null") {
                            types.push(Value::from("null"));
                        }
                    }
                    Some(ty) if ty.is_string() => {
                        let single = ty.take();
                        *ty = Value::Array(vec![single, Value::from("null")]);
                    }
                    _ => {}
                }
            }

            for (exclusive, bound) in [("exclusiveMinimum", "minimum"), ("exclusiveMaximum", "maximum")] {
                if let Some(Value::Bool(flag)) = out.get(exclusive).cloned() {
                    out.remove(exclusive);
                    if flag {
                        if let Some(value) = out.remove(bound) {
                            out.insert(exclusive.to_string(), value);
                        }
                    }
                }
            }

            let dangling = out
                .get("$ref")
                .and_then(Value::as_str)
                .is_some_and(|r| r.starts_with('#') && lookup(root, r).is_none());
            if dangling {
                out.remove("$ref");
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| normalize(root, v)).collect()),
        other => other.clone(),
    }
}

/// `/a/b/0` to `$.a.b[0]`.
fn json_path(pointer: &str) -> String {
    let mut path = String::from("$");
    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if segment.parse::<usize>().is_ok() {
            path.push_str(&format!("[{segment}]"));
        } else {
            path.push('.');
            path.push_str(&segment);
        }
    }
    path
}

fn declared_type(schema: &Value) -> Option<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

/// Convert text into the JSON value a schema of `target` type expects.
fn coerce(text: &str, target: Option<&str>) -> Value {
    match target {
        Some("integer") | Some("number") => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| text.trim().parse::<f64>().map(Value::from))
            .unwrap_or_else(|_| Value::String(text.to_string())),
        Some("boolean") => match text.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        Some("null") if text.is_empty() || text == "null" => Value::Null,
        Some("object") | Some("array") => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        _ => Value::String(text.to_string()),
    }
}
