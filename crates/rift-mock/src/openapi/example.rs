//! Canned responses synthesized from an operation's declared responses.
//!
//! Explicit `example`/`examples` win; otherwise a value is generated from the
//! schema, with placeholder scalars (`"some_string_value"`, `0`, `false`).

use super::compile::Operation;
use super::OpenApiError;
use crate::json_format::to_pretty_json;
use crate::model::{BodyContent, HttpResponse};
use serde_json::{Map, Value};

const MAX_DEPTH: usize = 16;

/// Build the response for `status` (the first declared response when `None`).
pub fn example_response(operation: &Operation, status: Option<&str>) -> Result<HttpResponse, OpenApiError> {
    let responses = operation.responses().ok_or_else(|| OpenApiError::UnknownResponse {
        operation: operation.operation_id.clone(),
        status: status.unwrap_or("any").to_string(),
    })?;
    let (key, definition) = match status {
        Some(status) => responses.get_key_value(status),
        None => responses.iter().next(),
    }
    .ok_or_else(|| OpenApiError::UnknownResponse {
        operation: operation.operation_id.clone(),
        status: status.unwrap_or("any").to_string(),
    })?;

    let mut response = HttpResponse {
        status_code: status_code(key),
        ..Default::default()
    };

    if let Some(headers) = definition.get("headers").and_then(Value::as_object) {
        for (name, header) in headers {
            let value = header
                .get("example")
                .cloned()
                .or_else(|| header.get("schema").map(|s| example_value(s, 0)));
            if let Some(value) = value {
                response.headers.append(name.as_str(), scalar_text(&value));
            }
        }
    }

    let content = definition
        .get("content")
        .and_then(Value::as_object)
        .and_then(|c| c.iter().next());
    if let Some((media_type, media)) = content {
        let value = media
            .get("example")
            .cloned()
            .or_else(|| {
                media
                    .get("examples")
                    .and_then(Value::as_object)
                    .and_then(|e| e.values().next())
                    .and_then(|e| e.get("value"))
                    .cloned()
            })
            .or_else(|| media.get("schema").map(|s| example_value(s, 0)));
        response.headers.append("content-type", media_type.as_str());
        if let Some(value) = value {
            response.body = Some(if media_type.contains("json") {
                BodyContent::json(value)
            } else {
                BodyContent::text(match value {
                    Value::String(text) => text,
                    other => to_pretty_json(&other),
                })
            });
        }
    }
    Ok(response)
}

/// `default` leaves the status unset (200); `5XX` style ranges pick the first code.
fn status_code(key: &str) -> Option<u16> {
    if let Ok(code) = key.parse() {
        return Some(code);
    }
    let first = key.chars().next()?.to_digit(10)?;
    (key.len() == 3 && key[1..].eq_ignore_ascii_case("xx")).then_some(first as u16 * 100)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Generate an example instance of a (resolved) schema.
pub fn example_value(schema: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::Null;
    }
    if let Some(example) = schema.get("example") {
        return example.clone();
    }
    if let Some(first) = schema.get("enum").and_then(Value::as_array).and_then(|e| e.first()) {
        return first.clone();
    }
    if let Some(default) = schema.get("default") {
        return default.clone();
    }
    if let Some(all) = schema.get("allOf").and_then(Value::as_array) {
        let mut merged = Map::new();
        for part in all {
            if let Value::Object(map) = example_value(part, depth + 1) {
                merged.extend(map);
            }
        }
        return Value::Object(merged);
    }
    for key in ["oneOf", "anyOf"] {
        if let Some(first) = schema.get(key).and_then(Value::as_array).and_then(|v| v.first()) {
            return example_value(first, depth + 1);
        }
    }
    let declared = schema.get("type").and_then(Value::as_str);
    match declared {
        Some("array") => Value::Array(vec![schema
            .get("items")
            .map(|items| example_value(items, depth + 1))
            .unwrap_or(Value::Null)]),
        Some("string") => Value::String(string_example(schema)),
        Some("integer") => Value::from(0),
        Some("number") => Value::from(0.0),
        Some("boolean") => Value::Bool(false),
        Some("object") | None if schema.get("properties").is_some() => Value::Object(
            schema
                .get("properties")
                .and_then(Value::as_object)
                .into_iter()
                .flatten()
                .map(|(name, property)| (name.clone(), example_value(property, depth + 1)))
                .collect(),
        ),
        Some("object") => Value::Object(Map::new()),
        _ => Value::Null,
    }
}

fn string_example(schema: &Value) -> String {
    match schema.get("format").and_then(Value::as_str) {
        Some("date") => "2020-01-01".to_string(),
        Some("date-time") => "2020-01-01T00:00:00Z".to_string(),
        Some("uuid") => "00000000-0000-0000-0000-000000000000".to_string(),
        Some("byte") => "c29tZV9zdHJpbmdfdmFsdWU=".to_string(),
        _ => "some_string_value".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::{load_spec, select_operations};
    use serde_json::json;

    fn operation(id: &str) -> Operation {
        let document = load_spec(&crate::openapi::tests::petstore()).unwrap();
        select_operations(&document, Some(id)).unwrap().remove(0)
    }

    #[test]
    fn test_generated_error_body() {
        let response = example_response(&operation("listPets"), Some("500")).unwrap();
        assert_eq!(response.status_code, Some(500));
        assert_eq!(response.headers.get_first("content-type"), Some("application/json"));
        assert_eq!(
            response.body_text(),
            "{\n  \"code\" : 0,\n  \"message\" : \"some_string_value\"\n}"
        );
    }

    #[test]
    fn test_default_response_has_no_status() {
        let response = example_response(&operation("createPets"), Some("default")).unwrap();
        assert_eq!(response.status_code, None);
        assert_eq!(response.status(), 200);
    }

    #[test]
    fn test_first_response_when_unspecified() {
        let response = example_response(&operation("showPetById"), None).unwrap();
        assert_eq!(response.status_code, Some(200));
        assert_eq!(
            response.body,
            Some(BodyContent::json(json!({"id": 0, "name": "some_string_value", "tag": "some_string_value"})))
        );
    }

    #[test]
    fn test_unknown_status() {
        assert!(matches!(
            example_response(&operation("listPets"), Some("418")),
            Err(OpenApiError::UnknownResponse { .. })
        ));
    }

    #[test]
    fn test_examples_take_precedence() {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer", "example": 10},
                "status": {"type": "string", "enum": ["available", "sold"]},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        });
        assert_eq!(
            example_value(&schema, 0),
            json!({"id": 10, "status": "available", "tags": ["some_string_value"]})
        );
    }

    #[test]
    fn test_non_json_media_type_renders_text() {
        let op = Operation {
            operation_id: "x".to_string(),
            method: "GET".to_string(),
            path: "/x".to_string(),
            definition: json!({"responses": {"200": {"content": {"application/xml": {
                "schema": {"type": "array", "items": {"type": "object", "properties": {"id": {"type": "integer"}}}}
            }}}}}),
            parameters: Vec::new(),
        };
        let response = example_response(&op, Some("200")).unwrap();
        assert_eq!(response.body, Some(BodyContent::text("[ {\n  \"id\" : 0\n} ]")));
        assert_eq!(response.headers.get_first("content-type"), Some("application/xml"));
    }

    #[test]
    fn test_status_ranges() {
        assert_eq!(status_code("404"), Some(404));
        assert_eq!(status_code("5XX"), Some(500));
        assert_eq!(status_code("default"), None);
    }
}
