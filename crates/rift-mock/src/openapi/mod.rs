//! OpenAPI 3 documents as request matchers and canned responses.
//!
//! A document is loaded (inline object, JSON or YAML text, or a file path), has its
//! local `$ref`s inlined, and is then compiled per operation into plain
//! `RequestMatcher`s. Compilation is a pure function of the document and the
//! optional operation id, so results are cached by a hash of both.
//!
//! # Module Structure
//!
//! - `resolve` - Local `$ref` inlining
//! - `compile` - Operations and their request matchers
//! - `example` - Response synthesis from response schemas and examples

mod compile;
mod example;
mod resolve;

#[allow(unused_imports)]
pub use compile::{operations, request_matchers, Operation};
pub use example::example_response;

use crate::matcher::{CompiledRequestMatcher, MatcherError};
use crate::model::OpenApiDefinition;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum OpenApiError {
    #[error("unable to load API spec from provided URL or payload: {0}")]
    Load(String),
    #[error("remote API spec URLs are not supported: {0}")]
    RemoteUnsupported(String),
    #[error("invalid API spec: {0}")]
    Invalid(String),
    #[error("operation {0} not found in API spec")]
    UnknownOperation(String),
    #[error("response {status} not found for operation {operation}")]
    UnknownResponse { operation: String, status: String },
}

/// Load and `$ref`-resolve a document from an inline payload or a file path.
pub fn load_spec(source: &Value) -> Result<Value, OpenApiError> {
    let document = match source {
        Value::Object(_) => source.clone(),
        Value::String(text) => parse_source(text.trim())?,
        other => {
            return Err(OpenApiError::Load(format!(
                "expected an object or a string, found {}",
                crate::matcher::type_name(other)
            )))
        }
    };
    if !document.get("paths").is_some_and(Value::is_object) {
        return Err(OpenApiError::Invalid("document has no paths object".to_string()));
    }
    Ok(resolve::resolve_refs(&document))
}

fn parse_source(text: &str) -> Result<Value, OpenApiError> {
    if text.starts_with("http://") || text.starts_with("https://") {
        return Err(OpenApiError::RemoteUnsupported(text.to_string()));
    }
    if text.starts_with('{') {
        return parse_text(text);
    }
    let path = text.strip_prefix("file:").unwrap_or(text);
    if !text.contains('\n') && Path::new(path).is_file() {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OpenApiError::Load(format!("{path}: {e}")))?;
        return parse_text(&contents);
    }
    parse_text(text)
}

/// JSON first, then YAML (a superset that also accepts relaxed JSON).
fn parse_text(text: &str) -> Result<Value, OpenApiError> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }
    match serde_yaml::from_str::<Value>(text) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err(OpenApiError::Load("payload is not an OpenAPI document".to_string())),
        Err(e) => Err(OpenApiError::Load(e.to_string())),
    }
}

/// Compiled OpenAPI matchers, keyed by a hash of (document, operation id).
#[derive(Debug, Default)]
pub struct OpenApiCache {
    entries: RwLock<HashMap<u64, Arc<[CompiledRequestMatcher]>>>,
}

impl OpenApiCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn compile(&self, definition: &OpenApiDefinition) -> Result<Arc<[CompiledRequestMatcher]>, MatcherError> {
        let key = cache_key(definition);
        if let Some(hit) = self.entries.read().get(&key) {
            return Ok(hit.clone());
        }

        let document = load_spec(&definition.spec_url_or_payload)?;
        let selected = select_operations(&document, definition.operation_id.as_deref())?;
        let compiled: Arc<[CompiledRequestMatcher]> = selected
            .iter()
            .flat_map(request_matchers)
            .map(|m| CompiledRequestMatcher::compile(&m))
            .collect::<Result<Vec<_>, _>>()?
            .into();
        debug!(
            operation_id = definition.operation_id.as_deref().unwrap_or("*"),
            matchers = compiled.len(),
            "Compiled OpenAPI matcher"
        );
        self.entries.write().insert(key, compiled.clone());
        Ok(compiled)
    }
}

/// All operations, or the single one named by `operation_id`.
pub fn select_operations(document: &Value, operation_id: Option<&str>) -> Result<Vec<Operation>, OpenApiError> {
    let all = operations(document);
    match operation_id {
        None => Ok(all),
        Some(id) => {
            let selected: Vec<_> = all.into_iter().filter(|op| op.operation_id == id).collect();
            if selected.is_empty() {
                Err(OpenApiError::UnknownOperation(id.to_string()))
            } else {
                Ok(selected)
            }
        }
    }
}

fn cache_key(definition: &OpenApiDefinition) -> u64 {
    let mut hasher = DefaultHasher::new();
    definition.spec_url_or_payload.to_string().hash(&mut hasher);
    definition.operation_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::HttpRequest;
    use serde_json::json;

    pub(crate) fn petstore() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": {"title": "Swagger Petstore", "version": "1.0.0"},
            "servers": [{"url": "http://petstore.swagger.io/v1"}],
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "parameters": [{
                            "name": "limit", "in": "query", "required": false,
                            "schema": {"type": "integer", "format": "int32"}
                        }],
                        "responses": {
                            "200": {
                                "description": "A paged array of pets",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pets"}}}
                            },
                            "500": {
                                "description": "unexpected error",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Error"}}}
                            }
                        }
                    },
                    "post": {
                        "operationId": "createPets",
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}
                        },
                        "responses": {
                            "201": {"description": "Null response"},
                            "default": {
                                "description": "unexpected error",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Error"}}}
                            }
                        }
                    }
                },
                "/pets/{petId}": {
                    "get": {
                        "operationId": "showPetById",
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}},
                            {"name": "x-request-id", "in": "header", "required": true, "schema": {"type": "string"}}
                        ],
                        "responses": {
                            "200": {
                                "description": "Expected response to a valid request",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "required": ["id", "name"],
                        "properties": {
                            "id": {"type": "integer", "format": "int64"},
                            "name": {"type": "string"},
                            "tag": {"type": "string"}
                        }
                    },
                    "Pets": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}},
                    "Error": {
                        "type": "object",
                        "required": ["code", "message"],
                        "properties": {
                            "code": {"type": "integer", "format": "int32"},
                            "message": {"type": "string"}
                        }
                    }
                }
            }
        })
    }

    fn definition(operation_id: Option<&str>) -> OpenApiDefinition {
        OpenApiDefinition {
            spec_url_or_payload: petstore(),
            operation_id: operation_id.map(str::to_string),
        }
    }

    fn any_match(matchers: &[CompiledRequestMatcher], request: &HttpRequest) -> bool {
        matchers.iter().any(|m| m.matches(request))
    }

    #[test]
    fn test_compile_single_operation() {
        let cache = OpenApiCache::new();
        let matchers = cache.compile(&definition(Some("listPets"))).unwrap();
        assert!(any_match(&matchers, &HttpRequest::new("GET", "/v1/pets").with_query("limit", "10")));
        assert!(any_match(&matchers, &HttpRequest::new("GET", "/v1/pets")));
        assert!(!any_match(&matchers, &HttpRequest::new("GET", "/v1/pets").with_query("limit", "abc")));
        assert!(!any_match(&matchers, &HttpRequest::new("GET", "/pets")));
        assert!(!any_match(&matchers, &HttpRequest::new("POST", "/v1/pets")));
    }

    #[test]
    fn test_compile_all_operations() {
        let cache = OpenApiCache::new();
        let matchers = cache.compile(&definition(None)).unwrap();
        let create = HttpRequest::new("POST", "/v1/pets")
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 1, "name": "x"}"#);
        assert!(any_match(&matchers, &create));
        assert!(!any_match(&matchers, &create.clone().with_body(r#"{"name": "x"}"#)));
        let show = HttpRequest::new("GET", "/v1/pets/12").with_header("x-request-id", "abc");
        assert!(any_match(&matchers, &show));
        assert!(!any_match(&matchers, &HttpRequest::new("GET", "/v1/pets/12")));
    }

    #[test]
    fn test_cache_reuses_identical_inputs() {
        let cache = OpenApiCache::new();
        let first = cache.compile(&definition(Some("listPets"))).unwrap();
        let second = cache.compile(&definition(Some("listPets"))).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        cache.compile(&definition(None)).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_identical_inputs_compile_equal() {
        let document = load_spec(&petstore()).unwrap();
        let op = select_operations(&document, Some("showPetById")).unwrap();
        assert_eq!(request_matchers(&op[0]), request_matchers(&op[0]));
    }

    #[test]
    fn test_unknown_operation() {
        let cache = OpenApiCache::new();
        let err = cache.compile(&definition(Some("missing"))).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_load_text_and_yaml() {
        let text = petstore().to_string();
        assert!(load_spec(&Value::String(text)).is_ok());

        let yaml = "openapi: 3.0.0\ninfo:\n  title: t\n  version: '1'\npaths:\n  /x:\n    get:\n      operationId: getX\n      responses:\n        '200':\n          description: ok\n";
        let document = load_spec(&Value::String(yaml.to_string())).unwrap();
        assert_eq!(operations(&document)[0].operation_id, "getX");
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("petstore.json");
        std::fs::write(&path, petstore().to_string()).unwrap();
        let source = Value::String(path.display().to_string());
        assert!(load_spec(&source).is_ok());
    }

    #[test]
    fn test_rejects_remote_and_garbage() {
        assert!(matches!(
            load_spec(&json!("https://example.com/openapi.json")),
            Err(OpenApiError::RemoteUnsupported(_))
        ));
        assert!(load_spec(&json!("not a spec")).is_err());
        assert!(load_spec(&json!({"openapi": "3.0.0"})).is_err());
    }
}
