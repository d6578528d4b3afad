//! The `request` object templates render against.

use crate::model::HttpRequest;
use serde_json::{json, Map, Value};

/// JSON view of a request. Header names are lowercased; every multi-valued field
/// maps names to arrays of values.
pub fn request_context(request: &HttpRequest) -> Value {
    let headers: Map<String, Value> = request
        .headers
        .iter()
        .map(|(name, values)| (name.to_ascii_lowercase(), json!(values)))
        .collect();
    let query: Map<String, Value> = request
        .query_string_parameters
        .iter()
        .map(|(name, values)| (name.to_string(), json!(values)))
        .collect();
    let cookies: Map<String, Value> = request
        .cookies
        .entries()
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();
    json!({
        "method": request.method,
        "path": request.path,
        "pathAndQuery": request.path_and_query(),
        "queryStringParameters": query,
        "headers": headers,
        "cookies": cookies,
        "body": request.body_text(),
        "secure": request.secure,
        "keepAlive": request.keep_alive,
    })
}
