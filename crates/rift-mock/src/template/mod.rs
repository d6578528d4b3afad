//! Response and forward templates.
//!
//! A template renders to text against a JSON view of the inbound request; the text
//! is then read as a response (`httpResponseTemplate`) or as a request to forward
//! (`httpForwardTemplate`). Rendered payloads may be strict JSON or relaxed JSON
//! (single-quoted strings, unquoted keys), which is read through the YAML parser.
//!
//! # Module Structure
//!
//! - `context` - The `request` object exposed to templates
//! - `mustache` - `MUSTACHE` templates
//! - `script` - `RHAI` templates

mod context;
mod mustache;
mod script;

pub use context::request_context;
pub use mustache::MustacheTemplate;

use crate::model::{HttpRequest, HttpResponse, HttpTemplate, TemplateType};
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template syntax error: {0}")]
    Syntax(String),
    #[error("script compile error: {0}")]
    Compile(String),
    #[error("template evaluation failed: {0}")]
    Evaluation(String),
    #[error("rendered template is not valid JSON: {0}")]
    Output(String),
    #[error("rendered template is not a valid {shape}: {reason}")]
    Shape { shape: &'static str, reason: String },
}

/// Parse/compile without rendering.
pub fn check_syntax(template: &HttpTemplate) -> Result<(), TemplateError> {
    match template.template_type {
        TemplateType::Mustache => MustacheTemplate::parse(&template.template).map(|_| ()),
        TemplateType::Rhai => script::compile(&template.template).map(|_| ()),
    }
}

pub fn render(template: &HttpTemplate, request: &HttpRequest) -> Result<String, TemplateError> {
    let context = request_context(request);
    match template.template_type {
        TemplateType::Mustache => {
            let parsed = MustacheTemplate::parse(&template.template)?;
            Ok(parsed.render(&json!({ "request": context })))
        }
        TemplateType::Rhai => script::render(&template.template, &context),
    }
}

/// Read rendered text as a response.
pub fn rendered_response(text: &str) -> Result<HttpResponse, TemplateError> {
    serde_json::from_value(parse_lenient(text)?).map_err(|e| TemplateError::Shape {
        shape: "response",
        reason: e.to_string(),
    })
}

/// Read rendered text as a request to forward; `method` and `path` default to the
/// inbound request's.
pub fn rendered_request(text: &str, inbound: &HttpRequest) -> Result<HttpRequest, TemplateError> {
    let mut value = parse_lenient(text)?;
    let Some(object) = value.as_object_mut() else {
        return Err(TemplateError::Shape {
            shape: "request",
            reason: "expected an object".into(),
        });
    };
    object
        .entry("method")
        .or_insert_with(|| Value::String(inbound.method.clone()));
    object
        .entry("path")
        .or_insert_with(|| Value::String(inbound.path.clone()));

    let mut request: HttpRequest = serde_json::from_value(value).map_err(|e| TemplateError::Shape {
        shape: "request",
        reason: e.to_string(),
    })?;
    if request.cookies.is_empty() {
        if let Some(cookie_header) = request.headers.get("cookie") {
            request.cookies =
                crate::model::CookieMap::parse_header(cookie_header.iter().map(String::as_str));
        }
    }
    Ok(request)
}

fn parse_lenient(text: &str) -> Result<Value, TemplateError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(json_error) => serde_yaml::from_str::<Value>(text)
            .ok()
            .filter(Value::is_object)
            .ok_or_else(|| TemplateError::Output(json_error.to_string())),
    }
}
