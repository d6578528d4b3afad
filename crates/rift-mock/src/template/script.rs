//! Rhai templates: a script evaluated with `request` in scope that returns a map
//! or a JSON string.

use super::TemplateError;
use once_cell::sync::Lazy;
use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::Value;

static ENGINE: Lazy<Engine> = Lazy::new(create_engine);

fn create_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(100_000);
    engine.set_max_expr_depths(64, 32);
    engine.set_max_string_size(1 << 20);

    engine.register_fn("to_json", |value: Dynamic| -> String {
        rhai::serde::from_dynamic::<Value>(&value)
            .map(|v| v.to_string())
            .unwrap_or_default()
    });
    engine.register_fn("from_json", |text: &str| -> Dynamic {
        serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|v| rhai::serde::to_dynamic(v).ok())
            .unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn("now_millis", || -> i64 { chrono::Utc::now().timestamp_millis() });
    engine.register_fn("uuid", || -> String { uuid::Uuid::new_v4().to_string() });

    engine
}

pub fn compile(source: &str) -> Result<AST, TemplateError> {
    ENGINE
        .compile(source)
        .map_err(|e| TemplateError::Compile(e.to_string()))
}

/// Evaluate `source` against `request` and return the produced payload as JSON text.
pub fn render(source: &str, request: &Value) -> Result<String, TemplateError> {
    let ast = compile(source)?;
    let request = rhai::serde::to_dynamic(request).map_err(|e| TemplateError::Evaluation(e.to_string()))?;
    let mut scope = Scope::new();
    scope.push_dynamic("request", request);

    let result: Dynamic = ENGINE
        .eval_ast_with_scope(&mut scope, &ast)
        .map_err(|e| TemplateError::Evaluation(e.to_string()))?;

    if result.is_string() {
        return result
            .into_string()
            .map_err(|t| TemplateError::Evaluation(format!("script returned {t}")));
    }
    if result.is_map() {
        let value: Value =
            rhai::serde::from_dynamic(&result).map_err(|e| TemplateError::Evaluation(e.to_string()))?;
        return Ok(value.to_string());
    }
    Err(TemplateError::Evaluation(format!(
        "script must return a map or a JSON string, got {}",
        result.type_name()
    )))
}
