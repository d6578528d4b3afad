//! Inlining of local `$ref`s (`#/components/...`).

use serde_json::Value;

/// Return a copy of `document` with every resolvable local `$ref` replaced by its
/// target. Recursive references are left in place at the point they recur.
pub fn resolve_refs(document: &Value) -> Value {
    let mut stack = Vec::new();
    inline(document, document, &mut stack)
}

fn inline(root: &Value, node: &Value, stack: &mut Vec<String>) -> Value {
    match node {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if stack.iter().any(|r| r == reference) {
                    return node.clone();
                }
                if let Some(target) = lookup(root, reference) {
                    stack.push(reference.to_string());
                    let resolved = inline(root, target, stack);
                    stack.pop();
                    return resolved;
                }
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), inline(root, v, stack)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| inline(root, v, stack)).collect()),
        other => other.clone(),
    }
}

/// Follow a `#/a/b` JSON pointer.
pub fn lookup<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    if pointer.is_empty() {
        return Some(root);
    }
    root.pointer(pointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inlines_nested_refs() {
        let doc = json!({
            "a": {"$ref": "#/components/B"},
            "components": {"B": {"type": "object", "properties": {"c": {"$ref": "#/components/C"}}}, "C": {"type": "string"}}
        });
        let resolved = resolve_refs(&doc);
        assert_eq!(resolved["a"]["properties"]["c"], json!({"type": "string"}));
    }

    #[test]
    fn test_recursive_ref_terminates() {
        let doc = json!({
            "node": {"$ref": "#/components/Node"},
            "components": {"Node": {"type": "object", "properties": {"child": {"$ref": "#/components/Node"}}}}
        });
        let resolved = resolve_refs(&doc);
        assert_eq!(
            resolved["node"]["properties"]["child"],
            json!({"$ref": "#/components/Node"})
        );
    }

    #[test]
    fn test_unresolvable_ref_kept() {
        let doc = json!({"a": {"$ref": "other.json#/x"}});
        assert_eq!(resolve_refs(&doc), doc);
    }
}
