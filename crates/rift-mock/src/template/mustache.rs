//! A small Mustache dialect.
//!
//! Supported tags: `{{ name }}`, `{{{ name }}}` and `{{& name }}` (all insert the
//! value verbatim), `{{# name }}...{{/ name }}` sections, `{{^ name }}` inverted
//! sections and `{{! comment }}`. Names are dotted paths; numeric segments index
//! arrays and object keys fall back to a case-insensitive match.

use super::TemplateError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Variable(String),
    Section {
        name: String,
        inverted: bool,
        children: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MustacheTemplate {
    nodes: Vec<Node>,
}

struct Frame {
    name: String,
    inverted: bool,
    nodes: Vec<Node>,
}

impl MustacheTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut stack = vec![Frame {
            name: String::new(),
            inverted: false,
            nodes: Vec::new(),
        }];
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            push_text(&mut stack, &rest[..start]);
            let after = &rest[start + 2..];
            let (tag, remaining) = match after.strip_prefix('{') {
                Some(inner) => {
                    let end = inner
                        .find("}}}")
                        .ok_or_else(|| unclosed_tag(source, start))?;
                    (format!("&{}", &inner[..end]), &inner[end + 3..])
                }
                None => {
                    let end = after.find("}}").ok_or_else(|| unclosed_tag(source, start))?;
                    (after[..end].to_string(), &after[end + 2..])
                }
            };
            rest = remaining;

            let tag = tag.trim();
            let Some(sigil) = tag.chars().next() else {
                return Err(TemplateError::Syntax("empty tag".into()));
            };
            let name = tag[sigil.len_utf8()..].trim();
            match sigil {
                '!' => {}
                '#' | '^' => stack.push(Frame {
                    name: required_name(name)?,
                    inverted: sigil == '^',
                    nodes: Vec::new(),
                }),
                '/' => {
                    let name = required_name(name)?;
                    if stack.len() == 1 {
                        return Err(TemplateError::Syntax(format!(
                            "closing tag {{{{/{name}}}}} has no open section"
                        )));
                    }
                    let Some(frame) = stack.pop() else {
                        return Err(TemplateError::Syntax("unbalanced sections".into()));
                    };
                    if frame.name != name {
                        return Err(TemplateError::Syntax(format!(
                            "section {} closed by {{{{/{name}}}}}",
                            frame.name
                        )));
                    }
                    push_node(
                        &mut stack,
                        Node::Section {
                            name: frame.name,
                            inverted: frame.inverted,
                            children: frame.nodes,
                        },
                    );
                }
                '&' => push_node(&mut stack, Node::Variable(required_name(name)?)),
                _ => push_node(&mut stack, Node::Variable(tag.to_string())),
            }
        }
        push_text(&mut stack, rest);

        match stack.pop() {
            Some(frame) if stack.is_empty() => Ok(Self { nodes: frame.nodes }),
            Some(frame) => Err(TemplateError::Syntax(format!("section {} is never closed", frame.name))),
            None => Err(TemplateError::Syntax("unbalanced sections".into())),
        }
    }

    pub fn render(&self, context: &Value) -> String {
        let mut out = String::new();
        render_nodes(&self.nodes, &mut vec![context], &mut out);
        out
    }
}

fn unclosed_tag(source: &str, offset: usize) -> TemplateError {
    let line = source[..offset].matches('\n').count() + 1;
    TemplateError::Syntax(format!("unclosed tag on line {line}"))
}

fn required_name(name: &str) -> Result<String, TemplateError> {
    if name.is_empty() {
        return Err(TemplateError::Syntax("tag is missing a name".into()));
    }
    Ok(name.to_string())
}

fn push_text(stack: &mut [Frame], text: &str) {
    if !text.is_empty() {
        push_node(stack, Node::Text(text.to_string()));
    }
}

fn push_node(stack: &mut [Frame], node: Node) {
    if let Some(frame) = stack.last_mut() {
        frame.nodes.push(node);
    }
}

fn render_nodes<'v>(nodes: &[Node], scopes: &mut Vec<&'v Value>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Variable(name) => {
                if let Some(value) = lookup(scopes, name) {
                    out.push_str(&display(value));
                }
            }
            Node::Section {
                name,
                inverted,
                children,
            } => {
                let value = lookup(scopes, name);
                let truthy = value.is_some_and(is_truthy);
                match (*inverted, value) {
                    (true, _) => {
                        if !truthy {
                            render_nodes(children, scopes, out);
                        }
                    }
                    (false, Some(Value::Array(items))) => {
                        for item in items {
                            scopes.push(item);
                            render_nodes(children, scopes, out);
                            scopes.pop();
                        }
                    }
                    (false, Some(value)) if truthy => {
                        scopes.push(value);
                        render_nodes(children, scopes, out);
                        scopes.pop();
                    }
                    _ => {}
                }
            }
        }
    }
}

fn lookup<'a>(scopes: &[&'a Value], name: &str) -> Option<&'a Value> {
    if name == "." {
        return scopes.last().copied();
    }
    let mut segments = name.split('.');
    let first = segments.next()?;
    let mut current = scopes.iter().rev().find_map(|scope| child(scope, first))?;
    for segment in segments {
        current = child(current, segment)?;
    }
    Some(current)
}

fn child<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key).or_else(|| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        }),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Number(_) | Value::Object(_) => true,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
