//! Path matching: literal, regex, schema and `{name}` path templates.

use super::string_matcher::CompiledNottable;
use super::MatcherError;
use crate::model::{MultiMap, NottableString};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static TEMPLATE_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").expect("static regex"));

/// `/pets/{petId}` compiled to `^/pets/([^/]+)$` plus the variable names.
#[derive(Debug, Clone)]
struct PathTemplate {
    regex: Arc<Regex>,
    names: Vec<String>,
}

impl PathTemplate {
    fn compile(path: &str) -> Result<Option<Self>, MatcherError> {
        if !TEMPLATE_VARIABLE.is_match(path) {
            return Ok(None);
        }
        let mut pattern = String::from("^");
        let mut names = Vec::new();
        let mut last = 0;
        for caps in TEMPLATE_VARIABLE.captures_iter(path) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            pattern.push_str(&regex::escape(&path[last..whole.start()]));
            pattern.push_str("([^/]+)");
            names.push(name.as_str().to_string());
            last = whole.end();
        }
        pattern.push_str(&regex::escape(&path[last..]));
        pattern.push('$');
        let regex = Regex::new(&pattern).map_err(|source| MatcherError::InvalidRegex {
            pattern: pattern.clone(),
            source,
        })?;
        Ok(Some(Self {
            regex: Arc::new(regex),
            names,
        }))
    }

    fn bind(&self, path: &str) -> Option<MultiMap> {
        let caps = self.regex.captures(path)?;
        let mut bindings = MultiMap::new();
        for (i, name) in self.names.iter().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                let value = urlencoding::decode(m.as_str())
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| m.as_str().to_string());
                bindings.append(name.clone(), value);
            }
        }
        Some(bindings)
    }
}

/// Compiled path matcher.
#[derive(Debug, Clone)]
pub struct CompiledPathMatcher {
    value: CompiledNottable,
    template: Option<PathTemplate>,
}

impl CompiledPathMatcher {
    pub fn compile(path: &NottableString) -> Result<Self, MatcherError> {
        let template = match path.as_str() {
            Some(text) => PathTemplate::compile(text)?,
            None => None,
        };
        Ok(Self {
            value: CompiledNottable::compile(path, false)?,
            template,
        })
    }

    pub fn is_template(&self) -> bool {
        self.template.is_some()
    }

    /// Match a path, returning the bound template variables on success.
    ///
    /// Non-template and negated matches bind nothing.
    pub fn matches(&self, path: &str) -> Option<MultiMap> {
        let bound = if self.value.matches_raw(path) {
            Some(MultiMap::new())
        } else {
            self.template.as_ref().and_then(|t| t.bind(path))
        };
        match (bound, self.value.is_not()) {
            (Some(bindings), false) => Some(bindings),
            (None, true) => Some(MultiMap::new()),
            _ => None,
        }
    }
}
