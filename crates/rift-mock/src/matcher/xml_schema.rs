//! XML Schema (XSD) validation for `XML_SCHEMA` body matchers.
//!
//! Supports the structural subset request bodies need: global and local
//! `element` declarations (with `ref`, `minOccurs`/`maxOccurs`), named and inline
//! `complexType` with `sequence`/`choice`/`all` groups, `complexContent` and
//! `simpleContent` extensions, `attribute` declarations (`use="required"`), and
//! `simpleType` restrictions (`enumeration`, `pattern`, length and range facets)
//! over the common built-in types. Unknown constructs are accepted.

use super::string_matcher::full_match_regex;
use super::xml::{parse_document, XmlElement};
use super::MatcherError;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug)]
pub struct XmlSchema {
    source: String,
    elements: HashMap<String, XmlElement>,
    complex_types: HashMap<String, XmlElement>,
    simple_types: HashMap<String, XmlElement>,
    groups: HashMap<String, XmlElement>,
    patterns: HashMap<String, Regex>,
}

impl PartialEq for XmlSchema {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

enum TypeDef<'a> {
    Complex(&'a XmlElement),
    Simple(&'a XmlElement),
    Builtin(&'a str),
}

const UNBOUNDED: usize = usize::MAX;

impl XmlSchema {
    pub fn new(text: &str) -> Result<Self, MatcherError> {
        let root = parse_document(text).map_err(|e| MatcherError::InvalidXmlSchema(e.to_string()))?;
        if root.name != "schema" {
            return Err(MatcherError::InvalidXmlSchema(format!(
                "root element must be schema, found {}",
                root.name
            )));
        }
        let mut schema = XmlSchema {
            source: text.to_string(),
            elements: HashMap::new(),
            complex_types: HashMap::new(),
            simple_types: HashMap::new(),
            groups: HashMap::new(),
            patterns: HashMap::new(),
        };
        for child in root.child_elements() {
            let Some(name) = child.attribute("name") else {
                continue;
            };
            let table = match child.name.as_str() {
                "element" => &mut schema.elements,
                "complexType" => &mut schema.complex_types,
                "simpleType" => &mut schema.simple_types,
                "group" => &mut schema.groups,
                _ => continue,
            };
            table.insert(name.to_string(), child.clone());
        }
        if schema.elements.is_empty() {
            return Err(MatcherError::InvalidXmlSchema(
                "schema declares no global elements".to_string(),
            ));
        }
        collect_patterns(&root, &mut schema.patterns)?;
        Ok(schema)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Validate a document, returning every violation found.
    pub fn validate(&self, document: &XmlElement) -> Vec<String> {
        let mut errors = Vec::new();
        match self.elements.get(&document.name) {
            Some(decl) => self.validate_element(decl, document, &document.name, &mut errors),
            None => errors.push(format!(
                "cannot find the declaration of element '{}'",
                document.name
            )),
        }
        errors
    }

    pub fn is_valid_text(&self, body: &str) -> bool {
        match parse_document(body) {
            Ok(document) => self.validate(&document).is_empty(),
            Err(_) => false,
        }
    }

    fn resolve_type<'a>(&'a self, name: &'a str) -> TypeDef<'a> {
        let local = local_name(name);
        if let Some(ct) = self.complex_types.get(local) {
            return TypeDef::Complex(ct);
        }
        if let Some(st) = self.simple_types.get(local) {
            return TypeDef::Simple(st);
        }
        TypeDef::Builtin(local)
    }

    fn validate_element(&self, decl: &XmlElement, inst: &XmlElement, path: &str, errors: &mut Vec<String>) {
        if let Some(reference) = decl.attribute("ref") {
            if let Some(global) = self.elements.get(local_name(reference)) {
                self.validate_element(global, inst, path, errors);
            }
            return;
        }
        let type_def = match decl.attribute("type") {
            Some(type_name) => Some(self.resolve_type(type_name)),
            None => decl.child_elements().find_map(|c| match c.name.as_str() {
                "complexType" => Some(TypeDef::Complex(c)),
                "simpleType" => Some(TypeDef::Simple(c)),
                _ => None,
            }),
        };
        match type_def {
            Some(TypeDef::Complex(ct)) => self.validate_complex(ct, inst, path, errors),
            Some(TypeDef::Simple(st)) => {
                self.expect_no_children(inst, path, errors);
                self.validate_simple(st, &inst.text(), path, errors);
            }
            Some(TypeDef::Builtin(builtin)) => {
                if builtin != "anyType" {
                    self.expect_no_children(inst, path, errors);
                }
                check_builtin(builtin, &inst.text(), path, errors);
            }
            None => {}
        }
    }

    fn expect_no_children(&self, inst: &XmlElement, path: &str, errors: &mut Vec<String>) {
        if let Some(child) = inst.child_elements().next() {
            errors.push(format!("{path}: element '{}' is not allowed in simple content", child.name));
        }
    }

    fn validate_complex(&self, ct: &XmlElement, inst: &XmlElement, path: &str, errors: &mut Vec<String>) {
        let mut particles: Vec<&XmlElement> = Vec::new();
        let mut attributes: Vec<&XmlElement> = Vec::new();
        self.collect_content(ct, &mut particles, &mut attributes, path, inst, errors, 0);

        for attr in attributes {
            let Some(name) = attr.attribute("name") else {
                continue;
            };
            match inst.attribute(name) {
                Some(value) => {
                    if let Some(type_name) = attr.attribute("type") {
                        let attr_path = format!("{path}/@{name}");
                        match self.resolve_type(type_name) {
                            TypeDef::Simple(st) => self.validate_simple(st, value, &attr_path, errors),
                            TypeDef::Builtin(b) => check_builtin(b, value, &attr_path, errors),
                            TypeDef::Complex(_) => {}
                        }
                    }
                }
                None if attr.attribute("use") == Some("required") => {
                    errors.push(format!("{path}: attribute '{name}' must appear on element"));
                }
                None => {}
            }
        }

        let children: Vec<&XmlElement> = inst.child_elements().collect();
        let mut pos = 0;
        for group in &particles {
            self.match_particle(group, &children, &mut pos, path, errors);
        }
        if let Some(extra) = children.get(pos) {
            errors.push(format!("{path}: invalid content, unexpected element '{}'", extra.name));
        }
    }

    /// Flatten a complex type's content model into its groups and attribute declarations.
    #[allow(clippy::too_many_arguments)]
    fn collect_content<'a>(
        &'a self,
        ct: &'a XmlElement,
        particles: &mut Vec<&'a XmlElement>,
        attributes: &mut Vec<&'a XmlElement>,
        path: &str,
        inst: &XmlElement,
        errors: &mut Vec<String>,
        depth: usize,
    ) {
        if depth > 16 {
            return;
        }
        for child in ct.child_elements() {
            match child.name.as_str() {
                "sequence" | "choice" | "all" | "group" => particles.push(child),
                "attribute" => attributes.push(child),
                "complexContent" | "simpleContent" => {
                    for derivation in child.child_elements() {
                        if let Some(TypeDef::Complex(base)) =
                            derivation.attribute("base").map(|b| self.resolve_type(b))
                        {
                            if derivation.name == "extension" {
                                self.collect_content(base, particles, attributes, path, inst, errors, depth + 1);
                            }
                        } else if let Some(base) = derivation.attribute("base") {
                            if child.name == "simpleContent" {
                                check_builtin(local_name(base), &inst.text(), path, errors);
                            }
                        }
                        self.collect_content(derivation, particles, attributes, path, inst, errors, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    /// Match one particle (element, group or wildcard) honouring its occurrence bounds.
    fn match_particle(
        &self,
        particle: &XmlElement,
        children: &[&XmlElement],
        pos: &mut usize,
        path: &str,
        errors: &mut Vec<String>,
    ) {
        let (min, max) = occurs(particle);
        let mut count = 0;
        while count < max && *pos < children.len() {
            let start = *pos;
            let mut scratch = Vec::new();
            if !self.match_once(particle, children, pos, path, &mut scratch) || *pos == start {
                *pos = start;
                break;
            }
            errors.extend(scratch);
            count += 1;
        }
        if count < min && !self.accepts_empty(particle) {
            errors.push(format!(
                "{path}: invalid content, expected {}",
                describe(particle)
            ));
        }
    }

    /// Attempt a single occurrence. Returns false when the particle cannot start here.
    fn match_once(
        &self,
        particle: &XmlElement,
        children: &[&XmlElement],
        pos: &mut usize,
        path: &str,
        errors: &mut Vec<String>,
    ) -> bool {
        match particle.name.as_str() {
            "element" => {
                let name = particle
                    .attribute("name")
                    .or_else(|| particle.attribute("ref").map(local_name));
                match (children.get(*pos), name) {
                    (Some(child), Some(name)) if child.name == name => {
                        let child_path = format!("{path}/{name}");
                        self.validate_element(particle, child, &child_path, errors);
                        *pos += 1;
                        true
                    }
                    _ => false,
                }
            }
            "any" => {
                *pos += 1;
                true
            }
            "sequence" => {
                let start = *pos;
                let mut local = Vec::new();
                for p in particle.child_elements() {
                    self.match_particle(p, children, pos, path, &mut local);
                }
                if !local.is_empty() && *pos == start {
                    return false;
                }
                errors.extend(local);
                true
            }
            "choice" => {
                for option in particle.child_elements() {
                    let start = *pos;
                    let mut local = Vec::new();
                    if self.match_once(option, children, pos, path, &mut local) && local.is_empty() {
                        return true;
                    }
                    *pos = start;
                }
                false
            }
            "all" => {
                let options: Vec<&XmlElement> = particle.child_elements().collect();
                let mut seen = vec![false; options.len()];
                let start = *pos;
                'outer: while let Some(child) = children.get(*pos) {
                    for (i, option) in options.iter().enumerate() {
                        let name = option.attribute("name").or_else(|| option.attribute("ref").map(local_name));
                        if !seen[i] && name == Some(child.name.as_str()) {
                            let child_path = format!("{path}/{}", child.name);
                            self.validate_element(option, child, &child_path, errors);
                            seen[i] = true;
                            *pos += 1;
                            continue 'outer;
                        }
                    }
                    break;
                }
                for (i, option) in options.iter().enumerate() {
                    if !seen[i] && occurs(option).0 > 0 {
                        errors.push(format!("{path}: invalid content, expected {}", describe(option)));
                    }
                }
                *pos > start || options.is_empty()
            }
            "group" => match particle
                .attribute("ref")
                .and_then(|r| self.groups.get(local_name(r)))
            {
                Some(group) => group
                    .child_elements()
                    .all(|inner| self.match_once(inner, children, pos, path, errors)),
                None => true,
            },
            _ => true,
        }
    }

    fn accepts_empty(&self, particle: &XmlElement) -> bool {
        match particle.name.as_str() {
            "sequence" | "all" => particle
                .child_elements()
                .all(|p| occurs(p).0 == 0 || self.accepts_empty(p)),
            "choice" => particle
                .child_elements()
                .any(|p| occurs(p).0 == 0 || self.accepts_empty(p)),
            _ => false,
        }
    }

    fn validate_simple(&self, st: &XmlElement, text: &str, path: &str, errors: &mut Vec<String>) {
        let Some(restriction) = st.child_elements().find(|c| c.name == "restriction") else {
            return;
        };
        if let Some(base) = restriction.attribute("base") {
            match self.resolve_type(base) {
                TypeDef::Simple(inner) => self.validate_simple(inner, text, path, errors),
                TypeDef::Builtin(b) => check_builtin(b, text, path, errors),
                TypeDef::Complex(_) => {}
            }
        }
        let enumeration: Vec<&str> = restriction
            .child_elements()
            .filter(|f| f.name == "enumeration")
            .filter_map(|f| f.attribute("value"))
            .collect();
        if !enumeration.is_empty() && !enumeration.contains(&text) {
            errors.push(format!(
                "{path}: value '{text}' is not facet-valid with respect to enumeration {enumeration:?}"
            ));
        }
        for facet in restriction.child_elements() {
            let Some(value) = facet.attribute("value") else {
                continue;
            };
            let len = text.chars().count();
            let number = text.trim().parse::<f64>().ok();
            let limit = value.parse::<f64>().ok();
            let violated = match facet.name.as_str() {
                "pattern" => !self.patterns.get(value).is_some_and(|r| r.is_match(text)),
                "length" => value.parse::<usize>().is_ok_and(|n| len != n),
                "minLength" => value.parse::<usize>().is_ok_and(|n| len < n),
                "maxLength" => value.parse::<usize>().is_ok_and(|n| len > n),
                "minInclusive" => matches!((number, limit), (Some(n), Some(l)) if n < l),
                "maxInclusive" => matches!((number, limit), (Some(n), Some(l)) if n > l),
                "minExclusive" => matches!((number, limit), (Some(n), Some(l)) if n <= l),
                "maxExclusive" => matches!((number, limit), (Some(n), Some(l)) if n >= l),
                _ => false,
            };
            if violated {
                errors.push(format!(
                    "{path}: value '{text}' is not facet-valid with respect to {} '{value}'",
                    facet.name
                ));
            }
        }
    }
}

fn occurs(particle: &XmlElement) -> (usize, usize) {
    let min = particle
        .attribute("minOccurs")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let max = match particle.attribute("maxOccurs") {
        Some("unbounded") => UNBOUNDED,
        Some(v) => v.parse().unwrap_or(1),
        None => 1,
    };
    (min, max)
}

fn describe(particle: &XmlElement) -> String {
    match particle.attribute("name").or_else(|| particle.attribute("ref")) {
        Some(name) => format!("element '{}'", local_name(name)),
        None => format!("content of '{}'", particle.name),
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn collect_patterns(node: &XmlElement, out: &mut HashMap<String, Regex>) -> Result<(), MatcherError> {
    for child in node.child_elements() {
        if child.name == "pattern" {
            if let Some(pattern) = child.attribute("value") {
                let regex = full_match_regex(pattern, false)
                    .or_else(|| Regex::new(&format!("^{}$", regex::escape(pattern))).ok())
                    .ok_or_else(|| {
                        MatcherError::InvalidXmlSchema(format!("invalid pattern facet {pattern}"))
                    })?;
                out.insert(pattern.to_string(), regex);
            }
        }
        collect_patterns(child, out)?;
    }
    Ok(())
}

fn check_builtin(builtin: &str, text: &str, path: &str, errors: &mut Vec<String>) {
    let text = text.trim();
    let valid = match builtin {
        "int" | "integer" | "long" | "short" | "byte" => text.parse::<i128>().is_ok(),
        "nonNegativeInteger" | "unsignedInt" | "unsignedLong" | "unsignedShort" | "unsignedByte" => {
            text.parse::<u128>().is_ok()
        }
        "positiveInteger" => text.parse::<u128>().is_ok_and(|n| n > 0),
        "negativeInteger" => text.parse::<i128>().is_ok_and(|n| n < 0),
        "nonPositiveInteger" => text.parse::<i128>().is_ok_and(|n| n <= 0),
        "decimal" | "float" | "double" => text.parse::<f64>().is_ok(),
        "boolean" => matches!(text, "true" | "false" | "1" | "0"),
        "date" => chrono::NaiveDate::parse_from_str(text.trim_end_matches('Z'), "%Y-%m-%d").is_ok(),
        "dateTime" => {
            chrono::DateTime::parse_from_rfc3339(text).is_ok()
                || chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        }
        _ => true,
    };
    if !valid {
        errors.push(format!("{path}: '{text}' is not a valid value for '{builtin}'"));
    }
}
