//! Owned XML element trees and structural comparison.
//!
//! Documents are parsed with `sxd-document` and copied into a small owned tree so
//! compiled matchers can hold them without borrowing a `Package`. Comments,
//! processing instructions and whitespace-only text are dropped.

use crate::model::MatchType;
use super::MatcherError;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::parser;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub namespace: Option<String>,
    /// Sorted by name.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text content of direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }
}

/// Parse a document and return its root element.
pub fn parse_document(text: &str) -> Result<XmlElement, MatcherError> {
    let package = parser::parse(text).map_err(|e| MatcherError::InvalidXml(format!("{e:?}")))?;
    let document = package.as_document();
    let root = document
        .root()
        .children()
        .into_iter()
        .find_map(|child| match child {
            ChildOfRoot::Element(e) => Some(e),
            _ => None,
        })
        .ok_or_else(|| MatcherError::InvalidXml("document has no root element".to_string()))?;
    Ok(convert(root))
}

fn convert(element: Element<'_>) -> XmlElement {
    let name = element.name();
    let mut attributes: Vec<(String, String)> = element
        .attributes()
        .into_iter()
        .map(|a| (a.name().local_part().to_string(), a.value().to_string()))
        .collect();
    attributes.sort();
    let children = element
        .children()
        .into_iter()
        .filter_map(|child| match child {
            ChildOfElement::Element(e) => Some(XmlNode::Element(convert(e))),
            ChildOfElement::Text(t) => {
                let trimmed = t.text().trim();
                (!trimmed.is_empty()).then(|| XmlNode::Text(trimmed.to_string()))
            }
            _ => None,
        })
        .collect();
    XmlElement {
        name: name.local_part().to_string(),
        namespace: name.namespace_uri().map(str::to_string),
        attributes,
        children,
    }
}

/// Compare an expected tree against an actual one.
///
/// Strict mode requires identical trees. Subset mode lets the actual element
/// carry extra attributes and extra child elements; expected children must
/// still appear in order.
pub fn xml_matches(expected: &XmlElement, actual: &XmlElement, mode: MatchType) -> bool {
    if expected.name != actual.name || expected.namespace != actual.namespace {
        return false;
    }
    match mode {
        MatchType::Strict => {
            expected.attributes == actual.attributes
                && expected.children.len() == actual.children.len()
                && expected
                    .children
                    .iter()
                    .zip(&actual.children)
                    .all(|(e, a)| node_matches(e, a, mode))
        }
        MatchType::OnlyMatchingFields => {
            let attrs_ok = expected
                .attributes
                .iter()
                .all(|(n, v)| actual.attribute(n) == Some(v.as_str()));
            if !attrs_ok || expected.text() != actual.text() {
                return false;
            }
            let mut remaining = actual.child_elements();
            expected
                .child_elements()
                .all(|e| remaining.any(|a| xml_matches(e, a, mode)))
        }
    }
}

fn node_matches(expected: &XmlNode, actual: &XmlNode, mode: MatchType) -> bool {
    match (expected, actual) {
        (XmlNode::Text(e), XmlNode::Text(a)) => e == a,
        (XmlNode::Element(e), XmlNode::Element(a)) => xml_matches(e, a, mode),
        _ => false,
    }
}
