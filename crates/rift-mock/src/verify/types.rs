//! Verification requests as sent to the control plane.

use crate::model::{RequestDefinition, VerificationTimes};
use serde::{Deserialize, Serialize};

/// Reference to a stored expectation. Accepts `"id"` or `{"id": "id"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ExpectationIdRepr")]
pub struct ExpectationId {
    pub id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpectationIdRepr {
    Bare(String),
    Object { id: String },
}

impl From<ExpectationIdRepr> for ExpectationId {
    fn from(repr: ExpectationIdRepr) -> Self {
        match repr {
            ExpectationIdRepr::Bare(id) | ExpectationIdRepr::Object { id } => ExpectationId { id },
        }
    }
}

impl From<&str> for ExpectationId {
    fn from(id: &str) -> Self {
        ExpectationId { id: id.to_string() }
    }
}

/// What a verification step selects log entries by.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationTarget {
    Request(RequestDefinition),
    ExpectationId(String),
}

impl From<RequestDefinition> for VerificationTarget {
    fn from(definition: RequestDefinition) -> Self {
        VerificationTarget::Request(definition)
    }
}

/// Count verification: how many logged requests a target selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Verification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_request: Option<RequestDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expectation_id: Option<ExpectationId>,
    #[serde(default)]
    pub times: VerificationTimes,
    #[serde(
        default,
        rename = "maximumNumberOfRequestToReturnInVerificationFailure",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_context_entries: Option<usize>,
}

impl Verification {
    pub fn request(definition: impl Into<RequestDefinition>, times: VerificationTimes) -> Self {
        Self {
            http_request: Some(definition.into()),
            expectation_id: None,
            times,
            max_context_entries: None,
        }
    }

    pub fn expectation(id: &str, times: VerificationTimes) -> Self {
        Self {
            http_request: None,
            expectation_id: Some(id.into()),
            times,
            max_context_entries: None,
        }
    }

    pub fn with_max_context_entries(mut self, max: usize) -> Self {
        self.max_context_entries = Some(max);
        self
    }

    /// The expectation id wins when both are given; neither means "any request".
    pub fn target(&self) -> VerificationTarget {
        match (&self.expectation_id, &self.http_request) {
            (Some(id), _) => VerificationTarget::ExpectationId(id.id.clone()),
            (None, Some(definition)) => VerificationTarget::Request(definition.clone()),
            (None, None) => VerificationTarget::Request(RequestDefinition::default()),
        }
    }
}

/// Ordered-subsequence verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VerificationSequence {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_requests: Vec<RequestDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expectation_ids: Vec<ExpectationId>,
    #[serde(
        default,
        rename = "maximumNumberOfRequestToReturnInVerificationFailure",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_context_entries: Option<usize>,
}

impl VerificationSequence {
    pub fn requests(definitions: impl IntoIterator<Item = RequestDefinition>) -> Self {
        Self {
            http_requests: definitions.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn expectations<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            expectation_ids: ids.into_iter().map(ExpectationId::from).collect(),
            ..Default::default()
        }
    }

    /// Ids when any are given, otherwise the request definitions.
    pub fn targets(&self) -> Vec<VerificationTarget> {
        if self.expectation_ids.is_empty() {
            self.http_requests
                .iter()
                .cloned()
                .map(VerificationTarget::Request)
                .collect()
        } else {
            self.expectation_ids
                .iter()
                .map(|e| VerificationTarget::ExpectationId(e.id.clone()))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestMatcher;
    use serde_json::json;

    #[test]
    fn test_verification_wire_form() {
        let verification: Verification = serde_json::from_value(json!({
            "httpRequest": {"path": "/p"},
            "times": {"atLeast": 2},
            "maximumNumberOfRequestToReturnInVerificationFailure": 1
        }))
        .unwrap();
        assert_eq!(verification.times, VerificationTimes::at_least(2));
        assert_eq!(verification.max_context_entries, Some(1));
        assert_eq!(
            verification.target(),
            VerificationTarget::Request(RequestMatcher::new().with_path("/p").into())
        );
    }

    #[test]
    fn test_expectation_id_forms() {
        let bare: Verification = serde_json::from_value(json!({"expectationId": "abc"})).unwrap();
        let object: Verification = serde_json::from_value(json!({"expectationId": {"id": "abc"}})).unwrap();
        assert_eq!(bare, object);
        assert_eq!(bare.target(), VerificationTarget::ExpectationId("abc".into()));
        assert_eq!(bare.times, VerificationTimes::at_least(1));
    }

    #[test]
    fn test_sequence_prefers_ids() {
        let sequence: VerificationSequence = serde_json::from_value(json!({
            "expectationIds": [{"id": "a"}, "b"]
        }))
        .unwrap();
        assert_eq!(
            sequence.targets(),
            [
                VerificationTarget::ExpectationId("a".into()),
                VerificationTarget::ExpectationId("b".into())
            ]
        );
    }
}
