//! Expectations: a request definition paired with an action, times, TTL and priority.

use super::action::{
    Action, ActionKind, HttpCallback, HttpForward, HttpOverrideForwardedRequest, HttpTemplate,
};
use super::request::RequestDefinition;
use super::response::HttpResponse;
use super::times::{TimeToLive, Times};
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Wire keys for every supported action, alphabetical.
pub const ACTION_KEYS: [(&str, &str); 7] = [
    ("httpForward", "Forward"),
    ("httpForwardCallback", "ForwardCallback"),
    ("httpForwardTemplate", "ForwardTemplate"),
    ("httpOverrideForwardedRequest", "OverrideForwardedRequest"),
    ("httpResponse", "Response"),
    ("httpResponseCallback", "ResponseCallback"),
    ("httpResponseTemplate", "ResponseTemplate"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    /// Assigned on upsert when empty.
    pub id: String,
    pub priority: i32,
    pub http_request: RequestDefinition,
    pub action: Action,
    pub times: Times,
    pub time_to_live: TimeToLive,
}

impl Expectation {
    pub fn new(http_request: impl Into<RequestDefinition>, action: Action) -> Self {
        Self {
            id: String::new(),
            priority: 0,
            http_request: http_request.into(),
            action,
            times: Times::unlimited(),
            time_to_live: TimeToLive::unlimited(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_times(mut self, times: Times) -> Self {
        self.times = times;
        self
    }

    pub fn with_time_to_live(mut self, ttl: TimeToLive) -> Self {
        self.time_to_live = ttl;
        self
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ExpectationRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    http_request: Option<RequestDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_response: Option<HttpResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_response_template: Option<HttpTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_response_callback: Option<HttpCallback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_forward: Option<HttpForward>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_forward_template: Option<HttpTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_forward_callback: Option<HttpCallback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_override_forwarded_request: Option<HttpOverrideForwardedRequest>,
    #[serde(default)]
    times: Option<Times>,
    #[serde(default)]
    time_to_live: Option<TimeToLive>,
}

impl Serialize for Expectation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut repr = ExpectationRepr {
            id: Some(self.id.clone()).filter(|id| !id.is_empty()),
            priority: self.priority,
            http_request: Some(self.http_request.clone()),
            http_response: None,
            http_response_template: None,
            http_response_callback: None,
            http_forward: None,
            http_forward_template: None,
            http_forward_callback: None,
            http_override_forwarded_request: None,
            times: Some(self.times),
            time_to_live: Some(self.time_to_live),
        };
        match &self.action {
            Action::Response(r) => repr.http_response = Some(r.clone()),
            Action::Forward(f) => repr.http_forward = Some(f.clone()),
            Action::ForwardOverride(o) => repr.http_override_forwarded_request = Some(o.clone()),
            Action::Template {
                kind: ActionKind::Response,
                template,
            } => repr.http_response_template = Some(template.clone()),
            Action::Template {
                kind: ActionKind::Forward,
                template,
            } => repr.http_forward_template = Some(template.clone()),
            Action::Callback {
                kind: ActionKind::Response,
                callback,
            } => repr.http_response_callback = Some(callback.clone()),
            Action::Callback {
                kind: ActionKind::Forward,
                callback,
            } => repr.http_forward_callback = Some(callback.clone()),
        }
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expectation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = ExpectationRepr::deserialize(deserializer)?;
        let mut actions = Vec::new();
        if let Some(r) = repr.http_response {
            actions.push(Action::Response(r));
        }
        if let Some(t) = repr.http_response_template {
            actions.push(Action::Template {
                kind: ActionKind::Response,
                template: t,
            });
        }
        if let Some(c) = repr.http_response_callback {
            actions.push(Action::Callback {
                kind: ActionKind::Response,
                callback: c,
            });
        }
        if let Some(f) = repr.http_forward {
            actions.push(Action::Forward(f));
        }
        if let Some(t) = repr.http_forward_template {
            actions.push(Action::Template {
                kind: ActionKind::Forward,
                template: t,
            });
        }
        if let Some(c) = repr.http_forward_callback {
            actions.push(Action::Callback {
                kind: ActionKind::Forward,
                callback: c,
            });
        }
        if let Some(o) = repr.http_override_forwarded_request {
            actions.push(Action::ForwardOverride(o));
        }
        if actions.len() != 1 {
            return Err(D::Error::custom(format!(
                "exactly one action must be specified, found {}",
                actions.len()
            )));
        }
        let action = actions.remove(0);
        Ok(Expectation {
            id: repr.id.unwrap_or_default(),
            priority: repr.priority,
            http_request: repr.http_request.unwrap_or_default(),
            action,
            times: repr.times.unwrap_or_default(),
            time_to_live: repr.time_to_live.unwrap_or_default(),
        })
    }
}

/// An OpenAPI document expanded into one expectation per operation, each
/// answering with the example response for the chosen status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OpenApiExpectation {
    pub spec_url_or_payload: Value,
    /// operationId → response status key (`"200"`, `"default"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations_and_responses: Option<IndexMap<String, String>>,
}
