//! Actions an expectation performs when it matches.

use super::body::BodyContent;
use super::multimap::{CookieMap, MultiMap};
use super::response::HttpResponse;
use super::times::Delay;
use serde::{Deserialize, Serialize};

/// Closed set of actions. Serialized under the expectation's action key
/// (`httpResponse`, `httpForward`, ...), see [`super::expectation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Response(HttpResponse),
    Forward(HttpForward),
    ForwardOverride(HttpOverrideForwardedRequest),
    Template {
        kind: ActionKind,
        template: HttpTemplate,
    },
    Callback {
        kind: ActionKind,
        callback: HttpCallback,
    },
}

/// Whether a template/callback produces a response or a request to forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Response,
    Forward,
}

impl Action {
    pub fn delay(&self) -> Option<Delay> {
        match self {
            Action::Response(r) => r.delay,
            Action::Forward(f) => f.delay,
            Action::ForwardOverride(o) => o.delay,
            Action::Template { template, .. } => template.delay,
            Action::Callback { callback, .. } => callback.delay,
        }
    }

    /// Wire key naming this action inside an expectation.
    pub fn key(&self) -> &'static str {
        match self {
            Action::Response(_) => "httpResponse",
            Action::Forward(_) => "httpForward",
            Action::ForwardOverride(_) => "httpOverrideForwardedRequest",
            Action::Template {
                kind: ActionKind::Response,
                ..
            } => "httpResponseTemplate",
            Action::Template {
                kind: ActionKind::Forward,
                ..
            } => "httpForwardTemplate",
            Action::Callback {
                kind: ActionKind::Response,
                ..
            } => "httpResponseCallback",
            Action::Callback {
                kind: ActionKind::Forward,
                ..
            } => "httpForwardCallback",
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(
            self,
            Action::Forward(_)
                | Action::ForwardOverride(_)
                | Action::Template {
                    kind: ActionKind::Forward,
                    ..
                }
                | Action::Callback {
                    kind: ActionKind::Forward,
                    ..
                }
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

fn default_port() -> u16 {
    80
}

/// Relay the request unchanged to `scheme://host:port`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpForward {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub scheme: Scheme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
}

/// Explicit upstream address for an overridden request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SocketAddress {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub scheme: Scheme,
}

/// Request fields to overlay on the inbound request. Unset fields pass through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string_parameters: Option<MultiMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<MultiMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookieMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_address: Option<SocketAddress>,
}

/// Response fields to overlay on the upstream response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResponseOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_phrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<MultiMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookieMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyContent>,
}

/// Add/replace/remove edits to a multi-valued map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MultiMapModifier {
    #[serde(default, skip_serializing_if = "MultiMap::is_empty")]
    pub add: MultiMap,
    #[serde(default, skip_serializing_if = "MultiMap::is_empty")]
    pub replace: MultiMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CookieModifier {
    #[serde(default, skip_serializing_if = "CookieMap::is_empty")]
    pub add: CookieMap,
    #[serde(default, skip_serializing_if = "CookieMap::is_empty")]
    pub replace: CookieMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

/// Regex rewrite of the request path; `substitution` may use `$1` style groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PathModifier {
    pub regex: String,
    pub substitution: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestModifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathModifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string_parameters: Option<MultiMapModifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<MultiMapModifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookieModifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResponseModifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<MultiMapModifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookieModifier>,
}

/// Forward with request/response rewriting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpOverrideForwardedRequest {
    #[serde(default, alias = "httpRequest", skip_serializing_if = "Option::is_none")]
    pub request_override: Option<RequestOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_modifier: Option<RequestModifier>,
    #[serde(default, alias = "httpResponse", skip_serializing_if = "Option::is_none")]
    pub response_override: Option<ResponseOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_modifier: Option<ResponseModifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateType {
    /// `{{ request.path }}` placeholder substitution.
    Mustache,
    /// Rhai script evaluated with `request` in scope.
    Rhai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpTemplate {
    pub template_type: TemplateType,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
}

/// Named handler registered on the server at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpCallback {
    pub callback_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
}
