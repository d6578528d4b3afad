//! Log entry types.

use crate::json_format::{indent_lines, to_pretty_json};
use crate::model::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separates messages in `retrieve?type=logs` output.
pub const LOG_SEPARATOR: &str = "------------------------------------\n";

/// What happened to a logged request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Answered locally (response, template or callback action)
    Responded { response: HttpResponse },
    /// Relayed upstream; `response` is what the upstream returned, after rewriting
    Forwarded { response: HttpResponse },
    NoMatch,
    Error { reason: String },
}

impl Outcome {
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Outcome::Responded { response } | Outcome::Forwarded { response } => Some(response),
            Outcome::NoMatch | Outcome::Error { .. } => None,
        }
    }
}

/// One inbound request and how it was handled. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "httpRequest")]
    pub request: HttpRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_expectation_id: Option<String>,
    pub outcome: Outcome,
}

impl LogEntry {
    /// Human-readable log lines for this entry: the receipt, then the outcome.
    pub fn messages(&self) -> Vec<String> {
        let request = block(&self.request);
        let outcome = match &self.outcome {
            Outcome::Responded { response } => match &self.matched_expectation_id {
                Some(id) => format!(
                    "returning response:{}\n for request:{}\n for expectation:\n\n  {id}\n",
                    block(response),
                    request
                ),
                None => format!("returning response:{}\n for request:{}", block(response), request),
            },
            Outcome::Forwarded { response } => format!(
                "returning response:{}\n for forwarded request:{}",
                block(response),
                request
            ),
            Outcome::NoMatch => format!(
                "no expectation for:{}\n returning response:{}",
                request,
                block(&HttpResponse::not_found())
            ),
            Outcome::Error { reason } => format!("error handling request:{request}\n reason:\n\n  {reason}\n"),
        };
        vec![format!("received request:{request}"), outcome]
    }
}

fn block<T: Serialize>(value: &T) -> String {
    format!("\n\n  {}\n", indent_lines(&to_pretty_json(value), "  "))
}

/// Wire shape of `retrieve?type=request_responses`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAndResponse<'a> {
    pub http_request: &'a HttpRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_response: Option<&'a HttpResponse>,
    pub timestamp: DateTime<Utc>,
}

impl<'a> From<&'a LogEntry> for RequestAndResponse<'a> {
    fn from(entry: &'a LogEntry) -> Self {
        Self {
            http_request: &entry.request,
            http_response: entry.outcome.response(),
            timestamp: entry.timestamp,
        }
    }
}
