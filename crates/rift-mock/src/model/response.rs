//! HTTP responses, both configured (as an action) and produced.

use super::body::BodyContent;
use super::multimap::{CookieMap, MultiMap};
use super::times::Delay;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_phrase: Option<String>,
    #[serde(default, skip_serializing_if = "MultiMap::is_empty")]
    pub headers: MultiMap,
    #[serde(default, skip_serializing_if = "CookieMap::is_empty")]
    pub cookies: CookieMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status_code: Some(status),
            ..Default::default()
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(name, value);
        self
    }

    pub fn with_body(mut self, body: BodyContent) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_body(BodyContent::text(text))
    }

    pub fn with_delay(mut self, delay: Delay) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn status(&self) -> u16 {
        self.status_code.unwrap_or(200)
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        self.body.as_ref().map(BodyContent::bytes).unwrap_or_default()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body_bytes()).into_owned()
    }
}
