//! Executes a matched expectation's action.

use super::callback::{CallbackError, CallbackOutput, CallbackRegistry};
use super::forward::{set_cookie_name, ForwardError, Target, UpstreamClient};
use super::modifier::{modify_request, modify_response, override_request, override_response};
use crate::model::{Action, ActionKind, BodyContent, Delay, HttpOverrideForwardedRequest, HttpRequest, HttpResponse};
use crate::recording::Outcome;
use crate::template::{self, TemplateError};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Forward(#[from] ForwardError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Callback(#[from] CallbackError),
    #[error("invalid path modifier regex: {0}")]
    PathModifier(#[from] regex::Error),
}

impl DispatchError {
    /// Status returned to the client for this failure.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::Forward(_) => 502,
            _ => 500,
        }
    }

    pub fn to_response(&self) -> HttpResponse {
        HttpResponse::new(self.status())
            .with_header("content-type", "application/json")
            .with_body(BodyContent::json(json!({ "error": self.to_string() })))
    }
}

/// A completed action.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Responded(HttpResponse),
    Forwarded(HttpResponse),
}

impl Dispatched {
    pub fn response(&self) -> &HttpResponse {
        match self {
            Dispatched::Responded(r) | Dispatched::Forwarded(r) => r,
        }
    }

    pub fn into_outcome(self) -> Outcome {
        match self {
            Dispatched::Responded(response) => Outcome::Responded { response },
            Dispatched::Forwarded(response) => Outcome::Forwarded { response },
        }
    }
}

pub struct ActionDispatcher {
    upstream: Arc<dyn UpstreamClient>,
    callbacks: Arc<CallbackRegistry>,
}

impl ActionDispatcher {
    pub fn new(upstream: Arc<dyn UpstreamClient>, callbacks: Arc<CallbackRegistry>) -> Self {
        Self { upstream, callbacks }
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }

    /// Run `action` for `request`. The action's delay is applied once, up front.
    pub async fn execute(&self, action: &Action, request: &HttpRequest) -> Result<Dispatched, DispatchError> {
        if let Some(delay) = action.delay() {
            sleep(delay).await;
        }
        match action {
            Action::Response(response) => Ok(Dispatched::Responded(finalize(response.clone()))),
            Action::Forward(forward) => self.forward(&Target::from(forward), request).await,
            Action::ForwardOverride(overlay) => self.forward_override(overlay, request).await,
            Action::Template { kind, template } => {
                let text = template::render(template, request)?;
                debug!(template_type = ?template.template_type, "Rendered template");
                match kind {
                    ActionKind::Response => self.respond(template::rendered_response(&text)?).await,
                    ActionKind::Forward => {
                        let outbound = template::rendered_request(&text, request)?;
                        self.forward(&Target::of_request(&outbound)?, &outbound).await
                    }
                }
            }
            Action::Callback { kind, callback } => {
                let name = &callback.callback_name;
                match (kind, self.callbacks.invoke(name, request).await?) {
                    (ActionKind::Response, CallbackOutput::Respond(response)) => self.respond(response).await,
                    (ActionKind::Forward, CallbackOutput::Forward(outbound)) => {
                        self.forward(&Target::of_request(&outbound)?, &outbound).await
                    }
                    (kind, output) => Err(CallbackError::WrongOutput {
                        name: name.clone(),
                        expected: match kind {
                            ActionKind::Response => "response",
                            ActionKind::Forward => "request",
                        },
                        returned: output.kind(),
                    }
                    .into()),
                }
            }
        }
    }

    /// Responses produced at runtime may carry their own delay.
    async fn respond(&self, response: HttpResponse) -> Result<Dispatched, DispatchError> {
        if let Some(delay) = response.delay {
            sleep(delay).await;
        }
        Ok(Dispatched::Responded(finalize(response)))
    }

    async fn forward(&self, target: &Target, request: &HttpRequest) -> Result<Dispatched, DispatchError> {
        let response = self.upstream.send(target, request).await?;
        Ok(Dispatched::Forwarded(finalize(response)))
    }

    async fn forward_override(
        &self,
        overlay: &HttpOverrideForwardedRequest,
        request: &HttpRequest,
    ) -> Result<Dispatched, DispatchError> {
        let mut outbound = request.clone();
        if let Some(request_override) = &overlay.request_override {
            override_request(&mut outbound, request_override);
        }
        if let Some(modifier) = &overlay.request_modifier {
            modify_request(&mut outbound, modifier)?;
        }
        let target = match overlay
            .request_override
            .as_ref()
            .and_then(|o| o.socket_address.as_ref())
        {
            Some(address) => Target::from(address),
            None => Target::of_request(&outbound)?,
        };

        let mut response = self.upstream.send(&target, &outbound).await?;
        if let Some(response_override) = &overlay.response_override {
            override_response(&mut response, response_override);
        }
        if let Some(modifier) = &overlay.response_modifier {
            modify_response(&mut response, modifier);
        }
        Ok(Dispatched::Forwarded(finalize(response)))
    }
}

async fn sleep(delay: Delay) {
    let duration = delay.duration();
    if !duration.is_zero() {
        debug!(delay_ms = duration.as_millis() as u64, "Delaying action");
        tokio::time::sleep(duration).await;
    }
}

/// Outbound form of a response: one `Set-Cookie` per cookie not already set, and
/// a content type implied by the body.
fn finalize(mut response: HttpResponse) -> HttpResponse {
    response.delay = None;

    let set_cookies = response.headers.get("set-cookie").unwrap_or_default();
    let missing: Vec<String> = response
        .cookies
        .entries()
        .iter()
        .filter(|(name, _)| !set_cookies.iter().any(|v| set_cookie_name(v) == Some(name.as_str())))
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    for cookie in missing {
        response.headers.append("Set-Cookie", cookie);
    }

    if !response.headers.contains("content-type") {
        let implied = response.body.as_ref().and_then(|body| match body {
            BodyContent::Json { content_type: None, .. } => Some("application/json"),
            BodyContent::Xml { content_type: None, .. } => Some("application/xml"),
            other => other.content_type(),
        });
        if let Some(content_type) = implied.map(str::to_string) {
            response.headers.append("Content-Type", content_type);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::callback::{forward_with, respond_with};
    use crate::model::{HttpCallback, HttpForward, HttpTemplate, Scheme, TemplateType};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    /// Records what it was asked to send and answers with a canned response.
    #[derive(Default)]
    struct FakeUpstream {
        sent: Mutex<Vec<(Target, HttpRequest)>>,
        fail: bool,
    }

    #[async_trait]
    impl UpstreamClient for FakeUpstream {
        async fn send(&self, target: &Target, request: &HttpRequest) -> Result<HttpResponse, ForwardError> {
            self.sent.lock().push((target.clone(), request.clone()));
            if self.fail {
                return Err(ForwardError::NoTarget("connection refused".into()));
            }
            Ok(HttpResponse::ok()
                .with_header("X-Upstream", "yes")
                .with_header("Set-Cookie", "up=1; Path=/")
                .with_text(format!("upstream saw {}", request.path)))
        }
    }

    fn dispatcher(upstream: Arc<FakeUpstream>) -> ActionDispatcher {
        ActionDispatcher::new(upstream, Arc::new(CallbackRegistry::new()))
    }

    #[tokio::test]
    async fn test_response_cookies_become_set_cookie() {
        let d = dispatcher(Arc::default());
        let action = Action::Response(
            HttpResponse::ok()
                .with_cookie("session", "abc")
                .with_cookie("theme", "dark")
                .with_header("Set-Cookie", "theme=light; Path=/")
                .with_body(BodyContent::json(json!({"ok": true}))),
        );
        let dispatched = d.execute(&action, &HttpRequest::new("GET", "/")).await.unwrap();
        let Dispatched::Responded(response) = dispatched else {
            panic!("expected a direct response");
        };
        assert_eq!(
            response.headers.get("set-cookie").unwrap(),
            ["theme=light; Path=/", "session=abc"]
        );
        assert_eq!(response.headers.get_first("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_delay_applied() {
        let d = dispatcher(Arc::default());
        let action = Action::Response(HttpResponse::ok().with_delay(Delay::milliseconds(50)));
        let started = Instant::now();
        let dispatched = d.execute(&action, &HttpRequest::new("GET", "/")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(dispatched.response().delay, None);
    }

    #[tokio::test]
    async fn test_forward_relays_unchanged() {
        let upstream = Arc::new(FakeUpstream::default());
        let d = dispatcher(upstream.clone());
        let action = Action::Forward(HttpForward {
            host: "backend".into(),
            port: 8080,
            scheme: Scheme::Http,
            delay: None,
        });
        let request = HttpRequest::new("GET", "/items").with_header("X-Client", "c");
        let dispatched = d.execute(&action, &request).await.unwrap();
        assert!(matches!(dispatched, Dispatched::Forwarded(_)));
        assert_eq!(dispatched.response().body_text(), "upstream saw /items");

        let sent = upstream.sent.lock();
        assert_eq!(sent[0].0, Target::new(Scheme::Http, "backend", 8080));
        assert_eq!(sent[0].1, request);
    }

    #[tokio::test]
    async fn test_forward_override_pipeline() {
        let upstream = Arc::new(FakeUpstream::default());
        let d = dispatcher(upstream.clone());
        let overlay: HttpOverrideForwardedRequest = serde_json::from_value(json!({
            "httpRequest": {"path": "/api/v1/users", "headers": {"Host": ["upstream.local:9000"]}},
            "requestModifier": {
                "path": {"regex": "^/api/v1", "substitution": "/v2"},
                "headers": {"add": {"X-Added": ["added"]}, "remove": ["X-Secret"]}
            },
            "httpResponse": {"statusCode": 203},
            "responseModifier": {"headers": {"remove": ["X-Upstream"]}}
        }))
        .unwrap();
        let request = HttpRequest::new("GET", "/original")
            .with_header("Host", "mock.local:1080")
            .with_header("X-Secret", "s");
        let dispatched = d
            .execute(&Action::ForwardOverride(overlay), &request)
            .await
            .unwrap();

        let response = dispatched.response();
        assert_eq!(response.status(), 203);
        assert!(!response.headers.contains("x-upstream"));
        assert_eq!(response.body_text(), "upstream saw /v2/users");

        let sent = upstream.sent.lock();
        let (target, outbound) = &sent[0];
        assert_eq!(*target, Target::new(Scheme::Http, "upstream.local", 9000));
        assert_eq!(outbound.headers.get_first("x-added"), Some("added"));
        assert!(!outbound.headers.contains("x-secret"));
    }

    #[tokio::test]
    async fn test_socket_address_wins_over_host() {
        let upstream = Arc::new(FakeUpstream::default());
        let d = dispatcher(upstream.clone());
        let overlay: HttpOverrideForwardedRequest = serde_json::from_value(json!({
            "httpRequest": {"socketAddress": {"host": "10.0.0.1", "port": 443, "scheme": "HTTPS"}}
        }))
        .unwrap();
        let request = HttpRequest::new("GET", "/").with_header("Host", "mock.local");
        d.execute(&Action::ForwardOverride(overlay), &request).await.unwrap();
        assert_eq!(
            upstream.sent.lock()[0].0,
            Target::new(Scheme::Https, "10.0.0.1", 443)
        );
    }

    #[tokio::test]
    async fn test_forward_failure_is_bad_gateway() {
        let upstream = Arc::new(FakeUpstream {
            fail: true,
            ..Default::default()
        });
        let d = dispatcher(upstream);
        let action = Action::Forward(HttpForward {
            host: "down".into(),
            port: 1,
            scheme: Scheme::Http,
            delay: None,
        });
        let err = d.execute(&action, &HttpRequest::new("GET", "/")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Forward(_)));
        assert_eq!(err.status(), 502);
        assert_eq!(err.to_response().status(), 502);
    }

    #[tokio::test]
    async fn test_templates() {
        let upstream = Arc::new(FakeUpstream::default());
        let d = dispatcher(upstream.clone());
        let request = HttpRequest::new("GET", "/somePath").with_header("X-Test", "value");

        let response_template = Action::Template {
            kind: ActionKind::Response,
            template: HttpTemplate {
                template_type: TemplateType::Mustache,
                template: r#"{'statusCode': 200, 'body': '{{ request.headers.x-test.0 }}'}"#.into(),
                delay: None,
            },
        };
        let dispatched = d.execute(&response_template, &request).await.unwrap();
        assert_eq!(dispatched.response().body_text(), "value");

        let forward_template = Action::Template {
            kind: ActionKind::Forward,
            template: HttpTemplate {
                template_type: TemplateType::Mustache,
                template: r#"{"path": "/proxied{{ request.path }}", "headers": {"Host": ["backend:7000"]}}"#.into(),
                delay: None,
            },
        };
        let dispatched = d.execute(&forward_template, &request).await.unwrap();
        assert!(matches!(dispatched, Dispatched::Forwarded(_)));
        let sent = upstream.sent.lock();
        assert_eq!(sent[0].0, Target::new(Scheme::Http, "backend", 7000));
        assert_eq!(sent[0].1.path, "/proxied/somePath");
        assert_eq!(sent[0].1.method, "GET");
    }

    #[tokio::test]
    async fn test_callbacks() {
        let upstream = Arc::new(FakeUpstream::default());
        let d = dispatcher(upstream.clone());
        d.callbacks()
            .register("teapot", respond_with(|_| HttpResponse::new(418)));
        d.callbacks().register(
            "reroute",
            forward_with(|req| req.clone().with_header("Host", "elsewhere:81")),
        );
        let callback = |kind, name: &str| Action::Callback {
            kind,
            callback: HttpCallback {
                callback_name: name.into(),
                delay: None,
            },
        };
        let request = HttpRequest::new("GET", "/cb");

        let dispatched = d.execute(&callback(ActionKind::Response, "teapot"), &request).await.unwrap();
        assert_eq!(dispatched.response().status(), 418);

        d.execute(&callback(ActionKind::Forward, "reroute"), &request).await.unwrap();
        assert_eq!(upstream.sent.lock()[0].0.host, "elsewhere");

        let err = d
            .execute(&callback(ActionKind::Response, "nobody"), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Callback(CallbackError::Unknown(_))));
        assert_eq!(err.status(), 500);

        let err = d
            .execute(&callback(ActionKind::Forward, "teapot"), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Callback(CallbackError::WrongOutput { .. })));
    }
}
