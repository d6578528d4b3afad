//! The mock server context: one store, one log, one dispatcher.

use crate::action::{ActionDispatcher, CallbackRegistry, ExpectationCallback, ForwardError, ReqwestUpstream, UpstreamClient};
use crate::config::Config;
use crate::expectation::{parse_expectations, ExpectationStore, ValidationError};
use crate::matcher::MatcherError;
use crate::model::{
    Action, Expectation, HttpRequest, HttpResponse, OpenApiDefinition, OpenApiExpectation, RequestDefinition,
};
use crate::openapi::{example_response, load_spec, select_operations, OpenApiError, Operation};
use crate::recording::{recorded_expectation, LogEntry, Outcome, RequestLog};
use crate::verify::{Verification, VerificationFailure, VerificationSequence, Verifier};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum UpsertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Matcher(#[from] MatcherError),
    #[error(transparent)]
    OpenApi(#[from] OpenApiError),
}

/// What `clear` selects.
#[derive(Debug, Clone, PartialEq)]
pub enum ClearTarget {
    Everything,
    Id(String),
    Matching(RequestDefinition),
}

/// Which state `clear` touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearType {
    Expectations,
    Log,
    #[default]
    All,
}

impl ClearType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "expectations" => Some(ClearType::Expectations),
            "log" => Some(ClearType::Log),
            "all" => Some(ClearType::All),
            _ => None,
        }
    }

    fn expectations(self) -> bool {
        matches!(self, ClearType::Expectations | ClearType::All)
    }

    fn log(self) -> bool {
        matches!(self, ClearType::Log | ClearType::All)
    }
}

pub struct MockServer {
    store: ExpectationStore,
    log: RequestLog,
    dispatcher: ActionDispatcher,
    port: AtomicU16,
}

impl MockServer {
    /// Server forwarding through a reqwest client configured from `config`.
    pub fn new(config: &Config) -> Result<Self, ForwardError> {
        let upstream = Arc::new(ReqwestUpstream::new(&config.forward)?);
        Ok(Self::with_upstream(upstream, config.log.max_entries))
    }

    pub fn with_upstream(upstream: Arc<dyn UpstreamClient>, max_log_entries: usize) -> Self {
        Self {
            store: ExpectationStore::new(),
            log: RequestLog::new(max_log_entries),
            dispatcher: ActionDispatcher::new(upstream, Arc::new(CallbackRegistry::new())),
            port: AtomicU16::new(0),
        }
    }

    pub fn store(&self) -> &ExpectationStore {
        &self.store
    }

    pub fn log(&self) -> &RequestLog {
        &self.log
    }

    /// Port of the listener serving this instance, 0 until bound.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }

    pub(crate) fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Relaxed);
    }

    pub fn register_callback(&self, name: impl Into<String>, handler: Arc<dyn ExpectationCallback>) {
        self.dispatcher.callbacks().register(name, handler);
    }

    pub fn upsert(&self, expectations: Vec<Expectation>) -> Result<Vec<Expectation>, MatcherError> {
        self.store.upsert(expectations)
    }

    /// Validate and upsert a JSON expectation or array of expectations.
    pub fn upsert_json(&self, body: &str) -> Result<Vec<Expectation>, UpsertError> {
        let expectations = parse_expectations(body)?;
        Ok(self.store.upsert(expectations)?)
    }

    /// One response expectation per selected (operation, response) pair.
    pub fn upsert_openapi(&self, expectation: &OpenApiExpectation) -> Result<Vec<Expectation>, UpsertError> {
        let document = load_spec(&expectation.spec_url_or_payload)?;
        let mut selected: Vec<(Operation, Option<&str>)> = Vec::new();
        match &expectation.operations_and_responses {
            None => {
                for operation in select_operations(&document, None)? {
                    selected.push((operation, None));
                }
            }
            Some(pairs) => {
                for (operation_id, status) in pairs {
                    for operation in select_operations(&document, Some(operation_id.as_str()))? {
                        selected.push((operation, Some(status.as_str())));
                    }
                }
            }
        }

        let expectations = selected
            .iter()
            .map(|(operation, status)| {
                let response = example_response(operation, *status)?;
                let definition = OpenApiDefinition {
                    spec_url_or_payload: expectation.spec_url_or_payload.clone(),
                    operation_id: Some(operation.operation_id.clone()),
                };
                Ok(Expectation::new(definition, Action::Response(response)))
            })
            .collect::<Result<Vec<_>, OpenApiError>>()?;
        Ok(self.store.upsert(expectations)?)
    }

    /// Match, dispatch and log one inbound request.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let Some(matched) = self.store.match_request(&request) else {
            debug!(method = %request.method, path = %request.path, "No expectation matched");
            self.log.append(request, None, Outcome::NoMatch);
            return HttpResponse::not_found();
        };

        let expectation_id = matched.id().to_string();
        match self
            .dispatcher
            .execute(&matched.expectation().action, &request)
            .await
        {
            Ok(dispatched) => {
                let response = dispatched.response().clone();
                debug!(
                    expectation_id = %expectation_id,
                    method = %request.method,
                    path = %request.path,
                    status = response.status(),
                    "Request handled"
                );
                self.log
                    .append(request, Some(expectation_id), dispatched.into_outcome());
                response
            }
            Err(e) => {
                warn!(
                    expectation_id = %expectation_id,
                    method = %request.method,
                    path = %request.path,
                    error = %e,
                    "Action failed"
                );
                let response = e.to_response();
                self.log.append(
                    request,
                    Some(expectation_id),
                    Outcome::Error {
                        reason: e.to_string(),
                    },
                );
                response
            }
        }
    }

    /// Idempotent. Id-based clears never touch the log.
    pub fn clear(&self, target: &ClearTarget, clear_type: ClearType) -> Result<(), MatcherError> {
        match target {
            ClearTarget::Everything => {
                if clear_type.expectations() {
                    self.store.reset();
                }
                if clear_type.log() {
                    self.log.clear();
                }
            }
            ClearTarget::Id(id) => {
                if clear_type.expectations() {
                    self.store.clear_by_id(id);
                }
            }
            ClearTarget::Matching(definition) => {
                let matcher = self.store.compile(definition)?;
                let removed: HashSet<String> = if clear_type.expectations() {
                    self.store.clear_matching(definition)?.into_iter().collect()
                } else {
                    HashSet::new()
                };
                if clear_type.log() {
                    let dropped = self.log.remove_where(|entry| {
                        matcher.matches(&entry.request)
                            || entry
                                .matched_expectation_id
                                .as_ref()
                                .is_some_and(|id| removed.contains(id))
                    });
                    debug!(entries = dropped, "Cleared log entries");
                }
            }
        }
        info!(clear_target = ?target, clear_type = ?clear_type, "Cleared");
        Ok(())
    }

    pub fn reset(&self) {
        self.store.reset();
        self.log.clear();
        info!("Reset expectations and request log");
    }

    fn log_entries(&self, filter: Option<&RequestDefinition>) -> Result<Vec<Arc<LogEntry>>, MatcherError> {
        let entries = self.log.snapshot();
        let Some(filter) = filter else {
            return Ok(entries);
        };
        let matcher = self.store.compile(filter)?;
        Ok(entries
            .into_iter()
            .filter(|entry| matcher.matches(&entry.request))
            .collect())
    }

    pub fn retrieve_requests(&self, filter: Option<&RequestDefinition>) -> Result<Vec<HttpRequest>, MatcherError> {
        Ok(self
            .log_entries(filter)?
            .iter()
            .map(|entry| entry.request.clone())
            .collect())
    }

    /// Matching log entries, oldest first.
    pub fn retrieve_log_entries(&self, filter: Option<&RequestDefinition>) -> Result<Vec<Arc<LogEntry>>, MatcherError> {
        self.log_entries(filter)
    }

    /// Log lines for matching entries, oldest first.
    pub fn retrieve_log_messages(&self, filter: Option<&RequestDefinition>) -> Result<Vec<String>, MatcherError> {
        Ok(self
            .log_entries(filter)?
            .iter()
            .flat_map(|entry| entry.messages())
            .collect())
    }

    pub fn retrieve_recorded_expectations(
        &self,
        filter: Option<&RequestDefinition>,
    ) -> Result<Vec<Expectation>, MatcherError> {
        Ok(self
            .log_entries(filter)?
            .iter()
            .filter_map(|entry| recorded_expectation(entry))
            .collect())
    }

    pub fn retrieve_active_expectations(
        &self,
        filter: Option<&RequestDefinition>,
    ) -> Result<Vec<Expectation>, MatcherError> {
        self.store.retrieve_active(filter)
    }

    fn verifier(&self) -> Verifier<'_> {
        Verifier::new(&self.store, &self.log)
    }

    pub fn verify(&self, verification: &Verification) -> Result<(), VerificationFailure> {
        self.verifier().verify(verification)
    }

    pub fn verify_sequence(&self, sequence: &VerificationSequence) -> Result<(), VerificationFailure> {
        self.verifier().verify_sequence(sequence)
    }

    pub fn verify_zero_interactions(&self) -> Result<(), VerificationFailure> {
        self.verifier().verify_zero_interactions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{respond_with, Target};
    use crate::model::{HttpForward, RequestMatcher, Scheme, Times, VerificationTimes};
    use async_trait::async_trait;

    struct EchoUpstream;

    #[async_trait]
    impl UpstreamClient for EchoUpstream {
        async fn send(&self, target: &Target, request: &HttpRequest) -> Result<HttpResponse, ForwardError> {
            if target.host == "down" {
                return Err(ForwardError::NoTarget("connection refused".into()));
            }
            Ok(HttpResponse::ok().with_text(format!("{} {}", request.method, request.path)))
        }
    }

    fn server() -> MockServer {
        MockServer::with_upstream(Arc::new(EchoUpstream), 100)
    }

    fn respond_on(path: &str, status: u16) -> Expectation {
        Expectation::new(
            RequestMatcher::new().with_path(path),
            Action::Response(HttpResponse::new(status)),
        )
    }

    fn forward_to(path: &str, host: &str) -> Expectation {
        Expectation::new(
            RequestMatcher::new().with_path(path),
            Action::Forward(HttpForward {
                host: host.into(),
                port: 80,
                scheme: Scheme::Http,
                delay: None,
            }),
        )
    }

    #[tokio::test]
    async fn test_times_then_not_found() {
        let server = server();
        server
            .upsert(vec![respond_on("/p", 200).with_times(Times::exactly(2))])
            .unwrap();
        let statuses: Vec<u16> = [
            server.handle(HttpRequest::new("GET", "/p")).await.status(),
            server.handle(HttpRequest::new("GET", "/p")).await.status(),
            server.handle(HttpRequest::new("GET", "/p")).await.status(),
        ]
        .into();
        assert_eq!(statuses, [200, 200, 404]);

        let entries = server.log().snapshot();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].outcome, Outcome::NoMatch);
        assert!(entries[0].matched_expectation_id.is_some());
    }

    #[tokio::test]
    async fn test_forward_failure_logged_as_error() {
        let server = server();
        server.upsert(vec![forward_to("/down", "down")]).unwrap();
        let response = server.handle(HttpRequest::new("GET", "/down")).await;
        assert_eq!(response.status(), 502);
        let entries = server.log().snapshot();
        assert!(matches!(&entries[0].outcome, Outcome::Error { reason } if reason.contains("connection refused")));
        assert_eq!(server.store().len(), 1);
    }

    #[tokio::test]
    async fn test_recorded_expectations_from_forwards() {
        let server = server();
        server
            .upsert(vec![forward_to("/fwd", "up"), respond_on("/local", 200)])
            .unwrap();
        server.handle(HttpRequest::new("GET", "/fwd")).await;
        server.handle(HttpRequest::new("GET", "/local")).await;
        let recorded = server.retrieve_recorded_expectations(None).unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].times, Times::once());
        let Action::Response(response) = &recorded[0].action else {
            panic!("expected a response action");
        };
        assert_eq!(response.body_text(), "GET /fwd");
    }

    #[tokio::test]
    async fn test_clear_by_matcher_removes_log_entries() {
        let server = server();
        let stored = server
            .upsert(vec![respond_on("/a.*", 200), respond_on("/b", 200)])
            .unwrap();
        server.handle(HttpRequest::new("GET", "/a1")).await;
        server.handle(HttpRequest::new("GET", "/b")).await;
        server.handle(HttpRequest::new("GET", "/zzz")).await;

        let filter: RequestDefinition = RequestMatcher::new().with_path("/a.*").into();
        server.clear(&ClearTarget::Matching(filter.clone()), ClearType::All).unwrap();
        assert!(server.store().get(&stored[0].id).is_none());
        assert!(server.store().get(&stored[1].id).is_some());
        let paths: Vec<String> = server
            .retrieve_requests(None)
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, ["/b", "/zzz"]);

        // idempotent
        server.clear(&ClearTarget::Matching(filter), ClearType::All).unwrap();
        assert_eq!(server.log().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_by_id_keeps_log() {
        let server = server();
        let stored = server.upsert(vec![respond_on("/a", 200)]).unwrap();
        server.handle(HttpRequest::new("GET", "/a")).await;
        server
            .clear(&ClearTarget::Id(stored[0].id.clone()), ClearType::All)
            .unwrap();
        assert!(server.store().is_empty());
        assert_eq!(server.log().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_log_only() {
        let server = server();
        server.upsert(vec![respond_on("/a", 200)]).unwrap();
        server.handle(HttpRequest::new("GET", "/a")).await;
        server.clear(&ClearTarget::Everything, ClearType::Log).unwrap();
        assert!(server.log().is_empty());
        assert_eq!(server.store().len(), 1);
        server.reset();
        assert!(server.store().is_empty());
    }

    #[tokio::test]
    async fn test_verify_through_server() {
        let server = server();
        server.upsert(vec![respond_on("/v", 200)]).unwrap();
        server.handle(HttpRequest::new("GET", "/v")).await;
        let definition: RequestDefinition = RequestMatcher::new().with_path("/v").into();
        assert!(server
            .verify(&Verification::request(definition.clone(), VerificationTimes::once()))
            .is_ok());
        assert!(server
            .verify_sequence(&VerificationSequence::requests([definition]))
            .is_ok());
        assert!(server.verify_zero_interactions().is_err());
    }

    #[tokio::test]
    async fn test_callback_registration() {
        let server = server();
        server.register_callback("teapot", respond_with(|_| HttpResponse::new(418)));
        server
            .upsert_json(
                r#"{"httpRequest": {"path": "/tea"}, "httpResponseCallback": {"callbackName": "teapot"}}"#,
            )
            .unwrap();
        assert_eq!(server.handle(HttpRequest::new("GET", "/tea")).await.status(), 418);
    }

    #[tokio::test]
    async fn test_upsert_json_validation_error() {
        let server = server();
        let err = server.upsert_json(r#"{"httpRequest": {"path": "/x"}}"#).unwrap_err();
        assert!(matches!(err, UpsertError::Validation(_)));
        assert!(err.to_string().starts_with("incorrect expectation json format for:"));
        assert!(server.store().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_openapi() {
        let server = server();
        let expectation = OpenApiExpectation {
            spec_url_or_payload: crate::openapi::tests::petstore(),
            operations_and_responses: Some(
                [("listPets".to_string(), "200".to_string())].into_iter().collect(),
            ),
        };
        let stored = server.upsert_openapi(&expectation).unwrap();
        assert_eq!(stored.len(), 1);
        let RequestDefinition::OpenApi(definition) = &stored[0].http_request else {
            panic!("expected an OpenAPI definition");
        };
        assert_eq!(definition.operation_id.as_deref(), Some("listPets"));

        let response = server.handle(HttpRequest::new("GET", "/v1/pets")).await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_str(&response.body_text()).unwrap();
        assert!(body.is_array());

        let missing = OpenApiExpectation {
            spec_url_or_payload: crate::openapi::tests::petstore(),
            operations_and_responses: Some(
                [("nope".to_string(), "200".to_string())].into_iter().collect(),
            ),
        };
        assert!(matches!(
            server.upsert_openapi(&missing),
            Err(UpsertError::OpenApi(OpenApiError::UnknownOperation(_)))
        ));
        assert_eq!(server.store().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_openapi_keeps_caller_order() {
        let server = server();
        let expectation: OpenApiExpectation = serde_json::from_value(serde_json::json!({
            "specUrlOrPayload": crate::openapi::tests::petstore(),
            "operationsAndResponses": {"showPetById": "200", "listPets": "200"}
        }))
        .unwrap();
        let stored = server.upsert_openapi(&expectation).unwrap();
        let ids: Vec<_> = stored
            .iter()
            .map(|e| match &e.http_request {
                RequestDefinition::OpenApi(definition) => definition.operation_id.clone(),
                RequestDefinition::Matcher(_) => None,
            })
            .collect();
        assert_eq!(ids, [Some("showPetById".to_string()), Some("listPets".to_string())]);
    }

    #[tokio::test]
    async fn test_concurrent_requests_respect_times() {
        let server = Arc::new(server());
        server
            .upsert(vec![respond_on("/limited", 200).with_times(Times::exactly(5))])
            .unwrap();
        let statuses = futures::future::join_all((0..20).map(|_| {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.handle(HttpRequest::new("GET", "/limited")).await.status() })
        }))
        .await;
        let served = statuses.into_iter().filter(|s| matches!(s, Ok(200))).count();
        assert_eq!(served, 5);
        assert_eq!(server.log().len(), 20);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_unmatched_request_is_logged() {
        let server = server();
        server.handle(HttpRequest::new("DELETE", "/unknown")).await;
        assert!(logs_contain("No expectation matched"));
        assert!(logs_contain("/unknown"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|line| line.contains("No expectation matched")).count() {
                1 => Ok(()),
                n => Err(format!("expected one miss line, found {n}")),
            }
        });
    }
}
