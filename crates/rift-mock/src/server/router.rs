//! Route dispatch: control-plane operations under `/mockserver/`, everything else
//! goes through expectation matching.

use super::core::{ClearTarget, ClearType, MockServer, UpsertError};
use crate::expectation::{
    parse_openapi_expectation, parse_request_definition, parse_verification, parse_verification_sequence,
    ValidationError,
};
use crate::json_format::to_pretty_json;
use crate::model::{BodyContent, HttpRequest, HttpResponse, RequestDefinition};
use crate::recording::{RequestAndResponse, LOG_SEPARATOR};
use crate::verify::VerificationFailure;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

pub const CONTROL_PREFIX: &str = "/mockserver/";

/// Control-plane operations, addressed by the path segment after the prefix.
enum ControlRoute {
    Expectation,
    OpenApi,
    Clear,
    Reset,
    Retrieve,
    Verify,
    VerifySequence,
    Status,
}

impl ControlRoute {
    fn parse(operation: &str) -> Option<Self> {
        match operation.trim_end_matches('/') {
            "expectation" => Some(ControlRoute::Expectation),
            "openapi" => Some(ControlRoute::OpenApi),
            "clear" => Some(ControlRoute::Clear),
            "reset" => Some(ControlRoute::Reset),
            "retrieve" => Some(ControlRoute::Retrieve),
            "verify" => Some(ControlRoute::Verify),
            "verifySequence" => Some(ControlRoute::VerifySequence),
            "status" => Some(ControlRoute::Status),
            _ => None,
        }
    }
}

/// What `retrieve` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetrieveType {
    Requests,
    RequestResponses,
    RecordedExpectations,
    ActiveExpectations,
    Logs,
}

impl RetrieveType {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "requests" => Some(RetrieveType::Requests),
            "request_responses" => Some(RetrieveType::RequestResponses),
            "recorded_expectations" => Some(RetrieveType::RecordedExpectations),
            "active_expectations" => Some(RetrieveType::ActiveExpectations),
            "logs" => Some(RetrieveType::Logs),
            _ => None,
        }
    }
}

/// Main request router
pub async fn route(server: &MockServer, request: HttpRequest) -> HttpResponse {
    if request.method.eq_ignore_ascii_case("PUT") {
        if let Some(operation) = request.path.strip_prefix(CONTROL_PREFIX) {
            debug!(path = %request.path, "Control plane request");
            return match ControlRoute::parse(operation) {
                Some(route) => control(server, route, &request),
                None => HttpResponse::not_found(),
            };
        }
    }
    server.handle(request).await
}

fn control(server: &MockServer, route: ControlRoute, request: &HttpRequest) -> HttpResponse {
    let body = request.body_text();
    match route {
        ControlRoute::Expectation => match server.upsert_json(&body) {
            Ok(upserted) => json_response(201, &upserted),
            Err(e) => upsert_error(e),
        },
        ControlRoute::OpenApi => {
            let result = parse_openapi_expectation(&body)
                .map_err(UpsertError::from)
                .and_then(|expectation| server.upsert_openapi(&expectation));
            match result {
                Ok(upserted) => json_response(201, &upserted),
                Err(e) => upsert_error(e),
            }
        }
        ControlRoute::Clear => handle_clear(server, request, &body),
        ControlRoute::Reset => {
            server.reset();
            HttpResponse::ok()
        }
        ControlRoute::Retrieve => handle_retrieve(server, request, &body),
        ControlRoute::Verify => match parse_verification(&body) {
            Ok(verification) => verification_response(server.verify(&verification)),
            Err(e) => validation_error(&e),
        },
        ControlRoute::VerifySequence => match parse_verification_sequence(&body) {
            Ok(sequence) => verification_response(server.verify_sequence(&sequence)),
            Err(e) => validation_error(&e),
        },
        ControlRoute::Status => json_response(200, &json!({ "ports": [server.port()] })),
    }
}

fn handle_clear(server: &MockServer, request: &HttpRequest, body: &str) -> HttpResponse {
    let clear_type = match request.query_string_parameters.get_first("type") {
        None => ClearType::All,
        Some(value) => match ClearType::parse(value) {
            Some(clear_type) => clear_type,
            None => return invalid_type(value, "all, log, expectations"),
        },
    };
    let target = match clear_target(body) {
        Ok(target) => target,
        Err(e) => return validation_error(&e),
    };
    match server.clear(&target, clear_type) {
        Ok(()) => HttpResponse::ok(),
        Err(e) => text_response(400, &e.to_string()),
    }
}

/// Empty body clears everything, `{"id": ...}` one expectation, anything else is a matcher.
fn clear_target(body: &str) -> Result<ClearTarget, ValidationError> {
    if body.trim().is_empty() {
        return Ok(ClearTarget::Everything);
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let (1, Some(Value::String(id))) = (map.len(), map.get("id")) {
            return Ok(ClearTarget::Id(id.clone()));
        }
    }
    parse_request_definition(body).map(ClearTarget::Matching)
}

fn handle_retrieve(server: &MockServer, request: &HttpRequest, body: &str) -> HttpResponse {
    let retrieve_type = match request.query_string_parameters.get_first("type") {
        None => RetrieveType::Requests,
        Some(value) => match RetrieveType::parse(value) {
            Some(retrieve_type) => retrieve_type,
            None => {
                return invalid_type(
                    value,
                    "requests, request_responses, recorded_expectations, active_expectations, logs",
                )
            }
        },
    };
    let filter: Option<RequestDefinition> = if body.trim().is_empty() {
        None
    } else {
        match parse_request_definition(body) {
            Ok(definition) => Some(definition),
            Err(e) => return validation_error(&e),
        }
    };
    let filter = filter.as_ref();

    let result = match retrieve_type {
        RetrieveType::Requests => server
            .retrieve_requests(filter)
            .map(|requests| json_response(200, &requests)),
        RetrieveType::RequestResponses => server.retrieve_log_entries(filter).map(|entries| {
            let pairs: Vec<RequestAndResponse<'_>> =
                entries.iter().map(|entry| RequestAndResponse::from(&**entry)).collect();
            json_response(200, &pairs)
        }),
        RetrieveType::RecordedExpectations => server
            .retrieve_recorded_expectations(filter)
            .map(|expectations| json_response(200, &expectations)),
        RetrieveType::ActiveExpectations => server
            .retrieve_active_expectations(filter)
            .map(|expectations| json_response(200, &expectations)),
        RetrieveType::Logs => server
            .retrieve_log_messages(filter)
            .map(|messages| text_response(200, &messages.join(LOG_SEPARATOR))),
    };
    result.unwrap_or_else(|e| text_response(400, &e.to_string()))
}

fn verification_response(result: Result<(), VerificationFailure>) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::new(202),
        Err(VerificationFailure::Matcher(e)) => text_response(400, &e.to_string()),
        Err(failure) => {
            info!(reason = %failure, "Verification failed");
            text_response(406, &failure.to_string())
        }
    }
}

fn invalid_type(value: &str, supported: &str) -> HttpResponse {
    text_response(
        400,
        &format!(
            "\"{value}\" is not a valid value for \"type\" parameter, only the following values are supported [{supported}]"
        ),
    )
}

fn upsert_error(error: UpsertError) -> HttpResponse {
    match error {
        UpsertError::Validation(e) => validation_error(&e),
        other => text_response(400, &other.to_string()),
    }
}

fn validation_error(error: &ValidationError) -> HttpResponse {
    debug!(subject = error.subject, errors = error.errors.len(), "Rejected control-plane payload");
    text_response(400, &error.to_string())
}

fn json_response<T: Serialize + ?Sized>(status: u16, body: &T) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("content-type", "application/json; charset=utf-8")
        .with_body(BodyContent::text(to_pretty_json(body)))
}

fn text_response(status: u16, message: &str) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_text(message)
}
