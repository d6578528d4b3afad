//! Conversion between hyper messages and the wire model.

use crate::action::is_hop_by_hop;
use crate::model::{CookieMap, HttpRequest, HttpResponse};
use bytes::Bytes;
use http_body_util::Full;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode, Version};

/// Build the model request for an inbound plain-HTTP request.
pub fn to_http_request(parts: &Parts, body: Bytes) -> HttpRequest {
    let mut request = HttpRequest::new(parts.method.as_str(), parts.uri.path());
    if let Some(query) = parts.uri.query() {
        request.query_string_parameters = HttpRequest::parse_query(query);
    }
    for (name, value) in &parts.headers {
        request
            .headers
            .append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }
    if let Some(cookies) = request.headers.get("cookie") {
        request.cookies = CookieMap::parse_header(cookies.iter().map(String::as_str));
    }

    let connection = request.headers.get_first("connection").map(str::to_ascii_lowercase);
    request.keep_alive = match parts.version {
        Version::HTTP_09 | Version::HTTP_10 => connection.as_deref() == Some("keep-alive"),
        _ => connection.as_deref() != Some("close"),
    };
    request.body = body;
    request
}

/// Render a model response for hyper. Unknown status codes become 500.
pub fn to_hyper_response(response: &HttpResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(response.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, values) in response.headers.iter() {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        for value in values {
            builder = builder.header(name, value.as_str());
        }
    }
    if let Some(reason) = response
        .reason_phrase
        .as_ref()
        .and_then(|r| hyper::ext::ReasonPhrase::try_from(r.clone().into_bytes()).ok())
    {
        builder = builder.extension(reason);
    }

    builder
        .body(Full::new(Bytes::from(response.body_bytes())))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(Full::new(Bytes::from("Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
