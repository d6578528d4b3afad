//! Upstream forwarding.
//!
//! `UpstreamClient` is the seam between the dispatcher and the network; the
//! production implementation wraps a shared `reqwest::Client`.

use crate::config::ForwardConfig;
use crate::model::{BodyContent, CookieMap, HttpForward, HttpRequest, HttpResponse, MultiMap, Scheme, SocketAddress};
use async_trait::async_trait;
use std::fmt;
use tracing::{debug, warn};

/// Connection-scoped headers that never cross a proxy hop.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("no upstream target: {0}")]
    NoTarget(String),
    #[error("invalid upstream host header '{0}'")]
    InvalidHost(String),
    #[error("invalid request method '{0}'")]
    InvalidMethod(String),
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("upstream request to {target} failed: {source}")]
    Request {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Where a forwarded request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Parse a `Host` header value (`host`, `host:port`, `[v6]:port`); the port
    /// defaults to the scheme's.
    pub fn from_host_header(value: &str, scheme: Scheme) -> Result<Self, ForwardError> {
        let value = value.trim();
        let invalid = || ForwardError::InvalidHost(value.to_string());
        let (host, port) = if let Some(rest) = value.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail.strip_prefix(':') {
                Some(port) => Some(port.parse::<u16>().map_err(|_| invalid())?),
                None if tail.is_empty() => None,
                None => return Err(invalid()),
            };
            (format!("[{host}]"), port)
        } else {
            match value.rsplit_once(':') {
                Some((host, port)) => (host.to_string(), Some(port.parse::<u16>().map_err(|_| invalid())?)),
                None => (value.to_string(), None),
            }
        };
        if host.is_empty() || host == "[]" {
            return Err(invalid());
        }
        Ok(Self::new(scheme, host, port.unwrap_or(scheme.default_port())))
    }

    /// Target named by a request's `Host` header, scheme from its `secure` flag.
    pub fn of_request(request: &HttpRequest) -> Result<Self, ForwardError> {
        let host = request
            .headers
            .get_first("host")
            .ok_or_else(|| ForwardError::NoTarget("request has no Host header".into()))?;
        let scheme = if request.secure { Scheme::Https } else { Scheme::Http };
        Self::from_host_header(host, scheme)
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("{self}{path_and_query}")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl From<&HttpForward> for Target {
    fn from(forward: &HttpForward) -> Self {
        Self::new(forward.scheme, forward.host.clone(), forward.port)
    }
}

impl From<&SocketAddress> for Target {
    fn from(address: &SocketAddress) -> Self {
        Self::new(address.scheme, address.host.clone(), address.port)
    }
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, target: &Target, request: &HttpRequest) -> Result<HttpResponse, ForwardError>;
}

/// `UpstreamClient` over a pooled `reqwest::Client`.
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new(config: &ForwardConfig) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ForwardError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstream {
    async fn send(&self, target: &Target, request: &HttpRequest) -> Result<HttpResponse, ForwardError> {
        let url = target.url(&request.path_and_query());
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ForwardError::InvalidMethod(request.method.clone()))?;

        debug!(method = %method, url = %url, "Forwarding request upstream");

        let mut builder = self.client.request(method, &url);
        // Host comes from the URL, Content-Length from the body, Cookie from the
        // (possibly modified) cookie map
        for (name, values) in request.headers.iter() {
            if is_hop_by_hop(name)
                || name.eq_ignore_ascii_case("host")
                || name.eq_ignore_ascii_case("content-length")
                || name.eq_ignore_ascii_case("cookie")
            {
                continue;
            }
            for value in values {
                builder = builder.header(name, value);
            }
        }
        if !request.cookies.is_empty() {
            builder = builder.header("cookie", request.cookies.to_header());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let request_error = |source| ForwardError::Request {
            target: target.to_string(),
            source,
        };
        let response = builder.send().await.map_err(request_error)?;
        let status = response.status().as_u16();

        let mut headers = MultiMap::new();
        for (name, value) in response.headers() {
            if is_hop_by_hop(name.as_str()) || name == "content-length" {
                continue;
            }
            headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        let body = response.bytes().await.map_err(|e| {
            warn!(upstream = %target, error = %e, "Failed to read upstream response body");
            request_error(e)
        })?;

        debug!(status, upstream = %target, "Upstream responded");

        let cookies = set_cookie_pairs(&headers);
        Ok(HttpResponse {
            status_code: Some(status),
            body: BodyContent::from_bytes(&body, headers.get_first("content-type")),
            headers,
            cookies,
            ..Default::default()
        })
    }
}

/// Name/value pairs of every `Set-Cookie` header.
pub(crate) fn set_cookie_pairs(headers: &MultiMap) -> CookieMap {
    let mut cookies = CookieMap::new();
    for value in headers.get("set-cookie").unwrap_or_default() {
        if let Some(name) = set_cookie_name(value) {
            let pair = value.split(';').next().unwrap_or_default();
            let cookie_value = pair.split_once('=').map(|(_, v)| v.trim()).unwrap_or_default();
            cookies.push(name, cookie_value);
        }
    }
    cookies
}

pub(crate) fn set_cookie_name(header: &str) -> Option<&str> {
    let pair = header.split(';').next()?;
    let (name, _) = pair.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}
