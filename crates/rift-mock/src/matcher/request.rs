//! Compiled request matchers.

use super::body_matcher::CompiledBodyMatcher;
use super::field_matcher::{CompiledCookieMatchers, CompiledKeyMatchers};
use super::path_matcher::CompiledPathMatcher;
use super::string_matcher::CompiledNottable;
use super::MatcherError;
use crate::model::{CookieMap, HttpRequest, KeyMatchers, MultiMap, RequestDefinition, RequestMatcher};
use crate::openapi::OpenApiCache;
use std::sync::Arc;

/// A `RequestMatcher` with every field pre-compiled.
#[derive(Debug, Clone)]
pub struct CompiledRequestMatcher {
    source: RequestMatcher,
    method: Option<CompiledNottable>,
    path: Option<CompiledPathMatcher>,
    path_parameters: CompiledKeyMatchers,
    query_string_parameters: CompiledKeyMatchers,
    headers: CompiledKeyMatchers,
    cookies: CompiledCookieMatchers,
    body: Option<CompiledBodyMatcher>,
}

impl CompiledRequestMatcher {
    pub fn compile(matcher: &RequestMatcher) -> Result<Self, MatcherError> {
        Ok(Self {
            source: matcher.clone(),
            method: matcher
                .method
                .as_ref()
                .map(|m| CompiledNottable::compile(m, true))
                .transpose()?,
            path: matcher
                .path
                .as_ref()
                .map(CompiledPathMatcher::compile)
                .transpose()?,
            path_parameters: CompiledKeyMatchers::compile(&matcher.path_parameters, false)?,
            query_string_parameters: CompiledKeyMatchers::compile(&matcher.query_string_parameters, false)?,
            headers: CompiledKeyMatchers::compile(&matcher.headers, true)?,
            cookies: CompiledCookieMatchers::compile(&matcher.cookies)?,
            body: matcher
                .body
                .as_ref()
                .map(CompiledBodyMatcher::compile)
                .transpose()?,
        })
    }

    pub fn source(&self) -> &RequestMatcher {
        &self.source
    }

    pub fn matches(&self, request: &HttpRequest) -> bool {
        self.method_matches(&request.method)
            && self.path_matches(&request.path)
            && self.query_string_parameters.matches(&request.query_string_parameters)
            && self.headers.matches(&request.headers)
            && self.cookies.matches(&request.cookies)
            && self.body_matches(&request.body, request.content_type())
            && self.source.secure.is_none_or(|s| s == request.secure)
            && self.source.keep_alive.is_none_or(|k| k == request.keep_alive)
    }

    fn method_matches(&self, method: &str) -> bool {
        self.method.as_ref().is_none_or(|m| m.matches(method))
    }

    /// Path plus any path parameters, which need a template binding.
    fn path_matches(&self, path: &str) -> bool {
        let bindings = match &self.path {
            Some(matcher) => match matcher.matches(path) {
                Some(bindings) => bindings,
                None => return false,
            },
            None => MultiMap::new(),
        };
        self.path_parameters.is_empty() || self.path_parameters.matches(&bindings)
    }

    fn body_matches(&self, body: &[u8], content_type: Option<&str>) -> bool {
        self.body.as_ref().is_none_or(|b| b.matches(body, content_type))
    }

    /// Whether a stored matcher falls within this filter.
    ///
    /// Every field the filter specifies must either equal the candidate's field or
    /// accept the candidate's field read as a concrete value. Unspecified filter
    /// fields accept anything.
    pub fn is_compatible(&self, candidate: &RequestMatcher) -> bool {
        let filter = &self.source;
        let method_ok = filter.method.is_none()
            || filter.method == candidate.method
            || candidate
                .method
                .as_ref()
                .and_then(|m| m.as_literal())
                .is_some_and(|m| self.method_matches(m));
        let path_ok = (filter.path.is_none() && filter.path_parameters.is_empty())
            || (filter.path == candidate.path && filter.path_parameters == candidate.path_parameters)
            || candidate
                .path
                .as_ref()
                .and_then(|p| p.as_literal())
                .is_some_and(|p| self.path_matches(p));
        let query_ok = filter.query_string_parameters.is_empty()
            || filter.query_string_parameters == candidate.query_string_parameters
            || self
                .query_string_parameters
                .matches(&literal_map(&candidate.query_string_parameters));
        let headers_ok = filter.headers.is_empty()
            || filter.headers == candidate.headers
            || self.headers.matches(&literal_map(&candidate.headers));
        let cookies_ok = filter.cookies.is_empty()
            || filter.cookies == candidate.cookies
            || self.cookies.matches(&literal_cookies(candidate));
        let body_ok = filter.body.is_none()
            || filter.body == candidate.body
            || candidate
                .body
                .as_ref()
                .and_then(|b| b.as_literal())
                .is_some_and(|bytes| {
                    let headers = literal_map(&candidate.headers);
                    self.body_matches(&bytes, headers.get_first("content-type"))
                });
        method_ok
            && path_ok
            && query_ok
            && headers_ok
            && cookies_ok
            && body_ok
            && (filter.secure.is_none() || filter.secure == candidate.secure)
            && (filter.keep_alive.is_none() || filter.keep_alive == candidate.keep_alive)
    }
}

fn literal_map(matchers: &KeyMatchers) -> MultiMap {
    let mut map = MultiMap::new();
    for entry in matchers.iter() {
        if let Some(name) = entry.name.as_literal() {
            for value in entry.values.iter().filter_map(|v| v.as_literal()) {
                map.append(name, value);
            }
        }
    }
    map
}

fn literal_cookies(candidate: &RequestMatcher) -> CookieMap {
    let mut cookies = CookieMap::new();
    for cookie in candidate.cookies.iter() {
        if let (Some(name), Some(value)) = (cookie.name.as_literal(), cookie.value.as_literal()) {
            cookies.push(name, value);
        }
    }
    cookies
}

/// A compiled `RequestDefinition`: one matcher, or the OR of an OpenAPI
/// document's operations.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    Request(Arc<CompiledRequestMatcher>),
    AnyOf(Arc<[CompiledRequestMatcher]>),
}

impl CompiledMatcher {
    pub fn compile(definition: &RequestDefinition, openapi: &OpenApiCache) -> Result<Self, MatcherError> {
        match definition {
            RequestDefinition::Matcher(matcher) => Ok(CompiledMatcher::Request(Arc::new(
                CompiledRequestMatcher::compile(matcher)?,
            ))),
            RequestDefinition::OpenApi(definition) => Ok(CompiledMatcher::AnyOf(openapi.compile(definition)?)),
        }
    }

    pub fn matches(&self, request: &HttpRequest) -> bool {
        match self {
            CompiledMatcher::Request(matcher) => matcher.matches(request),
            CompiledMatcher::AnyOf(matchers) => matchers.iter().any(|m| m.matches(request)),
        }
    }

    /// One compiled matcher per alternative.
    pub fn alternatives(&self) -> &[CompiledRequestMatcher] {
        match self {
            CompiledMatcher::Request(matcher) => std::slice::from_ref(matcher.as_ref()),
            CompiledMatcher::AnyOf(matchers) => matchers,
        }
    }

    /// Whether anything this filter selects overlaps with `candidate`.
    pub fn is_compatible(&self, candidate: &CompiledMatcher) -> bool {
        self.alternatives().iter().any(|filter| {
            candidate
                .alternatives()
                .iter()
                .any(|c| filter.is_compatible(c.source()))
        })
    }
}
