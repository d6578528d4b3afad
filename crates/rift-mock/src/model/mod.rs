//! Wire-level data model for expectations, requests, responses and actions.
//!
//! Every type here is plain data with serde support in the camelCase JSON shape
//! clients send to the control plane. Matching and dispatch logic lives in
//! `matcher` and `action`.
//!
//! ## Module Structure
//!
//! - `nottable`: negatable / schema-typed strings
//! - `multimap`: headers, query parameters and cookies (concrete and matcher forms)
//! - `body`: body matchers and concrete bodies
//! - `request`: concrete requests, request matchers, OpenAPI references
//! - `response`: responses
//! - `times`: times, TTL, delays and verification bounds
//! - `action`: the closed action set and modifiers
//! - `expectation`: expectations and OpenAPI expectations

mod action;
mod body;
mod expectation;
mod multimap;
mod nottable;
mod request;
mod response;
mod times;

#[allow(unused_imports)]
pub use action::{
    Action, ActionKind, CookieModifier, HttpCallback, HttpForward, HttpOverrideForwardedRequest,
    HttpTemplate, MultiMapModifier, PathModifier, RequestModifier, RequestOverride,
    ResponseModifier, ResponseOverride, Scheme, SocketAddress, TemplateType,
};
#[allow(unused_imports)]
pub use body::{BodyContent, BodyMatcher, MatchType};
#[allow(unused_imports)]
pub use expectation::{Expectation, OpenApiExpectation, ACTION_KEYS};
#[allow(unused_imports)]
pub use multimap::{CookieMap, CookieMatchers, KeyMatchers, KeyToMultiValue, KeyToValue, MultiMap};
pub use nottable::NottableString;
#[allow(unused_imports)]
pub use request::{HttpRequest, OpenApiDefinition, RequestDefinition, RequestMatcher};
pub use response::HttpResponse;
#[allow(unused_imports)]
pub use times::{Delay, TimeToLive, TimeUnit, Times, VerificationTimes};
