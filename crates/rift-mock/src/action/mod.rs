//! Action dispatch: turning a matched expectation into a response.
//!
//! Each execution walks `selected -> delayed -> executing -> completed | failed`.
//! Direct responses are built locally; forwarding actions go through an
//! `UpstreamClient` after the request override and modifier have been applied.
//! Upstream failures surface as `ForwardError` and become 502 responses; there is
//! no retry.
//!
//! # Module Structure
//!
//! - `dispatcher` - `ActionDispatcher` and the outcome of an execution
//! - `forward` - Upstream targets and the reqwest-backed client
//! - `modifier` - Request/response overrides and modifiers
//! - `callback` - Named callbacks registered at runtime

mod callback;
mod dispatcher;
mod forward;
mod modifier;

#[allow(unused_imports)]
pub use callback::{
    forward_with, respond_with, CallbackError, CallbackOutput, CallbackRegistry, ExpectationCallback,
};
pub use dispatcher::{ActionDispatcher, DispatchError, Dispatched};
#[allow(unused_imports)]
pub use forward::{is_hop_by_hop, ForwardError, ReqwestUpstream, Target, UpstreamClient};
#[allow(unused_imports)]
pub use modifier::{modify_request, modify_response, override_request, override_response};
