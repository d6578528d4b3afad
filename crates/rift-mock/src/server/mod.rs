//! The HTTP surface of the mock server.
//!
//! `MockServer` owns the expectation store, the request log and the action
//! dispatcher; `MockListener` serves it over HTTP/1.1. Requests whose path starts
//! with `/mockserver/` and whose method is `PUT` are control-plane operations;
//! everything else is matched against expectations.
//!
//! # Module Structure
//!
//! - `core` - The server context and its operations
//! - `router` - Control-plane routing
//! - `handler` - hyper <-> model conversion
//! - `listener` - Accept loop

mod core;
mod handler;
mod listener;
mod router;

pub use self::core::{ClearTarget, ClearType, MockServer, UpsertError};
#[allow(unused_imports)]
pub use handler::{to_http_request, to_hyper_response};
pub use listener::MockListener;
#[allow(unused_imports)]
pub use router::{route, CONTROL_PREFIX};
