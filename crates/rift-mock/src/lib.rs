// Library exports for the binary, integration tests and benchmarks

pub mod action;
pub mod config;
pub mod expectation;
pub mod json_format;
pub mod matcher;
pub mod model;
pub mod openapi;
pub mod recording;
pub mod server;
pub mod template;
pub mod verify;

pub use action::{respond_with, forward_with, CallbackOutput, ExpectationCallback};
pub use config::Config;
pub use model::{Action, Expectation, HttpRequest, HttpResponse, RequestDefinition, RequestMatcher};
pub use server::{ClearTarget, ClearType, MockListener, MockServer};
pub use verify::{Verification, VerificationFailure, VerificationSequence};
