//! Expectation lifecycle: validation of incoming payloads and the ordered store.
//!
//! # Module Structure
//!
//! - `validation` - Itemized structural validation of control-plane payloads
//! - `store` - Priority-ordered store with atomic match-and-consume

mod store;
pub mod validation;

pub use store::{ExpectationStore, StoredExpectation};
#[allow(unused_imports)]
pub use validation::{
    parse_expectations, parse_openapi_expectation, parse_request_definition, parse_verification,
    parse_verification_sequence, ValidationError,
};
