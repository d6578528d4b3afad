//! Request recording: the append-only log every inbound request lands in.
//!
//! Each entry carries a sequence number, the request as received, the id of the
//! expectation that handled it (if any) and the outcome. Verification, retrieval and
//! recorded-expectation export all read snapshots of the log.
//!
//! # Module Structure
//!
//! - `types` - Log entries and outcomes
//! - `store` - The bounded, sequence-numbered log
//! - `expectation_generator` - Replay expectations from forwarded traffic

mod expectation_generator;
mod store;
mod types;

pub use expectation_generator::recorded_expectation;
#[allow(unused_imports)]
pub use store::{RequestLog, DEFAULT_MAX_ENTRIES};
pub use types::{LogEntry, Outcome, RequestAndResponse, LOG_SEPARATOR};
