//! In-memory aggregation buffer for DeepHealth health reports.
//!
//! Events asserting that an observer saw a subject in some [`Status`] are
//! coalesced per (subject, name, status) into a running count with first
//! and last seen timestamps. See [`Buffer`].

pub mod buffer;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod report;
pub mod status;

pub use buffer::{Aggregate, AggregateKey, AggregateValue, Buffer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use status::Status;
