//! Run telemetry: duration timeline and intercepted failure output.
//!
//! - [`Telemetry`] the shared collector (`took`, `write`, `print`);
//! - [`Tee`] / [`Inspect`] / [`FailureCatcher`] the forward-and-inspect sink it
//!   routes test output through.

mod collector;
mod tee;

pub use collector::{DurationRecord, REPORT_THRESHOLD, Telemetry, human};
pub use tee::{FAILURE_MARKERS, FailureCatcher, Inspect, Tee};
