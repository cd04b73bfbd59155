//! Error types for countdown runs

use std::time::Duration;

use thiserror::Error;

/// Precondition violations detected when a run is submitted.
///
/// These are never surfaced to the caller as a `Result`: the engine reports
/// them on the warning channel and turns the offending call into a no-op,
/// so UI-driven callers don't have to wrap every interaction in failure
/// handling.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum RunError {
    #[error("countdown bounds must be finite (from: {from}, to: {to})")]
    NonFiniteBounds { from: f64, to: f64 },

    #[error("countdown start value {from} is below its target {to}")]
    InvertedBounds { from: f64, to: f64 },

    #[error("countdown step must be a positive finite number, got {0}")]
    InvalidStep(f64),

    #[error("countdown period must be non-zero, got {0:?}")]
    ZeroPeriod(Duration),
}
