//! Engine and run configuration
//!
//! Two layers of configuration exist:
//! - [`EngineOptions`]: set once at construction (token, scheduling mode,
//!   correction precision). Serde-derived so embedders can load it from
//!   config files.
//! - [`RunConfig`]: supplied per `start` call (bounds, step, period,
//!   lifecycle callbacks). Cheaply cloneable so suspended and finished
//!   runs can be replayed by `resume`/`restart`.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// Which host primitive drives the periodic tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    /// Loop over one-shot next-frame callbacks, firing the tick once the
    /// elapsed time since the last firing reaches the period. Aligned to
    /// frame boundaries, so the achieved period is always a multiple of
    /// the frame interval.
    #[default]
    Frame,

    /// A host repeating timer at exactly the requested period. Lower setup
    /// overhead, still subject to host scheduler jitter.
    Interval,
}

/// Construction-time options for a countdown engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Identity used to deduplicate concurrently running countdowns.
    /// Generated from a process-wide counter when absent.
    #[serde(default)]
    pub token: Option<String>,

    /// Preferred scheduling strategy. Frame mode silently degrades to
    /// interval mode on hosts without a frame scheduler.
    #[serde(default)]
    pub mode: TimerMode,

    /// Correction threshold in milliseconds. Accumulated drift below this
    /// is left uncorrected to avoid visible jitter in the delivered value.
    #[serde(default = "default_precision_ms")]
    pub precision_ms: u64,

    /// Emit per-tick debug logging.
    #[serde(default)]
    pub log: bool,

    /// When set, starting a countdown cancels any other active countdown
    /// registered under the same token.
    #[serde(default)]
    pub unique: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            token: None,
            mode: TimerMode::default(),
            precision_ms: default_precision_ms(),
            log: false,
            unique: false,
        }
    }
}

fn default_precision_ms() -> u64 {
    100
}

/// Parameters for a single countdown run.
///
/// `from` counts down to `to` in `step`-sized decrements, one per `period`.
/// The optional callbacks fire exactly once per run: `on_start` always,
/// `on_complete` only when the run reaches its target.
#[derive(Clone)]
pub struct RunConfig {
    pub from: f64,
    pub to: f64,
    pub step: f64,
    pub period: Duration,
    pub on_start: Option<Rc<dyn Fn()>>,
    pub on_complete: Option<Rc<dyn Fn()>>,
}

impl RunConfig {
    /// A run from `from` down to `to` with the default one-second period.
    pub fn new(from: f64, to: f64, step: f64) -> Self {
        Self {
            from,
            to,
            step,
            period: Duration::from_secs(1),
            on_start: None,
            on_complete: None,
        }
    }

    /// Override the tick period.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Callback invoked when the run is accepted, before the first tick.
    pub fn on_start(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_start = Some(Rc::new(callback));
        self
    }

    /// Callback invoked when the run reaches its target.
    pub fn on_complete(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_complete = Some(Rc::new(callback));
        self
    }

    /// Check the run preconditions. Violations are reported by the engine
    /// on the warning channel; the offending `start` becomes a no-op.
    pub(crate) fn validate(&self) -> Result<(), RunError> {
        if !self.from.is_finite() || !self.to.is_finite() {
            return Err(RunError::NonFiniteBounds {
                from: self.from,
                to: self.to,
            });
        }
        if self.from < self.to {
            return Err(RunError::InvertedBounds {
                from: self.from,
                to: self.to,
            });
        }
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(RunError::InvalidStep(self.step));
        }
        if self.period.is_zero() {
            return Err(RunError::ZeroPeriod(self.period));
        }
        Ok(())
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("step", &self.step)
            .field("period", &self.period)
            .field("on_start", &self.on_start.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let options = EngineOptions::default();
        assert_eq!(options.token, None);
        assert_eq!(options.mode, TimerMode::Frame);
        assert_eq!(options.precision_ms, 100);
        assert!(!options.log);
        assert!(!options.unique);
    }

    #[test]
    fn run_defaults() {
        let run = RunConfig::new(10.0, 0.0, 1.0);
        assert_eq!(run.period, Duration::from_secs(1));
        assert!(run.on_start.is_none());
        assert!(run.on_complete.is_none());
        assert!(run.validate().is_ok());
    }

    #[test]
    fn validation_rejects_inverted_bounds() {
        let run = RunConfig::new(0.0, 5.0, 1.0);
        assert_eq!(
            run.validate(),
            Err(RunError::InvertedBounds { from: 0.0, to: 5.0 })
        );
    }

    #[test]
    fn validation_rejects_non_finite_bounds() {
        assert!(RunConfig::new(f64::NAN, 0.0, 1.0).validate().is_err());
        assert!(RunConfig::new(10.0, f64::NEG_INFINITY, 1.0).validate().is_err());
    }

    #[test]
    fn validation_rejects_bad_step() {
        assert_eq!(
            RunConfig::new(10.0, 0.0, 0.0).validate(),
            Err(RunError::InvalidStep(0.0))
        );
        assert!(RunConfig::new(10.0, 0.0, -1.0).validate().is_err());
        assert!(RunConfig::new(10.0, 0.0, f64::NAN).validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_period() {
        let run = RunConfig::new(10.0, 0.0, 1.0).period(Duration::ZERO);
        assert_eq!(run.validate(), Err(RunError::ZeroPeriod(Duration::ZERO)));
    }

    #[test]
    fn equal_bounds_are_valid() {
        assert!(RunConfig::new(5.0, 5.0, 1.0).validate().is_ok());
    }
}
