//! Drift-corrected countdown engine
//!
//! This crate provides:
//! - **Engine**: the countdown state machine with wall-clock drift
//!   correction and a suspend/resume/restart lifecycle
//! - **Scheduling**: frame-driven and fixed-period tick strategies over
//!   pluggable host timer primitives
//! - **Registry**: token-based deduplication of concurrent countdowns
//! - **Simulation**: a deterministic host for testing countdown-driven
//!   code
//!
//! Execution is single-threaded and cooperative: engine methods and tick
//! callbacks all run on the host's logical thread, so countdowns are
//! driven by whatever pumps the host (an event loop, a tokio local set,
//! or a test advancing the simulated clock).

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod registry;
pub mod sim;


pub use backend::TimerHandle;
pub use config::{EngineOptions, RunConfig, TimerMode};
pub use engine::{Countdown, EngineState, ListenerId};
pub use error::RunError;
pub use host::{TimerHost, TokioHost};
pub use registry::TokenRegistry;
pub use sim::SimHost;
