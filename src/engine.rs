//! Countdown engine
//!
//! The state machine at the heart of the crate. A [`Countdown`] owns one
//! run at a time: `start` validates and schedules it, each tick decrements
//! the current value and reconciles it against the wall clock, listeners
//! observe the corrected value, and `suspend`/`resume`/`restart` replay
//! the retained run parameters without losing elapsed progress.
//!
//! # Misuse handling
//!
//! Lifecycle methods called in the wrong state (suspend while idle, resume
//! while running) warn and leave the engine unchanged rather than failing.
//! Rapid UI-driven callers should never need to guard these calls.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::backend::{self, TimerHandle};
use crate::config::{EngineOptions, RunConfig, TimerMode};
use crate::host::TimerHost;
use crate::registry::{self, TokenRegistry};

/// Lifecycle state of a countdown engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Suspended,
}

/// Wall-clock bookkeeping for the current run phase, recomputed whenever a
/// run (or resumed sub-run) begins. The run is expected to reach its
/// target at `started_at + span_ms`.
#[derive(Clone, Copy)]
struct Rectification {
    started_at: Instant,
    span_ms: f64,
}

/// Identifier returned by [`Countdown::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(f64)>;

/// A countdown engine.
///
/// Constructed against a [`TimerHost`] and (optionally) a shared
/// [`TokenRegistry`]; see [`EngineOptions`] for the recognized options.
/// Dropping the engine cancels any live run, like [`Countdown::destroy`].
pub struct Countdown {
    inner: Rc<Inner>,
}

struct Inner {
    token: String,
    mode: TimerMode,
    precision_ms: u64,
    log: bool,
    unique: bool,
    host: Rc<dyn TimerHost>,
    registry: TokenRegistry,
    state: Cell<EngineState>,
    current: Cell<f64>,
    last_run: RefCell<Option<RunConfig>>,
    rectification: Cell<Rectification>,
    handle: RefCell<Option<TimerHandle>>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener_id: Cell<u64>,
}

impl Countdown {
    /// An engine with a private registry. Countdowns in separate private
    /// registries never deduplicate against each other.
    pub fn new(options: EngineOptions, host: Rc<dyn TimerHost>) -> Self {
        Self::with_registry(options, host, TokenRegistry::new())
    }

    /// An engine sharing `registry` with other engines. Required for the
    /// `unique` option to be meaningful across engines.
    pub fn with_registry(
        options: EngineOptions,
        host: Rc<dyn TimerHost>,
        registry: TokenRegistry,
    ) -> Self {
        let token = options.token.unwrap_or_else(registry::generate_token);
        let now = host.now();
        Self {
            inner: Rc::new(Inner {
                token,
                mode: options.mode,
                precision_ms: options.precision_ms,
                log: options.log,
                unique: options.unique,
                host,
                registry,
                state: Cell::new(EngineState::Idle),
                current: Cell::new(0.0),
                last_run: RefCell::new(None),
                rectification: Cell::new(Rectification {
                    started_at: now,
                    span_ms: 0.0,
                }),
                handle: RefCell::new(None),
                listeners: RefCell::new(Vec::new()),
                next_listener_id: Cell::new(0),
            }),
        }
    }

    /// Begin a countdown. Precondition violations are warned and the call
    /// is a no-op; see [`crate::RunError`] for the checked conditions.
    pub fn start(&self, run: RunConfig) {
        Inner::start(&self.inner, run, false);
    }

    /// Halt the active run, retaining its progress for [`Countdown::resume`].
    pub fn suspend(&self) {
        let inner = &self.inner;
        if inner.state.get() != EngineState::Running {
            warn!(token = %inner.token, "suspend called while not running");
            return;
        }
        inner.cancel_handle();
        inner.state.set(EngineState::Suspended);
        if inner.log {
            debug!(token = %inner.token, current = inner.current.get(), "countdown suspended");
        }
    }

    /// Continue a suspended run from its retained current value. The run
    /// restarts as a fresh sub-run: its expected end is recomputed from
    /// the remaining value, not the original bounds.
    pub fn resume(&self) {
        let inner = &self.inner;
        if inner.state.get() != EngineState::Suspended {
            warn!(token = %inner.token, "resume called while not suspended");
            return;
        }
        let run = inner.last_run.borrow().clone();
        let Some(mut run) = run else {
            warn!(token = %inner.token, "resume called before any countdown was started");
            return;
        };
        run.from = inner.current.get();
        Inner::start(inner, run, true);
    }

    /// Replay the last accepted run from scratch, discarding any progress.
    pub fn restart(&self) {
        let inner = &self.inner;
        let run = inner.last_run.borrow().clone();
        let Some(run) = run else {
            warn!(token = %inner.token, "restart called before any countdown was started");
            return;
        };
        Inner::start(inner, run, false);
    }

    /// Cancel any live run and deregister the engine's token. Idempotent;
    /// also forgets the retained run parameters.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.log {
            debug!(token = %inner.token, "countdown destroyed");
        }
        inner.cancel_handle();
        inner.registry.remove(&inner.token);
        inner.last_run.replace(None);
        inner.state.set(EngineState::Idle);
    }

    /// Register an observer of the corrected value, invoked once per
    /// in-progress tick. Listeners run in registration order.
    pub fn add_listener(&self, listener: impl Fn(f64) + 'static) -> ListenerId {
        let inner = &self.inner;
        let id = ListenerId(inner.next_listener_id.get());
        inner.next_listener_id.set(id.0 + 1);
        inner.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    /// Drop a previously registered listener. No-op for unknown ids.
    pub fn remove_listener(&self, id: ListenerId) {
        self.inner
            .listeners
            .borrow_mut()
            .retain(|(lid, _)| *lid != id);
    }

    pub fn state(&self) -> EngineState {
        self.inner.state.get()
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.state.get() == EngineState::Suspended
    }

    /// The live countdown value. Zero before the first run.
    pub fn current_value(&self) -> f64 {
        self.inner.current.get()
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Countdown")
            .field("token", &self.inner.token)
            .field("state", &self.inner.state.get())
            .field("current", &self.inner.current.get())
            .finish()
    }
}

impl Inner {
    fn start(this: &Rc<Self>, run: RunConfig, resuming: bool) {
        if let Err(err) = run.validate() {
            warn!(token = %this.token, %err, "countdown rejected");
            return;
        }

        // A handle still owned here belongs to a superseded run.
        this.cancel_handle();

        let now = this.host.now();
        this.rectification.set(Rectification {
            started_at: now,
            span_ms: run.from / run.step * 1000.0,
        });

        if !resuming {
            *this.last_run.borrow_mut() = Some(run.clone());
        }

        if this.log {
            debug!(
                token = %this.token,
                from = run.from,
                to = run.to,
                step = run.step,
                period_ms = run.period.as_millis() as u64,
                resuming,
                "countdown starting"
            );
        }
        if let Some(callback) = run.on_start.as_deref() {
            callback();
        }

        if run.from == run.to {
            // Zero-length run: complete without ever scheduling.
            if this.log {
                debug!(token = %this.token, "countdown already at target");
            }
            this.state.set(EngineState::Idle);
            if let Some(callback) = run.on_complete.as_deref() {
                callback();
            }
            return;
        }

        this.current.set(run.from);

        let weak = Rc::downgrade(this);
        let tick_run = run.clone();
        let tick = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Inner::tick(&inner, &tick_run);
            }
        });

        if this.unique {
            this.registry.evict(&this.token);
        }
        let handle = backend::schedule(&this.host, this.mode, run.period, tick);
        this.registry.register(&this.token, handle.clone());
        *this.handle.borrow_mut() = Some(handle);
        this.state.set(EngineState::Running);
    }

    fn tick(this: &Rc<Self>, run: &RunConfig) {
        if this.log {
            debug!(token = %this.token, current = this.current.get(), "tick");
        }
        if this.current.get() > run.to {
            this.current.set(this.current.get() - run.step);
            if !this.rectify(run.step) {
                // The wall clock shows this run already elapsed past its
                // target; finish instead of emitting a nonsensical value.
                this.finish(run);
                return;
            }
            if this.current.get() > run.to {
                this.notify(this.current.get());
            } else {
                this.finish(run);
            }
        } else {
            this.finish(run);
        }
    }

    /// Reconcile the counter with wall-clock elapsed time. Corrections
    /// below the configured precision are skipped to avoid visible
    /// jitter. Returns false when the run has drifted past completion.
    fn rectify(&self, step: f64) -> bool {
        let rect = self.rectification.get();
        let now = self.host.now();
        let elapsed_ms = now.duration_since(rect.started_at).as_secs_f64() * 1000.0;
        let expected_remaining = step * (rect.span_ms - elapsed_ms);
        let offset_secs = self.current.get() - expected_remaining / 1000.0;

        if self.log {
            debug!(
                token = %self.token,
                expected = expected_remaining / 1000.0,
                actual = self.current.get(),
                offset = offset_secs,
                "rectify"
            );
        }

        if offset_secs > self.current.get() {
            return false;
        }
        if offset_secs >= self.precision_ms as f64 / 1000.0 {
            self.current.set(self.current.get() - offset_secs);
        }
        true
    }

    fn notify(&self, value: f64) {
        // Snapshot so listeners may add or remove listeners reentrantly.
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            (*listener)(value);
        }
    }

    fn finish(&self, run: &RunConfig) {
        self.cancel_handle();
        self.registry.remove(&self.token);
        self.state.set(EngineState::Idle);
        if self.log {
            debug!(token = %self.token, "countdown complete");
        }
        if let Some(callback) = run.on_complete.as_deref() {
            callback();
        }
    }

    fn cancel_handle(&self) {
        let handle = self.handle.borrow_mut().take();
        if let Some(handle) = handle {
            if self.log {
                debug!(token = %self.token, "cancelling active timer");
            }
            handle.cancel();
        }
    }
}
