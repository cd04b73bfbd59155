//! Host environment timer primitives
//!
//! The engine never talks to the operating system directly. A [`TimerHost`]
//! supplies the raw collaborators the scheduling strategies are built on:
//! a clock, a one-shot next-frame callback, and a fixed-period repeating
//! timer. Embedders wire the trait to their own event loop; tests inject
//! the simulated host from [`crate::sim`].

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tokio::time::MissedTickBehavior;

/// Identifier for a pending frame request or repeating timer.
///
/// Ids are only meaningful to the host that issued them and are never
/// reused, so cancelling a stale id is a harmless no-op.
pub type RawTimerId = u64;

/// Repeating callback driven by a host interval or the frame-gating loop.
pub type TickCallback = Box<dyn FnMut()>;

/// One-shot callback for a frame request.
pub type FrameCallback = Box<dyn FnOnce()>;

/// Raw periodic-callback primitives supplied by the host environment.
///
/// All methods run on the host's single logical thread; implementations
/// must tolerate being called back into from within a firing callback
/// (a tick cancelling its own timer is the common case).
pub trait TimerHost {
    /// Current time on the host clock.
    fn now(&self) -> Instant;

    /// Whether the host can schedule frame callbacks. When this is false
    /// the frame-driven strategy degrades to a fixed-period timer and
    /// `request_frame` is never called.
    fn has_frame_scheduler(&self) -> bool;

    /// Request a single invocation of `callback` at the next frame
    /// boundary.
    fn request_frame(&self, callback: FrameCallback) -> RawTimerId;

    /// Drop a pending frame request. No-op if it already fired.
    fn cancel_frame(&self, id: RawTimerId);

    /// Invoke `callback` repeatedly, every `period` at the earliest.
    fn set_interval(&self, period: Duration, callback: TickCallback) -> RawTimerId;

    /// Stop a repeating timer. No further invocations occur afterwards.
    fn clear_interval(&self, id: RawTimerId);
}

/// [`TimerHost`] for embedders already running a current-thread tokio
/// runtime.
///
/// Repeating timers are tasks spawned on the local set, ticking a
/// [`tokio::time::interval`] with [`MissedTickBehavior::Delay`], so a late
/// callback pushes the following one out rather than bunching. There is no
/// frame scheduler; frame-mode engines degrade to interval mode.
///
/// Must be used from within a [`tokio::task::LocalSet`] (callbacks are not
/// `Send`).
pub struct TokioHost {
    next_id: Cell<RawTimerId>,
    tasks: RefCell<HashMap<RawTimerId, tokio::task::JoinHandle<()>>>,
}

impl TokioHost {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            tasks: RefCell::new(HashMap::new()),
        }
    }

    fn alloc_id(&self) -> RawTimerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

impl Default for TokioHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHost for TokioHost {
    fn now(&self) -> Instant {
        // Follows the runtime clock, so paused-time tests stay consistent.
        tokio::time::Instant::now().into_std()
    }

    fn has_frame_scheduler(&self) -> bool {
        false
    }

    fn request_frame(&self, _callback: FrameCallback) -> RawTimerId {
        // Unreachable in practice: has_frame_scheduler() is false, so the
        // scheduling layer never routes a frame request here.
        0
    }

    fn cancel_frame(&self, _id: RawTimerId) {}

    fn set_interval(&self, period: Duration, mut callback: TickCallback) -> RawTimerId {
        let id = self.alloc_id();
        let task = tokio::task::spawn_local(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick resolves immediately; consume it so callbacks
            // start one full period in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                callback();
            }
        });
        self.tasks.borrow_mut().insert(id, task);
        id
    }

    fn clear_interval(&self, id: RawTimerId) {
        let task = self.tasks.borrow_mut().remove(&id);
        if let Some(task) = task {
            task.abort();
        }
    }
}
