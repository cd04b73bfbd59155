//! Scheduling strategies
//!
//! Builds the two periodic-tick strategies on top of the raw host
//! primitives:
//! - **Frame-driven**: re-arm a one-shot frame request every frame and fire
//!   the tick only once the elapsed time since a local marker reaches the
//!   period, then reset the marker. Tick boundaries land on frame
//!   boundaries, so the achieved period is a multiple of the frame
//!   interval.
//! - **Fixed-period**: pass the tick straight to the host's repeating
//!   timer.
//!
//! Both return a [`TimerHandle`], the sole way to stop the tick source.
//! The handle remembers which primitive produced it, so cancellation is
//! never routed to the wrong canceller.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::TimerMode;
use crate::host::{RawTimerId, TickCallback, TimerHost};

/// Cancellation capability for a scheduled periodic tick.
///
/// Clones share one cancellation flag: cancelling any clone stops the tick
/// source, and cancelling again is a no-op. Once cancelled, no further
/// callback fires.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Rc<Cell<bool>>,
    cancel: Rc<dyn Fn()>,
}

impl TimerHandle {
    pub(crate) fn new(cancelled: Rc<Cell<bool>>, cancel: impl Fn() + 'static) -> Self {
        Self {
            cancelled,
            cancel: Rc::new(cancel),
        }
    }

    /// Stop the tick source. Safe to call repeatedly.
    pub fn cancel(&self) {
        if self.cancelled.replace(true) {
            return;
        }
        (*self.cancel)();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}

/// Resolve the strategy actually used for this host: a frame request on a
/// host without a frame scheduler degrades to a fixed-period timer, while
/// an explicit interval request is always honored.
pub(crate) fn effective_mode(requested: TimerMode, host: &dyn TimerHost) -> TimerMode {
    match requested {
        TimerMode::Frame if host.has_frame_scheduler() => TimerMode::Frame,
        _ => TimerMode::Interval,
    }
}

/// Schedule `tick` to fire roughly every `period`.
pub(crate) fn schedule(
    host: &Rc<dyn TimerHost>,
    requested: TimerMode,
    period: Duration,
    tick: TickCallback,
) -> TimerHandle {
    match effective_mode(requested, host.as_ref()) {
        TimerMode::Frame => FrameLoop::spawn(host, period, tick),
        TimerMode::Interval => {
            let id = host.set_interval(period, tick);
            let host = Rc::clone(host);
            TimerHandle::new(Rc::new(Cell::new(false)), move || host.clear_interval(id))
        }
    }
}

/// Self-re-arming frame loop implementing the elapsed-time gate.
struct FrameLoop {
    host: Rc<dyn TimerHost>,
    period: Duration,
    tick: RefCell<TickCallback>,
    /// Time of the last firing (or of scheduling, before the first).
    marker: Cell<Instant>,
    /// The live frame request, re-armed on every frame.
    pending: Cell<RawTimerId>,
    cancelled: Rc<Cell<bool>>,
}

impl FrameLoop {
    fn spawn(host: &Rc<dyn TimerHost>, period: Duration, tick: TickCallback) -> TimerHandle {
        let cancelled = Rc::new(Cell::new(false));
        let frame_loop = Rc::new(FrameLoop {
            host: Rc::clone(host),
            period,
            tick: RefCell::new(tick),
            marker: Cell::new(host.now()),
            pending: Cell::new(0),
            cancelled: Rc::clone(&cancelled),
        });
        Self::arm(&frame_loop);

        let for_cancel = Rc::clone(&frame_loop);
        TimerHandle::new(cancelled, move || {
            for_cancel.host.cancel_frame(for_cancel.pending.get());
        })
    }

    fn arm(this: &Rc<Self>) {
        let me = Rc::clone(this);
        let id = this.host.request_frame(Box::new(move || Self::on_frame(&me)));
        this.pending.set(id);
    }

    fn on_frame(this: &Rc<Self>) {
        if this.cancelled.get() {
            return;
        }
        // Re-arm before doing any work so a cancel from inside the tick
        // always sees the live request id.
        Self::arm(this);

        let now = this.host.now();
        if now.duration_since(this.marker.get()) >= this.period {
            let mut tick = this.tick.borrow_mut();
            (*tick)();
            this.marker.set(this.host.now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHost;

    #[test]
    fn handle_cancel_is_idempotent() {
        let count = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&count);
        let handle = TimerHandle::new(Rc::new(Cell::new(false)), move || {
            counter.set(counter.get() + 1)
        });

        assert!(!handle.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn clones_share_cancellation() {
        let handle = TimerHandle::new(Rc::new(Cell::new(false)), || {});
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn frame_request_degrades_without_frame_scheduler() {
        let host = Rc::new(SimHost::without_frames());
        assert_eq!(
            effective_mode(TimerMode::Frame, host.as_ref()),
            TimerMode::Interval
        );
    }

    #[test]
    fn explicit_interval_request_is_honored() {
        let host = Rc::new(SimHost::new());
        assert!(host.has_frame_scheduler());
        assert_eq!(
            effective_mode(TimerMode::Interval, host.as_ref()),
            TimerMode::Interval
        );
    }

    #[test]
    fn frame_loop_fires_once_per_elapsed_period() {
        let host: Rc<SimHost> = Rc::new(SimHost::new());
        let dyn_host: Rc<dyn TimerHost> = Rc::clone(&host) as Rc<dyn TimerHost>;

        let count = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&count);
        let handle = schedule(
            &dyn_host,
            TimerMode::Frame,
            Duration::from_millis(250),
            Box::new(move || counter.set(counter.get() + 1)),
        );

        // 100 ms frames: the gate opens on every third frame.
        for _ in 0..9 {
            host.advance(Duration::from_millis(100));
            host.fire_frame();
        }
        assert_eq!(count.get(), 3);

        handle.cancel();
        assert_eq!(host.pending_frames(), 0);
        host.advance(Duration::from_millis(500));
        host.fire_frame();
        assert_eq!(count.get(), 3, "cancelled loop must not fire");
    }

    #[test]
    fn interval_schedule_cancels_through_host() {
        let host: Rc<SimHost> = Rc::new(SimHost::new());
        let dyn_host: Rc<dyn TimerHost> = Rc::clone(&host) as Rc<dyn TimerHost>;

        let count = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&count);
        let handle = schedule(
            &dyn_host,
            TimerMode::Interval,
            Duration::from_millis(100),
            Box::new(move || counter.set(counter.get() + 1)),
        );
        assert_eq!(host.active_intervals(), 1);

        host.advance(Duration::from_millis(250));
        assert_eq!(count.get(), 2);

        handle.cancel();
        assert_eq!(host.active_intervals(), 0);
        host.advance(Duration::from_millis(500));
        assert_eq!(count.get(), 2);
    }
}
