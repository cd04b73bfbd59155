//! Simulated host environment
//!
//! [`SimHost`] is a [`TimerHost`] whose clock only moves when the test
//! moves it. Repeating timers fire while [`SimHost::advance`] walks the
//! clock forward, frame callbacks fire when [`SimHost::fire_frame`] is
//! called, and a configurable delivery latency models hosts whose
//! callbacks always arrive late. Public so embedders can test
//! countdown-driven code deterministically.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::host::{FrameCallback, RawTimerId, TickCallback, TimerHost};

struct IntervalEntry {
    id: RawTimerId,
    period: Duration,
    next_due: Cell<Instant>,
    // Shared so the entry can fire without holding the table borrow;
    // callbacks are free to add or clear timers reentrantly.
    callback: Rc<RefCell<TickCallback>>,
}

/// Deterministic, manually driven timer host.
pub struct SimHost {
    now: Cell<Instant>,
    next_id: Cell<RawTimerId>,
    frames_supported: bool,
    /// Extra delay applied to every interval firing.
    latency: Cell<Duration>,
    frames: RefCell<Vec<(RawTimerId, FrameCallback)>>,
    intervals: RefCell<Vec<IntervalEntry>>,
}

impl SimHost {
    /// A host with both a frame scheduler and repeating timers.
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::now()),
            next_id: Cell::new(1),
            frames_supported: true,
            latency: Cell::new(Duration::ZERO),
            frames: RefCell::new(Vec::new()),
            intervals: RefCell::new(Vec::new()),
        }
    }

    /// A host without a frame scheduler, for exercising the degradation
    /// policy.
    pub fn without_frames() -> Self {
        Self {
            frames_supported: false,
            ..Self::new()
        }
    }

    /// Make every subsequent interval callback arrive `latency` after its
    /// nominal due time, simulating a sluggish scheduler.
    pub fn set_latency(&self, latency: Duration) {
        self.latency.set(latency);
    }

    /// Walk the clock forward, firing due interval callbacks in time
    /// order. Each callback observes `now()` as its own (late) delivery
    /// time, not the advance target.
    pub fn advance(&self, duration: Duration) {
        let target = self.now.get() + duration;
        loop {
            let next = self.next_due_interval(target);
            let Some((id, fire_at)) = next else { break };

            self.now.set(fire_at);
            let callback = {
                let intervals = self.intervals.borrow();
                let Some(entry) = intervals.iter().find(|e| e.id == id) else {
                    continue;
                };
                entry.next_due.set(entry.next_due.get() + entry.period);
                Rc::clone(&entry.callback)
            };
            let mut callback = callback.borrow_mut();
            (*callback)();
        }
        self.now.set(target);
    }

    /// Deliver all currently pending frame callbacks. Callbacks requested
    /// while firing land in the next frame.
    pub fn fire_frame(&self) {
        let pending: Vec<(RawTimerId, FrameCallback)> =
            self.frames.borrow_mut().drain(..).collect();
        for (_, callback) in pending {
            callback();
        }
    }

    /// Advance by `frame_interval` and deliver a frame, `count` times.
    pub fn run_frames(&self, frame_interval: Duration, count: usize) {
        for _ in 0..count {
            self.advance(frame_interval);
            self.fire_frame();
        }
    }

    /// Number of live repeating timers.
    pub fn active_intervals(&self) -> usize {
        self.intervals.borrow().len()
    }

    /// Number of pending frame requests.
    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    fn alloc_id(&self) -> RawTimerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Earliest interval whose (latency-shifted) delivery lands within
    /// `target`, if any.
    fn next_due_interval(&self, target: Instant) -> Option<(RawTimerId, Instant)> {
        let latency = self.latency.get();
        self.intervals
            .borrow()
            .iter()
            .map(|e| (e.id, e.next_due.get() + latency))
            .filter(|(_, fire_at)| *fire_at <= target)
            .min_by_key(|(_, fire_at)| *fire_at)
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHost for SimHost {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn has_frame_scheduler(&self) -> bool {
        self.frames_supported
    }

    fn request_frame(&self, callback: FrameCallback) -> RawTimerId {
        let id = self.alloc_id();
        self.frames.borrow_mut().push((id, callback));
        id
    }

    fn cancel_frame(&self, id: RawTimerId) {
        self.frames.borrow_mut().retain(|(fid, _)| *fid != id);
    }

    fn set_interval(&self, period: Duration, callback: TickCallback) -> RawTimerId {
        let id = self.alloc_id();
        self.intervals.borrow_mut().push(IntervalEntry {
            id,
            period,
            next_due: Cell::new(self.now.get() + period),
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    fn clear_interval(&self, id: RawTimerId) {
        self.intervals.borrow_mut().retain(|e| e.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_fire_in_time_order() {
        let host = SimHost::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = Rc::clone(&order);
        host.set_interval(Duration::from_millis(250), Box::new(move || o.borrow_mut().push("slow")));
        let o = Rc::clone(&order);
        host.set_interval(Duration::from_millis(100), Box::new(move || o.borrow_mut().push("fast")));

        host.advance(Duration::from_millis(300));
        assert_eq!(*order.borrow(), vec!["fast", "fast", "slow", "fast"]);
    }

    #[test]
    fn callbacks_observe_their_delivery_time() {
        let host = Rc::new(SimHost::new());
        let start = host.now();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let reader = Rc::clone(&host);
        host.set_interval(
            Duration::from_millis(100),
            Box::new(move || s.borrow_mut().push(reader.now().duration_since(start))),
        );

        host.advance(Duration::from_millis(250));
        assert_eq!(
            *seen.borrow(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(host.now().duration_since(start), Duration::from_millis(250));
    }

    #[test]
    fn latency_shifts_delivery() {
        let host = Rc::new(SimHost::new());
        host.set_latency(Duration::from_millis(30));
        let start = host.now();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let reader = Rc::clone(&host);
        host.set_interval(
            Duration::from_millis(100),
            Box::new(move || s.borrow_mut().push(reader.now().duration_since(start))),
        );

        host.advance(Duration::from_millis(250));
        assert_eq!(
            *seen.borrow(),
            vec![Duration::from_millis(130), Duration::from_millis(230)]
        );
    }

    #[test]
    fn clear_interval_from_inside_callback() {
        let host = Rc::new(SimHost::new());
        let count = Rc::new(Cell::new(0u32));

        let c = Rc::clone(&count);
        let clearer = Rc::clone(&host);
        let id_slot = Rc::new(Cell::new(0));
        let slot = Rc::clone(&id_slot);
        let id = host.set_interval(
            Duration::from_millis(100),
            Box::new(move || {
                c.set(c.get() + 1);
                if c.get() == 2 {
                    clearer.clear_interval(slot.get());
                }
            }),
        );
        id_slot.set(id);

        host.advance(Duration::from_secs(1));
        assert_eq!(count.get(), 2);
        assert_eq!(host.active_intervals(), 0);
    }

    #[test]
    fn frames_requested_during_fire_land_next_frame() {
        let host = Rc::new(SimHost::new());
        let count = Rc::new(Cell::new(0u32));

        let c = Rc::clone(&count);
        let rearm = Rc::clone(&host);
        host.request_frame(Box::new(move || {
            c.set(c.get() + 1);
            rearm.request_frame(Box::new(|| {}));
        }));

        host.fire_frame();
        assert_eq!(count.get(), 1);
        assert_eq!(host.pending_frames(), 1);
    }

    #[test]
    fn cancel_frame_removes_request() {
        let host = SimHost::new();
        let id = host.request_frame(Box::new(|| panic!("cancelled frame fired")));
        host.cancel_frame(id);
        assert_eq!(host.pending_frames(), 0);
        host.fire_frame();
    }
}
