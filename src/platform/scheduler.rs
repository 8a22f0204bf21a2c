//! Frame scheduling
//!
//! A frame chain is a callback that re-posts itself until its loop is done.
//! Browsers drive it with `requestAnimationFrame`; native runs and tests use
//! `ManualScheduler`, which owns a simulated clock.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Callback invoked with the frame timestamp (ms)
pub type FrameCallback = Box<dyn FnOnce(f64)>;

pub trait FrameScheduler {
    /// Monotonic clock in milliseconds
    fn now(&self) -> f64;

    /// Run `callback` on the next frame
    fn post(&self, callback: FrameCallback);
}

/// Deterministic scheduler with a hand-cranked clock
#[derive(Default)]
pub struct ManualScheduler {
    clock: Cell<f64>,
    queue: RefCell<VecDeque<FrameCallback>>,
}

impl ManualScheduler {
    pub fn new(start_ms: f64) -> Self {
        Self {
            clock: Cell::new(start_ms),
            queue: RefCell::new(VecDeque::new()),
        }
    }

    /// Callbacks waiting for the next frame
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Advance the clock by `ms` and run one frame.
    ///
    /// Only callbacks posted before this frame run; anything they post waits
    /// for the next one. Returns how many callbacks ran.
    pub fn advance(&self, ms: f64) -> usize {
        let now = self.clock.get() + ms;
        self.clock.set(now);

        let batch: Vec<FrameCallback> = self.queue.borrow_mut().drain(..).collect();
        let ran = batch.len();
        for callback in batch {
            callback(now);
        }
        ran
    }

    /// Run frames of `frame_ms` until nothing is queued or `max_frames` is hit.
    /// Returns the number of frames run.
    pub fn run_until_idle(&self, frame_ms: f64, max_frames: usize) -> usize {
        let mut frames = 0;
        while self.pending() > 0 && frames < max_frames {
            self.advance(frame_ms);
            frames += 1;
        }
        frames
    }
}

impl FrameScheduler for ManualScheduler {
    fn now(&self) -> f64 {
        self.clock.get()
    }

    fn post(&self, callback: FrameCallback) {
        self.queue.borrow_mut().push_back(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_callbacks_posted_during_frame_wait_for_next() {
        let scheduler = Rc::new(ManualScheduler::new(0.0));
        let hits = Rc::new(Cell::new(0));

        let inner_sched = scheduler.clone();
        let inner_hits = hits.clone();
        scheduler.post(Box::new(move |_| {
            inner_hits.set(inner_hits.get() + 1);
            let again = inner_hits.clone();
            inner_sched.post(Box::new(move |_| again.set(again.get() + 1)));
        }));

        assert_eq!(scheduler.advance(16.0), 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(scheduler.pending(), 1);

        assert_eq!(scheduler.advance(16.0), 1);
        assert_eq!(hits.get(), 2);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.now(), 32.0);
    }

    #[test]
    fn test_run_until_idle_stops_at_limit() {
        let scheduler = Rc::new(ManualScheduler::new(0.0));

        fn forever(s: Rc<ManualScheduler>) {
            let next = s.clone();
            s.post(Box::new(move |_| forever(next)));
        }
        forever(scheduler.clone());

        assert_eq!(scheduler.run_until_idle(16.0, 10), 10);
        assert_eq!(scheduler.pending(), 1);
    }
}
