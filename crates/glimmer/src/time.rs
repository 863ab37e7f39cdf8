//! Time sources for animation.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Seconds since some fixed start.
pub trait Clock {
    fn now(&self) -> f32;
}

/// Wall-clock time since construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Rc<Cell<f32>>,
}

impl ManualClock {
    pub fn new(start: f32) -> Self {
        Self { time: Rc::new(Cell::new(start)) }
    }

    pub fn set(&self, seconds: f32) {
        self.time.set(seconds);
    }

    pub fn advance(&self, seconds: f32) {
        self.time.set(self.time.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f32 {
        self.time.get()
    }
}
