use std::sync::Mutex;
use std::time::Instant;

/// Time source of the scheduler, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

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
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Only moves when told to, so budgets and cadences can be tested deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        *self.now.lock().expect("Clock lock") += seconds;
    }

    pub fn set(&self, seconds: f64) {
        *self.now.lock().expect("Clock lock") = seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().expect("Clock lock")
    }
}
