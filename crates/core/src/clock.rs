use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

/// Time source for the control loop. Every wait the engine performs goes
/// through here so sessions can be replayed on simulated time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, dur: Duration);
}

/// Wall clock backed by `Instant::now` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, dur: Duration) {
        if !dur.is_zero() {
            thread::sleep(dur);
        }
    }
}

/// Simulated clock: `sleep` advances time instantly. Clones share the same
/// timeline, so a test can keep one handle and move time forward.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self { base: Instant::now(), offset: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    pub fn advance(&self, dur: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += dur;
    }

    /// Total simulated time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, dur: Duration) {
        self.advance(dur);
    }
}

/// Apply +/-`fraction` random jitter to `dur` (fraction clamped to 0..=0.5).
pub fn jitter(dur: Duration, fraction: f64) -> Duration {
    if fraction.is_nan() || fraction <= 0.0 || dur.is_zero() {
        return dur;
    }
    let fraction = fraction.min(0.5);
    let secs = dur.as_secs_f64();
    let spread = secs * fraction;
    let actual = secs + rand::thread_rng().gen_range(-spread..spread);
    Duration::from_secs_f64(actual.max(0.0))
}
