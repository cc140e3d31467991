use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::settings::ActionKind;

/// Latency samples kept for the rolling average.
pub const LATENCY_SAMPLES: usize = 100;
/// FPS counting window.
pub const FPS_WINDOW: Duration = Duration::from_secs(1);
/// Default interval between periodic summaries.
pub const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

/// Cumulative counters for one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub detections: u64,
    pub actions_performed: u64,
    pub per_class: BTreeMap<String, u64>,
    pub attacks: u64,
    pub pickups: u64,
    pub interactions: u64,
    pub searches_performed: u64,
    pub search_time_total: Duration,
}

impl RunStats {
    pub fn record_action(&mut self, kind: ActionKind, class_name: &str) {
        match kind {
            ActionKind::Attack => self.attacks += 1,
            ActionKind::Pickup => self.pickups += 1,
            ActionKind::Interact => self.interactions += 1,
            ActionKind::Ignore | ActionKind::LogOnly => return,
        }
        self.actions_performed += 1;
        *self.per_class.entry(class_name.to_string()).or_insert(0) += 1;
    }

    pub fn record_search(&mut self, duration: Duration) {
        self.searches_performed += 1;
        self.search_time_total += duration;
    }

    pub fn average_search(&self) -> Option<Duration> {
        u32::try_from(self.searches_performed)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.search_time_total / n)
    }

    pub fn class_count(&self, class_name: &str) -> u64 {
        self.per_class.get(class_name).copied().unwrap_or(0)
    }
}

/// Frame-rate and detection-latency accounting.
#[derive(Debug, Clone)]
pub struct PerfTracker {
    window_start: Instant,
    window_cycles: u32,
    fps: u32,
    latencies: VecDeque<Duration>,
    capacity: usize,
}

impl PerfTracker {
    pub fn new(now: Instant) -> Self {
        Self::with_capacity(now, LATENCY_SAMPLES)
    }

    pub fn with_capacity(now: Instant, capacity: usize) -> Self {
        Self {
            window_start: now,
            window_cycles: 0,
            fps: 0,
            latencies: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Count one completed cycle. When the window has run its course the
    /// count becomes the published FPS and a new window starts.
    pub fn tick(&mut self, now: Instant) {
        self.window_cycles += 1;
        if now.saturating_duration_since(self.window_start) >= FPS_WINDOW {
            self.fps = self.window_cycles;
            self.window_cycles = 0;
            self.window_start = now;
        }
    }

    pub fn record_latency(&mut self, sample: Duration) {
        if self.latencies.len() == self.capacity {
            self.latencies.pop_front();
        }
        self.latencies.push_back(sample);
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn avg_latency(&self) -> Duration {
        match u32::try_from(self.latencies.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.latencies.iter().sum::<Duration>() / n,
        }
    }

    pub fn samples(&self) -> usize {
        self.latencies.len()
    }
}

/// Fires on a coarse wall-clock interval, independent of the cycle cadence.
#[derive(Debug, Clone)]
pub struct SummaryTimer {
    interval: Duration,
    last: Instant,
}

impl SummaryTimer {
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self { interval, last: now }
    }

    /// True (and rearmed) once `interval` has passed since the last firing.
    pub fn due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}
