use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::search::{SearchPhase, SearchProgress};
use crate::stats::{PerfTracker, RunStats};
use crate::types::Detection;

/// Cooperative run/pause flags. Set from any thread, polled by the loop at
/// step boundaries only.
#[derive(Debug)]
pub struct Control {
    running: AtomicBool,
    paused: AtomicBool,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    /// A live session: running, not paused.
    pub fn new() -> Self {
        Self { running: AtomicBool::new(true), paused: AtomicBool::new(false) }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Flip pause; returns the new paused value.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::AcqRel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Paused,
    Stopped,
}

impl RunStatus {
    pub fn of(control: &Control) -> Self {
        if !control.is_running() {
            RunStatus::Stopped
        } else if control.is_paused() {
            RunStatus::Paused
        } else {
            RunStatus::Running
        }
    }
}

/// Mutable state of one automation session, owned by the loop thread.
#[derive(Debug)]
pub struct RunState {
    pub control: Arc<Control>,
    pub started_at: Instant,
    pub last_target_seen: Instant,
    pub search: SearchProgress,
    pub stats: RunStats,
    pub perf: PerfTracker,
}

impl RunState {
    pub fn new(control: Arc<Control>, now: Instant) -> Self {
        Self {
            control,
            started_at: now,
            last_target_seen: now,
            search: SearchProgress::default(),
            stats: RunStats::default(),
            perf: PerfTracker::new(now),
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn snapshot(&self, now: Instant, detections: Vec<Detection>) -> RunSnapshot {
        RunSnapshot {
            status: RunStatus::of(&self.control),
            elapsed: self.elapsed(now),
            fps: self.perf.fps(),
            avg_latency: self.perf.avg_latency(),
            stats: self.stats.clone(),
            search_phase: self.search.phase,
            search_moves: self.search.moves,
            search_direction: self.search.direction,
            detections,
        }
    }
}

/// Read-only copy of the run state for status displays and the preview.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub elapsed: Duration,
    pub fps: u32,
    pub avg_latency: Duration,
    pub stats: RunStats,
    pub search_phase: SearchPhase,
    pub search_moves: u32,
    pub search_direction: i32,
    /// This cycle's detections in priority order.
    pub detections: Vec<Detection>,
}
