use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::clock::Clock;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::logger;
use crate::platform::{Capture, Detector, Input};
use crate::prioritize::{prioritize, PriorityOrder};
use crate::search::{SearchEnd, SearchMachine};
use crate::settings::Config;
use crate::state::{Control, RunSnapshot, RunState};
use crate::stats::{SummaryTimer, SUMMARY_INTERVAL};
use crate::types::Detection;

/// Wait between flag checks while paused.
pub const PAUSE_POLL: Duration = Duration::from_millis(100);
/// Upper bound for the error backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    RuntimeLimit,
    TooManyErrors,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Requested => "stop requested",
            StopReason::RuntimeLimit => "max runtime reached",
            StopReason::TooManyErrors => "too many consecutive errors",
        }
    }
}

/// Why a cycle was skipped.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("capture failed: {0:#}")]
    Capture(anyhow::Error),
    #[error("detection failed: {0:#}")]
    Detection(anyhow::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CycleError {
    /// Capture and detection failures are expected now and then and never
    /// count toward the consecutive error limit.
    pub fn is_transient(&self) -> bool {
        matches!(self, CycleError::Capture(_) | CycleError::Detection(_))
    }
}

/// What one completed cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSummary {
    pub detections: usize,
    pub actions: u32,
    pub meaningful: bool,
    pub searching: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Stop(StopReason),
    Paused,
    Completed(CycleSummary),
}

/// Returned by [`Engine::run`] once the session is over.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub reason: StopReason,
    pub snapshot: RunSnapshot,
}

/// The control loop: capture, detect, prioritize, dispatch, search, pace.
pub struct Engine {
    capture: Box<dyn Capture>,
    detector: Box<dyn Detector>,
    input: Box<dyn Input>,
    clock: Arc<dyn Clock>,
    order: PriorityOrder,
    dispatcher: Dispatcher,
    search: SearchMachine,
    state: RunState,
    summary: SummaryTimer,
    snapshots: Option<SyncSender<RunSnapshot>>,
    scan_interval: Duration,
    max_actions: u32,
    max_runtime: Option<Duration>,
    max_errors: u32,
}

impl Engine {
    /// Build an engine for one session. The session clock starts here.
    pub fn new(
        config: &Config,
        capture: Box<dyn Capture>,
        detector: Box<dyn Detector>,
        input: Box<dyn Input>,
        clock: Arc<dyn Clock>,
        control: Arc<Control>,
    ) -> Self {
        logger::register_prefix("engine", logger::COLOR_GREEN);
        let now = clock.now();
        Self {
            capture,
            detector,
            input,
            order: PriorityOrder::new(config.automation.priority_targets.iter().cloned()),
            dispatcher: Dispatcher::new(config, Arc::clone(&clock)),
            search: SearchMachine::new(config, Arc::clone(&clock)),
            state: RunState::new(control, now),
            summary: SummaryTimer::new(now, SUMMARY_INTERVAL),
            snapshots: None,
            scan_interval: config.automation.scan_interval(),
            max_actions: config.automation.max_actions_per_cycle,
            max_runtime: config.safety.max_runtime(),
            max_errors: config.safety.max_consecutive_errors.max(1),
            clock,
        }
    }

    /// Publish a snapshot after every cycle. Snapshots are dropped while the
    /// receiver still holds an unread one, except the final one, which waits
    /// for the receiver to read or drop.
    pub fn with_snapshots(mut self, tx: SyncSender<RunSnapshot>) -> Self {
        self.snapshots = Some(tx);
        self
    }

    /// Fix the random search pattern's choices.
    pub fn with_search_seed(mut self, seed: u64) -> Self {
        self.search = self.search.with_seed(seed);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.state.snapshot(self.clock.now(), Vec::new())
    }

    /// Run cycles until stopped, then flush final statistics.
    pub fn run(&mut self) -> SessionReport {
        logger::info_p("engine", &format!(
            "started | scan {}ms | cap {} | runtime limit {}",
            self.scan_interval.as_millis(),
            self.max_actions,
            self.max_runtime
                .map(|d| format!("{:.1}h", d.as_secs_f64() / 3600.0))
                .unwrap_or_else(|| "none".into()),
        ));

        let mut consecutive_errors = 0u32;
        let reason = loop {
            let cycle_start = self.clock.now();
            match self.guarded_cycle() {
                Ok(CycleOutcome::Stop(reason)) => break reason,
                Ok(CycleOutcome::Paused) => self.clock.sleep(PAUSE_POLL),
                Ok(CycleOutcome::Completed(_)) => {
                    consecutive_errors = 0;
                    self.pace(cycle_start);
                }
                Err(e) if e.is_transient() => {
                    logger::warn_p("engine", &format!("cycle skipped: {}", e));
                    self.pace(cycle_start);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    logger::error_p("engine", &format!(
                        "{} ({}/{} consecutive)", e, consecutive_errors, self.max_errors
                    ));
                    if consecutive_errors >= self.max_errors {
                        break StopReason::TooManyErrors;
                    }
                    self.clock.sleep(self.backoff(consecutive_errors));
                }
            }
        };

        self.finish(reason)
    }

    /// One pass of the loop. Never sleeps for pacing; [`Engine::run`] does.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let control = Arc::clone(&self.state.control);
        if !control.is_running() {
            return Ok(CycleOutcome::Stop(StopReason::Requested));
        }
        if let Some(limit) = self.max_runtime {
            let elapsed = self.state.elapsed(self.clock.now());
            if elapsed > limit {
                logger::warn_p("engine", &format!(
                    "max runtime reached ({:.1}m), stopping", elapsed.as_secs_f64() / 60.0
                ));
                control.stop();
                return Ok(CycleOutcome::Stop(StopReason::RuntimeLimit));
            }
        }
        if control.is_paused() {
            return Ok(CycleOutcome::Paused);
        }

        let frame = self.capture.grab().map_err(CycleError::Capture)?;

        let detect_start = self.clock.now();
        let raw = self.detector.detect(&frame).map_err(CycleError::Detection)?;
        let now = self.clock.now();
        self.state.perf.record_latency(now.saturating_duration_since(detect_start));
        self.state.stats.detections += raw.len() as u64;
        let detections = prioritize(raw, &self.order);

        let meaningful = detections.iter().any(|d| self.dispatcher.is_meaningful(d));
        if meaningful {
            self.state.last_target_seen = now;
            if self.state.search.is_searching() {
                self.search.end(&mut self.state, self.input.as_mut(), SearchEnd::TargetFound);
            }
        }

        let actions = self.dispatch_all(&detections);

        // A stop or pause requested during dispatch also holds the search.
        if control.is_running() && !control.is_paused() {
            if !meaningful && self.search.should_start(&self.state) {
                self.search.start(&mut self.state);
            }
            if self.state.search.is_searching() {
                self.search.step(&mut self.state, self.input.as_mut());
            }
        }

        let now = self.clock.now();
        self.state.perf.tick(now);
        if self.summary.due(now) {
            self.log_stats("stats");
        }

        let summary = CycleSummary {
            detections: detections.len(),
            actions,
            meaningful,
            searching: self.state.search.is_searching(),
        };
        self.publish(detections);
        Ok(CycleOutcome::Completed(summary))
    }

    /// Capture and detect once, log what was found, dispatch nothing.
    pub fn probe(&mut self) -> anyhow::Result<Vec<Detection>> {
        let frame = self.capture.grab()?;
        let detections = prioritize(self.detector.detect(&frame)?, &self.order);
        logger::info_p("engine", &format!(
            "probe: {}x{} frame, {} detection(s)", frame.width, frame.height, detections.len()
        ));
        for (i, det) in detections.iter().enumerate() {
            let policy = self.dispatcher.policy(det);
            logger::info_p("engine", &format!(
                "  {}. {} conf {:.2} at ({}, {}) {:.0}px -> {}{}",
                i + 1,
                det.class_name,
                det.confidence,
                det.center.0,
                det.center.1,
                det.distance,
                policy.action.as_str(),
                if det.distance > policy.max_distance { " (out of range)" } else { "" },
            ));
        }
        Ok(detections)
    }

    fn guarded_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle())) {
            Ok(result) => result,
            Err(payload) => Err(CycleError::Internal(panic_message(payload.as_ref()))),
        }
    }

    /// Dispatch in priority order until the cap is hit or a pause/stop lands.
    fn dispatch_all(&mut self, detections: &[Detection]) -> u32 {
        let mut actions = 0;
        for det in detections {
            if actions >= self.max_actions {
                break;
            }
            let control = &self.state.control;
            if !control.is_running() || control.is_paused() {
                break;
            }
            let outcome = self.dispatcher.dispatch(det, &mut self.state, &self.search, self.input.as_mut());
            if let DispatchOutcome::Performed(_) = outcome {
                actions += 1;
            }
        }
        actions
    }

    fn pace(&self, cycle_start: Instant) {
        let spent = self.clock.now().saturating_duration_since(cycle_start);
        self.clock.sleep(self.scan_interval.saturating_sub(spent));
    }

    /// Scan interval doubled per consecutive failure, capped.
    fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32 << failures.min(16);
        self.scan_interval.saturating_mul(factor).min(MAX_BACKOFF)
    }

    fn publish(&self, detections: Vec<Detection>) {
        if let Some(tx) = &self.snapshots {
            // Full means the reader has not caught up; skip this one.
            let _ = tx.try_send(self.state.snapshot(self.clock.now(), detections));
        }
    }

    fn finish(&mut self, reason: StopReason) -> SessionReport {
        self.state.control.stop();
        self.search.end(&mut self.state, self.input.as_mut(), SearchEnd::SessionEnded);
        logger::info_p("engine", &format!("session over: {}", reason.as_str()));
        self.log_stats("final");
        let snapshot = self.snapshot();
        if let Some(tx) = &self.snapshots {
            // Blocks until the reader takes it; fails only once the reader is gone.
            let _ = tx.send(snapshot.clone());
        }
        SessionReport { reason, snapshot }
    }

    fn log_stats(&self, label: &str) {
        let now = self.clock.now();
        let stats = &self.state.stats;
        let perf = &self.state.perf;
        logger::info_p("engine", &format!(
            "{} | runtime {:.1}m | fps {} | avg detect {:.1}ms",
            label,
            self.state.elapsed(now).as_secs_f64() / 60.0,
            perf.fps(),
            perf.avg_latency().as_secs_f64() * 1000.0,
        ));
        logger::info_p("engine", &format!(
            "  detections {} | actions {} | attacks {} | pickups {} | interactions {}",
            stats.detections, stats.actions_performed, stats.attacks, stats.pickups, stats.interactions
        ));
        if let Some(avg) = stats.average_search() {
            logger::info_p("engine", &format!(
                "  searches {} (avg {:.1}s)", stats.searches_performed, avg.as_secs_f64()
            ));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with unknown payload".to_string()
    }
}
