use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use seeker_core::clock::ManualClock;
use seeker_core::orchestrator::{CycleError, CycleOutcome, CycleSummary, Engine, StopReason};
use seeker_core::platform::recording::{EffectLog, RecordingInput, Script, ScriptedCapture, ScriptedDetector};
use seeker_core::platform::{Effect, Input};
use seeker_core::search::SearchPhase;
use seeker_core::settings::{ActionKind, BehaviorPolicy, Config, SearchPattern};
use seeker_core::state::{Control, RunStatus};
use seeker_core::types::{BoundingBox, CaptureRegion, Detection};

const REGION: CaptureRegion = CaptureRegion { x: 100, y: 100, width: 400, height: 400 };

struct Rig {
    engine: Engine,
    clock: ManualClock,
    capture: ScriptedCapture,
    detector: ScriptedDetector,
    effects: EffectLog,
    control: Arc<Control>,
}

fn config() -> Config {
    let mut config = Config::default();
    config.capture_region = REGION;
    config
}

fn rig(config: Config) -> Rig {
    let clock = ManualClock::new();
    let capture = ScriptedCapture::new(REGION);
    let detector = ScriptedDetector::new();
    let input = RecordingInput::new();
    let effects = input.log();
    let control = Control::shared();
    let engine = Engine::new(
        &config,
        Box::new(capture.clone()),
        Box::new(detector.clone()),
        Box::new(input),
        Arc::new(clock.clone()),
        Arc::clone(&control),
    )
    .with_search_seed(7);
    Rig { engine, clock, capture, detector, effects, control }
}

/// A detection `dx` pixels right of the region center.
fn det(class: &str, dx: i32) -> Detection {
    let cx = 200 + dx;
    Detection::new(BoundingBox::new(cx - 4, 196, cx + 4, 204), 0.9, 0, class, &REGION)
}

fn completed(outcome: Result<CycleOutcome, CycleError>) -> CycleSummary {
    match outcome {
        Ok(CycleOutcome::Completed(summary)) => summary,
        other => panic!("expected a completed cycle, got {:?}", other),
    }
}

fn presses(effects: &EffectLog) -> Vec<Effect> {
    effects.all().into_iter().filter(Effect::is_trigger).collect()
}

#[test]
fn item_in_range_is_picked_up() {
    let mut r = rig(config());
    r.detector.push_batch(vec![det("item", 50)]);

    let summary = completed(r.engine.run_cycle());

    assert_eq!(summary.actions, 1);
    assert_eq!(presses(&r.effects), vec![Effect::Press("z".into())]);
    let stats = &r.engine.state().stats;
    assert_eq!(stats.pickups, 1);
    assert_eq!(stats.class_count("item"), 1);
}

#[test]
fn mob_beyond_its_max_distance_is_left_alone() {
    let mut cfg = config();
    cfg.detection_behavior.insert(
        "mob".into(),
        BehaviorPolicy::new(ActionKind::Attack).max_distance(100.0),
    );
    let mut r = rig(cfg);
    r.detector.push_batch(vec![det("mob", 150)]);

    let summary = completed(r.engine.run_cycle());

    assert_eq!(summary.actions, 0);
    assert!(!summary.meaningful);
    assert!(r.effects.is_empty());
    let stats = &r.engine.state().stats;
    assert_eq!(stats.actions_performed, 0);
    assert_eq!(stats.attacks, 0);
    assert_eq!(stats.detections, 1);
}

#[test]
fn search_starts_once_idle_time_exceeds_delay() {
    let mut cfg = config();
    cfg.automation.search.enable = true;
    cfg.automation.search.pattern = SearchPattern::Horizontal;
    let mut r = rig(cfg);

    for cycle in 1..=5 {
        let summary = completed(r.engine.run_cycle());
        assert!(!summary.searching, "cycle {} should still be idle", cycle);
        r.clock.advance(Duration::from_millis(1200));
    }
    let summary = completed(r.engine.run_cycle());
    assert!(summary.searching);
    assert_eq!(r.engine.state().search.phase, SearchPhase::Searching);
    assert_eq!(r.engine.state().search.moves, 1);
}

#[test]
fn attacking_during_search_ends_it_in_the_same_cycle() {
    let mut cfg = config();
    cfg.automation.search.enable = true;
    let mut r = rig(cfg);

    r.clock.advance(Duration::from_secs(6));
    assert!(completed(r.engine.run_cycle()).searching);

    r.detector.push_batch(vec![det("mob", 30)]);
    let summary = completed(r.engine.run_cycle());

    assert_eq!(summary.actions, 1);
    assert!(summary.meaningful);
    assert!(!summary.searching);
    let state = r.engine.state();
    assert_eq!(state.search.phase, SearchPhase::Idle);
    assert_eq!(state.stats.searches_performed, 1);
    assert_eq!(state.stats.attacks, 1);
    assert_eq!(presses(&r.effects).last(), Some(&Effect::Click));
}

#[test]
fn cap_limits_actions_to_highest_priority() {
    let mut r = rig(config());
    r.detector.push_batch(vec![det("npc", 10), det("mob", 20), det("item", 30)]);

    let summary = completed(r.engine.run_cycle());

    assert_eq!(summary.actions, 2);
    assert_eq!(presses(&r.effects), vec![Effect::Press("z".into()), Effect::Click]);
    let stats = &r.engine.state().stats;
    assert_eq!(stats.class_count("item"), 1);
    assert_eq!(stats.class_count("mob"), 1);
    assert_eq!(stats.class_count("npc"), 0);
}

#[test]
fn cap_is_exact_with_many_eligible_targets() {
    let mut cfg = config();
    cfg.automation.max_actions_per_cycle = 3;
    let mut r = rig(cfg);
    r.detector.push_batch((0..6).map(|i| det("mob", i * 10)).collect());

    let summary = completed(r.engine.run_cycle());

    assert_eq!(summary.actions, 3);
    assert_eq!(r.effects.triggers(), 3);
    assert_eq!(r.engine.state().stats.attacks, 3);
}

#[test]
fn log_only_classes_do_not_use_up_the_cap() {
    let mut r = rig(config());
    r.detector.push_batch(vec![det("portal", 0), det("tree", 5), det("npc", 10)]);

    let summary = completed(r.engine.run_cycle());

    assert_eq!(summary.actions, 1);
    assert_eq!(presses(&r.effects), vec![Effect::Press("space".into())]);
}

#[test]
fn runtime_limit_stops_the_session() {
    let mut cfg = config();
    cfg.safety.max_runtime_hours = 1.0;
    let mut r = rig(cfg);
    r.clock.advance(Duration::from_secs(3601));

    let report = r.engine.run();

    assert_eq!(report.reason, StopReason::RuntimeLimit);
    assert_eq!(report.snapshot.status, RunStatus::Stopped);
    assert!(!r.control.is_running());
    assert_eq!(report.snapshot.stats.detections, 0);
}

#[test]
fn runtime_limit_is_checked_at_cycle_boundaries() {
    let mut cfg = config();
    cfg.safety.max_runtime_hours = 0.5;
    let mut r = rig(cfg);

    let report = r.engine.run();

    assert_eq!(report.reason, StopReason::RuntimeLimit);
    assert_eq!(r.clock.elapsed(), Duration::from_millis(1_800_500));
    assert_eq!(report.snapshot.elapsed, Duration::from_millis(1_800_500));
}

#[test]
fn capture_failure_skips_only_that_cycle() {
    let mut r = rig(config());
    r.capture.fail_next(1);
    r.detector.push_batch(vec![det("item", 10)]);

    let err = r.engine.run_cycle().unwrap_err();
    assert!(matches!(err, CycleError::Capture(_)));
    assert!(err.is_transient());
    assert_eq!(r.detector.pending(), 1);

    assert_eq!(completed(r.engine.run_cycle()).actions, 1);
}

#[test]
fn detector_failure_is_transient() {
    let mut r = rig(config());
    r.detector.push(Script::Fail("model not loaded".into()));

    let err = r.engine.run_cycle().unwrap_err();
    assert!(matches!(err, CycleError::Detection(_)));
    assert_eq!(r.engine.state().stats.detections, 0);
}

#[test]
fn repeated_panics_stop_the_session() {
    let mut cfg = config();
    cfg.safety.max_consecutive_errors = 3;
    let mut r = rig(cfg);
    for _ in 0..3 {
        r.detector.push(Script::Panic("detector crashed".into()));
    }

    let report = r.engine.run();

    assert_eq!(report.reason, StopReason::TooManyErrors);
    assert_eq!(r.detector.pending(), 0);
    // backoff after the first two failures: 1s then 2s
    assert_eq!(r.clock.elapsed(), Duration::from_secs(3));
}

#[test]
fn a_good_cycle_resets_the_error_count() {
    let mut cfg = config();
    cfg.safety.max_consecutive_errors = 3;
    let mut r = rig(cfg);
    for script in [
        Script::Panic("a".into()),
        Script::Panic("b".into()),
        Script::Batch(Vec::new()),
        Script::Panic("c".into()),
        Script::Panic("d".into()),
        Script::Panic("e".into()),
    ] {
        r.detector.push(script);
    }

    let report = r.engine.run();

    assert_eq!(report.reason, StopReason::TooManyErrors);
    assert_eq!(r.detector.pending(), 0);
}

#[test]
fn paused_engine_leaves_input_untouched() {
    let mut r = rig(config());
    r.detector.push_batch(vec![det("mob", 0)]);
    r.control.pause();

    assert_eq!(r.engine.run_cycle().unwrap(), CycleOutcome::Paused);
    assert_eq!(r.detector.pending(), 1);
    assert!(r.effects.is_empty());

    r.control.resume();
    assert_eq!(completed(r.engine.run_cycle()).actions, 1);
}

#[test]
fn snapshots_are_dropped_while_the_reader_lags() {
    let (tx, rx) = mpsc::sync_channel(1);
    let clock = ManualClock::new();
    let detector = ScriptedDetector::new();
    let mut engine = Engine::new(
        &config(),
        Box::new(ScriptedCapture::new(REGION)),
        Box::new(detector.clone()),
        Box::new(RecordingInput::new()),
        Arc::new(clock),
        Control::shared(),
    )
    .with_snapshots(tx);
    detector.push_batch(vec![det("item", 10)]);
    detector.push_batch(vec![det("mob", 10), det("npc", 5)]);

    completed(engine.run_cycle());
    completed(engine.run_cycle());

    let first = rx.try_recv().unwrap();
    assert_eq!(first.detections.len(), 1);
    assert_eq!(first.stats.pickups, 1);
    assert!(rx.try_recv().is_err());
}

#[test]
fn probe_reports_without_acting() {
    let mut r = rig(config());
    r.detector.push_batch(vec![det("mob", 40), det("item", 60)]);

    let found = r.engine.probe().unwrap();

    let classes: Vec<&str> = found.iter().map(|d| d.class_name.as_str()).collect();
    assert_eq!(classes, vec!["item", "mob"]);
    assert!(r.effects.is_empty());
    assert_eq!(r.engine.state().stats.actions_performed, 0);
}

/// Records like [`RecordingInput`] and flips a control flag on the first click,
/// the way a user hitting pause or stop mid-attack would.
struct SignalOnClick {
    inner: RecordingInput,
    control: Arc<Control>,
    pause: bool,
}

impl Input for SignalOnClick {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        self.inner.move_to(x, y)
    }

    fn key_down(&mut self, key: &str) -> Result<()> {
        self.inner.key_down(key)
    }

    fn key_up(&mut self, key: &str) -> Result<()> {
        self.inner.key_up(key)
    }

    fn press(&mut self, key: &str) -> Result<()> {
        self.inner.press(key)
    }

    fn click(&mut self) -> Result<()> {
        self.inner.click()?;
        if self.pause {
            self.control.pause();
        } else {
            self.control.stop();
        }
        Ok(())
    }
}

fn signalling_rig(pause: bool) -> (Engine, ScriptedDetector, EffectLog, Arc<Control>) {
    let mut cfg = config();
    cfg.automation.max_actions_per_cycle = 3;
    let detector = ScriptedDetector::new();
    let inner = RecordingInput::new();
    let effects = inner.log();
    let control = Control::shared();
    let input = SignalOnClick { inner, control: Arc::clone(&control), pause };
    let engine = Engine::new(
        &cfg,
        Box::new(ScriptedCapture::new(REGION)),
        Box::new(detector.clone()),
        Box::new(input),
        Arc::new(ManualClock::new()),
        Arc::clone(&control),
    );
    (engine, detector, effects, control)
}

#[test]
fn stop_during_dispatch_ends_the_batch() {
    let (mut engine, detector, effects, control) = signalling_rig(false);
    detector.push_batch(vec![det("mob", 10), det("mob", 20), det("mob", 30)]);

    let summary = completed(engine.run_cycle());

    assert_eq!(summary.detections, 3);
    assert_eq!(summary.actions, 1);
    assert_eq!(effects.all(), vec![Effect::MoveTo(310, 300), Effect::Click]);
    assert!(!control.is_running());
    assert_eq!(engine.run_cycle().unwrap(), CycleOutcome::Stop(StopReason::Requested));
}

#[test]
fn pause_during_dispatch_ends_the_batch() {
    let (mut engine, detector, effects, control) = signalling_rig(true);
    detector.push_batch(vec![det("mob", 10), det("mob", 20), det("mob", 30)]);

    let summary = completed(engine.run_cycle());

    assert_eq!(summary.actions, 1);
    assert_eq!(effects.triggers(), 1);
    assert!(control.is_paused());
    assert_eq!(engine.state().stats.attacks, 1);
}

#[test]
fn stopping_a_search_does_not_move_afterwards() {
    let mut cfg = config();
    cfg.automation.search.enable = true;
    cfg.automation.search.pattern = SearchPattern::Horizontal;
    cfg.automation.search.return_to_start = true;
    let mut r = rig(cfg);

    r.clock.advance(Duration::from_secs(6));
    completed(r.engine.run_cycle());
    completed(r.engine.run_cycle());
    assert_eq!(r.engine.state().search.phase, SearchPhase::Searching);

    r.effects.clear();
    r.control.stop();
    let report = r.engine.run();

    assert_eq!(report.reason, StopReason::Requested);
    assert!(r.effects.is_empty());
    assert_eq!(report.snapshot.stats.searches_performed, 1);
    assert_eq!(report.snapshot.search_phase, SearchPhase::Idle);
}

#[test]
fn final_snapshot_waits_for_a_lagging_reader() {
    let (tx, rx) = mpsc::sync_channel(1);
    let detector = ScriptedDetector::new();
    let control = Control::shared();
    let mut engine = Engine::new(
        &config(),
        Box::new(ScriptedCapture::new(REGION)),
        Box::new(detector.clone()),
        Box::new(RecordingInput::new()),
        Arc::new(ManualClock::new()),
        Arc::clone(&control),
    )
    .with_snapshots(tx);
    detector.push_batch(vec![det("item", 10)]);
    completed(engine.run_cycle());

    control.stop();
    let session = thread::spawn(move || engine.run());

    let stale = rx.recv().unwrap();
    assert_eq!(stale.status, RunStatus::Running);
    let last = rx.recv().unwrap();
    assert_eq!(last.status, RunStatus::Stopped);
    assert_eq!(last.stats.pickups, 1);

    let report = session.join().unwrap();
    assert_eq!(report.reason, StopReason::Requested);
}
