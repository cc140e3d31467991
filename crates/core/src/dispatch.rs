use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::clock::{self, Clock};
use crate::logger;
use crate::platform::Input;
use crate::search::{SearchEnd, SearchMachine};
use crate::settings::{ActionKind, AttackMethod, Config, Controls, PolicyTable, ResolvedPolicy};
use crate::state::RunState;
use crate::types::{CaptureRegion, Detection};

/// Result of dispatching one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Performed(ActionKind),
    Logged,
    Ignored,
    OutOfRange,
    Failed,
}

impl DispatchOutcome {
    pub fn is_meaningful(self) -> bool {
        matches!(self, DispatchOutcome::Performed(_))
    }
}

/// Turns a detection into at most one action through the input collaborator.
pub struct Dispatcher {
    policies: PolicyTable,
    region: CaptureRegion,
    controls: Controls,
    jitter: f64,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        logger::register_prefix("dispatch", logger::COLOR_BLUE);
        Self {
            policies: config.policies(),
            region: config.capture_region,
            controls: config.controls.clone(),
            jitter: config.automation.delay_jitter,
            clock,
        }
    }

    pub fn policy(&self, det: &Detection) -> &ResolvedPolicy {
        self.policies.get(&det.class_name)
    }

    /// Would dispatching `det` produce an action? Same policy and distance
    /// test as [`Dispatcher::dispatch`], without side effects.
    pub fn is_meaningful(&self, det: &Detection) -> bool {
        let policy = self.policy(det);
        policy.action.is_meaningful() && det.distance <= policy.max_distance
    }

    pub fn dispatch(
        &self,
        det: &Detection,
        state: &mut RunState,
        search: &SearchMachine,
        input: &mut dyn Input,
    ) -> DispatchOutcome {
        let policy = *self.policy(det);
        let target = self.region.to_screen(det.center);

        if det.distance > policy.max_distance {
            return DispatchOutcome::OutOfRange;
        }

        let kind = policy.action;
        match kind {
            ActionKind::Ignore => return DispatchOutcome::Ignored,
            ActionKind::LogOnly => {
                logger::info_p("dispatch", &format!(
                    "{} seen (conf {:.2}, {:.0}px), log only",
                    det.class_name, det.confidence, det.distance
                ));
                return DispatchOutcome::Logged;
            }
            ActionKind::Attack | ActionKind::Pickup | ActionKind::Interact => {}
        }

        if let Err(e) = self.perform(kind, &policy, target, input) {
            logger::error_p("dispatch", &format!(
                "{} on {} at ({}, {}) failed: {:#}",
                kind.as_str(), det.class_name, target.0, target.1, e
            ));
            return DispatchOutcome::Failed;
        }

        logger::info_p("dispatch", &format!(
            "{} {} at ({}, {}) (conf {:.2}, {:.0}px)",
            kind.as_str(), det.class_name, target.0, target.1, det.confidence, det.distance
        ));
        state.stats.record_action(kind, &det.class_name);
        state.last_target_seen = self.clock.now();
        if state.search.is_searching() {
            search.end(state, input, SearchEnd::TargetFound);
        }
        DispatchOutcome::Performed(kind)
    }

    fn perform(&self, kind: ActionKind, policy: &ResolvedPolicy, target: (i32, i32), input: &mut dyn Input) -> Result<()> {
        input.move_to(target.0, target.1)?;
        let hold = match kind {
            ActionKind::Attack => {
                match self.controls.attack_method {
                    AttackMethod::Key => input.press(&self.controls.attack_key)?,
                    AttackMethod::Click => input.click()?,
                }
                policy.attack_delay
            }
            ActionKind::Pickup => {
                input.press(&self.controls.pickup_key)?;
                policy.action_delay
            }
            ActionKind::Interact => {
                input.press(&self.controls.interact_key)?;
                policy.interact_delay
            }
            ActionKind::Ignore | ActionKind::LogOnly => Duration::ZERO,
        };
        self.clock.sleep(clock::jitter(hold, self.jitter));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::platform::recording::RecordingInput;
    use crate::platform::Effect;
    use crate::search::SearchPhase;
    use crate::settings::{BehaviorPolicy, SearchPattern};
    use crate::state::Control;
    use crate::types::BoundingBox;

    struct Fixture {
        dispatcher: Dispatcher,
        search: SearchMachine,
        state: RunState,
        clock: ManualClock,
    }

    fn fixture(config: Config) -> Fixture {
        let clock = ManualClock::new();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        Fixture {
            dispatcher: Dispatcher::new(&config, Arc::clone(&shared)),
            search: SearchMachine::new(&config, shared),
            state: RunState::new(Control::shared(), clock.now()),
            clock,
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.capture_region = CaptureRegion { x: 1000, y: 500, width: 400, height: 400 };
        config
    }

    /// Detection `dx` pixels right of the region center.
    fn det(class: &str, dx: i32) -> Detection {
        let region = config().capture_region;
        let cx = 200 + dx;
        Detection::new(BoundingBox::new(cx - 5, 195, cx + 5, 205), 0.8, 0, class, &region)
    }

    #[test]
    fn pickup_moves_then_presses_and_counts() {
        let mut f = fixture(config());
        let mut input = RecordingInput::new();
        let log = input.log();

        let outcome = f.dispatcher.dispatch(&det("item", 50), &mut f.state, &f.search, &mut input);

        assert_eq!(outcome, DispatchOutcome::Performed(ActionKind::Pickup));
        assert_eq!(log.all(), vec![Effect::MoveTo(1250, 700), Effect::Press("z".into())]);
        assert_eq!(f.state.stats.pickups, 1);
        assert_eq!(f.state.stats.class_count("item"), 1);
        assert_eq!(f.state.stats.actions_performed, 1);
        assert_eq!(f.clock.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn attack_clicks_by_default_and_holds_attack_delay() {
        let mut f = fixture(config());
        let mut input = RecordingInput::new();
        let log = input.log();

        f.dispatcher.dispatch(&det("mob", -30), &mut f.state, &f.search, &mut input);

        assert_eq!(log.all(), vec![Effect::MoveTo(1170, 700), Effect::Click]);
        assert_eq!(f.clock.elapsed(), Duration::from_millis(500));
        assert_eq!(f.state.stats.attacks, 1);
    }

    #[test]
    fn attack_key_method_presses_attack_key() {
        let mut cfg = config();
        cfg.controls.attack_method = AttackMethod::Key;
        let mut f = fixture(cfg);
        let mut input = RecordingInput::new();
        let log = input.log();

        f.dispatcher.dispatch(&det("mob", 0), &mut f.state, &f.search, &mut input);
        assert_eq!(log.all()[1], Effect::Press("ctrl".into()));
    }

    #[test]
    fn out_of_range_issues_nothing() {
        let mut f = fixture(config());
        let mut input = RecordingInput::new();
        let log = input.log();

        let outcome = f.dispatcher.dispatch(&det("mob", 151), &mut f.state, &f.search, &mut input);

        assert_eq!(outcome, DispatchOutcome::OutOfRange);
        assert!(log.is_empty());
        assert_eq!(f.state.stats, Default::default());
    }

    #[test]
    fn distance_equal_to_limit_is_in_range() {
        let f = fixture(config());
        assert!(f.dispatcher.is_meaningful(&det("item", 100)));
        assert!(!f.dispatcher.is_meaningful(&det("item", 101)));
    }

    #[test]
    fn unknown_class_is_log_only() {
        let mut f = fixture(config());
        let mut input = RecordingInput::new();

        let outcome = f.dispatcher.dispatch(&det("tree", 10), &mut f.state, &f.search, &mut input);

        assert_eq!(outcome, DispatchOutcome::Logged);
        assert!(!outcome.is_meaningful());
        assert!(input.log().is_empty());
        assert!(!f.dispatcher.is_meaningful(&det("tree", 10)));
    }

    #[test]
    fn ignore_policy_does_nothing() {
        let mut cfg = config();
        cfg.detection_behavior.insert("bird".into(), BehaviorPolicy::new(ActionKind::Ignore));
        let mut f = fixture(cfg);
        let mut input = RecordingInput::new();

        let outcome = f.dispatcher.dispatch(&det("bird", 0), &mut f.state, &f.search, &mut input);
        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(input.log().is_empty());
    }

    #[test]
    fn input_failure_is_not_an_action() {
        let mut f = fixture(config());
        let mut input = RecordingInput::failing();
        let before = f.state.last_target_seen;
        f.clock.advance(Duration::from_secs(2));

        let outcome = f.dispatcher.dispatch(&det("npc", 10), &mut f.state, &f.search, &mut input);

        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(f.state.stats.actions_performed, 0);
        assert_eq!(f.state.last_target_seen, before);
    }

    #[test]
    fn at_most_one_trigger_per_detection() {
        let mut f = fixture(config());
        for class in ["mob", "item", "npc", "tree"] {
            let mut input = RecordingInput::new();
            let log = input.log();
            f.dispatcher.dispatch(&det(class, 5), &mut f.state, &f.search, &mut input);
            assert!(log.triggers() <= 1, "{} issued {} triggers", class, log.triggers());
        }
    }

    #[test]
    fn action_ends_an_active_search() {
        let mut cfg = config();
        cfg.automation.search.enable = true;
        cfg.automation.search.pattern = SearchPattern::Vertical;
        let mut f = fixture(cfg);
        let mut input = RecordingInput::new();

        f.search.start(&mut f.state);
        f.clock.advance(Duration::from_secs(3));
        let outcome = f.dispatcher.dispatch(&det("mob", 0), &mut f.state, &f.search, &mut input);

        assert!(outcome.is_meaningful());
        assert_eq!(f.state.search.phase, SearchPhase::Idle);
        assert_eq!(f.state.stats.searches_performed, 1);
        assert_eq!(f.state.last_target_seen, f.clock.now());
    }
}
