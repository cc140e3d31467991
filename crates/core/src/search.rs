use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::Clock;
use crate::logger;
use crate::platform::Input;
use crate::settings::{Config, MovementKeys, SearchPattern, SearchSettings};
use crate::state::RunState;

/// Pause after each search step and between return moves.
pub const SETTLE: Duration = Duration::from_millis(100);
/// Delay between holding down and pressing jump when dropping through a platform.
const DROP_LEAD: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPhase {
    #[default]
    Idle,
    Searching,
}

/// Search bookkeeping carried in the run state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchProgress {
    pub phase: SearchPhase,
    pub started_at: Option<Instant>,
    /// Steps taken in the current segment (reset when the direction flips).
    pub moves: u32,
    /// +1 right, -1 left.
    pub direction: i32,
    /// Net horizontal steps in the current segment, right positive.
    pub segment_net: i32,
}

impl Default for SearchProgress {
    fn default() -> Self {
        Self { phase: SearchPhase::Idle, started_at: None, moves: 0, direction: 1, segment_net: 0 }
    }
}

impl SearchProgress {
    pub fn is_searching(&self) -> bool {
        self.phase == SearchPhase::Searching
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEnd {
    TargetFound,
    TimedOut,
    SessionEnded,
}

impl SearchEnd {
    fn as_str(self) -> &'static str {
        match self {
            SearchEnd::TargetFound => "target found",
            SearchEnd::TimedOut => "max search time reached",
            SearchEnd::SessionEnded => "session ended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    Left,
    Right,
    Jump,
}

/// Drives exploratory movement while no target is in view. Only the loop
/// thread calls into it; all state lives in [`RunState::search`].
pub struct SearchMachine {
    settings: SearchSettings,
    keys: MovementKeys,
    clock: Arc<dyn Clock>,
    rng: StdRng,
}

impl SearchMachine {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        logger::register_prefix("search", logger::COLOR_MAGENTA);
        Self {
            settings: config.automation.search.clone(),
            keys: config.controls.movement_keys.clone(),
            clock,
            rng: StdRng::from_entropy(),
        }
    }

    /// Fix the random pattern's choices.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Enabled, idle, and nothing seen for longer than the search delay.
    pub fn should_start(&self, state: &RunState) -> bool {
        if !self.settings.enable || state.search.is_searching() {
            return false;
        }
        let idle_for = self.clock.now().saturating_duration_since(state.last_target_seen);
        idle_for > self.settings.search_delay()
    }

    pub fn start(&self, state: &mut RunState) {
        if state.search.is_searching() {
            return;
        }
        let s = &mut state.search;
        s.phase = SearchPhase::Searching;
        s.started_at = Some(self.clock.now());
        s.moves = 0;
        s.segment_net = 0;
        logger::info_p("search", &format!("searching for targets ({:?} pattern)", self.settings.pattern));
    }

    /// Perform one pattern step, or end the search if it has run too long.
    pub fn step(&mut self, state: &mut RunState, input: &mut dyn Input) {
        if !state.search.is_searching() {
            return;
        }
        let started = state.search.started_at.unwrap_or_else(|| self.clock.now());
        if self.clock.now().saturating_duration_since(started) > self.settings.max_search() {
            self.end(state, input, SearchEnd::TimedOut);
            return;
        }

        let result = match self.settings.pattern {
            SearchPattern::Horizontal => self.horizontal(state, input),
            SearchPattern::Vertical => self.vertical(state, input),
            SearchPattern::Random => self.random(state, input),
        };
        if let Err(e) = result {
            logger::warn_p("search", &format!("search move failed: {:#}", e));
        }
        self.clock.sleep(SETTLE);
    }

    /// Leave `Searching`: walk back toward the start if configured, then
    /// record the finished search.
    pub fn end(&self, state: &mut RunState, input: &mut dyn Input, reason: SearchEnd) {
        if !state.search.is_searching() {
            return;
        }
        let duration = state
            .search
            .started_at
            .map(|t| self.clock.now().saturating_duration_since(t))
            .unwrap_or_default();

        // Once the session is over nothing may move the character.
        if self.settings.return_to_start && reason != SearchEnd::SessionEnded {
            if let Err(e) = self.return_to_start(state, input) {
                logger::warn_p("search", &format!("return to start failed: {:#}", e));
            }
        }

        state.stats.record_search(duration);
        state.search.phase = SearchPhase::Idle;
        state.search.started_at = None;

        let avg = state.stats.average_search().unwrap_or_default();
        logger::info_p("search", &format!(
            "search ended ({}) after {:.1}s | searches {} | total {:.1}s | avg {:.1}s",
            reason.as_str(),
            duration.as_secs_f64(),
            state.stats.searches_performed,
            state.stats.search_time_total.as_secs_f64(),
            avg.as_secs_f64(),
        ));
    }

    fn horizontal(&mut self, state: &mut RunState, input: &mut dyn Input) -> Result<()> {
        let mv = if state.search.direction > 0 { Move::Right } else { Move::Left };
        let result = self.hold_move(mv, input);
        self.count_move(state, mv);

        if state.search.moves >= self.settings.direction_flip_moves {
            let s = &mut state.search;
            s.direction = -s.direction;
            s.moves = 0;
            s.segment_net = 0;
            let side = if s.direction > 0 { "right" } else { "left" };
            logger::info_p("search", &format!("search direction changed: {}", side));
        }
        result
    }

    fn vertical(&mut self, state: &mut RunState, input: &mut dyn Input) -> Result<()> {
        // Tick numbers are 1-based: odd ticks jump, even ticks drop down.
        let tick = state.search.moves + 1;
        let result = if tick % 2 == 1 {
            input.press(&self.keys.jump)
        } else {
            self.drop_down(input)
        };
        self.count_move(state, Move::Jump);
        result
    }

    fn random(&mut self, state: &mut RunState, input: &mut dyn Input) -> Result<()> {
        let mv = match self.rng.gen_range(0..3) {
            0 => Move::Left,
            1 => Move::Right,
            _ => Move::Jump,
        };
        let result = match mv {
            Move::Jump => input.press(&self.keys.jump),
            _ => self.hold_move(mv, input),
        };
        self.count_move(state, mv);
        result
    }

    fn count_move(&self, state: &mut RunState, mv: Move) {
        let s = &mut state.search;
        s.moves += 1;
        match mv {
            Move::Left => s.segment_net -= 1,
            Move::Right => s.segment_net += 1,
            Move::Jump => {}
        }
    }

    fn hold_move(&self, mv: Move, input: &mut dyn Input) -> Result<()> {
        let key = match mv {
            Move::Left => &self.keys.left,
            Move::Right => &self.keys.right,
            Move::Jump => return input.press(&self.keys.jump),
        };
        self.hold(key, self.settings.move_duration(), input)
    }

    fn hold(&self, key: &str, dur: Duration, input: &mut dyn Input) -> Result<()> {
        input.key_down(key)?;
        self.clock.sleep(dur);
        input.key_up(key)
    }

    fn drop_down(&self, input: &mut dyn Input) -> Result<()> {
        input.key_down(&self.keys.down)?;
        self.clock.sleep(DROP_LEAD);
        let jumped = input.press(&self.keys.jump);
        self.clock.sleep(self.settings.move_duration() / 2);
        let released = input.key_up(&self.keys.down);
        jumped.and(released)
    }

    /// Reverse half the moves of the last segment (rounded up), opposite to
    /// its net horizontal direction. Segments without horizontal travel stay put.
    fn return_to_start(&self, state: &RunState, input: &mut dyn Input) -> Result<()> {
        let s = &state.search;
        let back = match s.segment_net.signum() {
            1 => Move::Left,
            -1 => Move::Right,
            _ => return Ok(()),
        };
        let steps = s.moves.div_ceil(2);
        if steps == 0 {
            return Ok(());
        }
        logger::info_p("search", &format!("returning toward start: {} move(s) {:?}", steps, back));
        for _ in 0..steps {
            self.hold_move(back, input)?;
            self.clock.sleep(SETTLE);
        }
        Ok(())
    }
}
