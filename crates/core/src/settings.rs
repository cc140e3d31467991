use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logger;
use crate::types::CaptureRegion;

/// What the engine does with a detection of a given class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Ignore,
    #[default]
    LogOnly,
    Attack,
    Pickup,
    Interact,
}

impl ActionKind {
    /// Attack, pickup and interact produce input; ignore and log-only do not.
    pub fn is_meaningful(self) -> bool {
        match self {
            ActionKind::Attack | ActionKind::Pickup | ActionKind::Interact => true,
            ActionKind::Ignore | ActionKind::LogOnly => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Ignore => "ignore",
            ActionKind::LogOnly => "log_only",
            ActionKind::Attack => "attack",
            ActionKind::Pickup => "pickup",
            ActionKind::Interact => "interact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackMethod {
    #[default]
    Click,
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPattern {
    #[default]
    Horizontal,
    Vertical,
    Random,
}

/// Per-class behavior as written in the config file. Unset fields fall back
/// to the global automation settings when resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorPolicy {
    pub action: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interact_delay_ms: Option<u64>,
}

impl BehaviorPolicy {
    pub fn new(action: ActionKind) -> Self {
        Self { action, ..Default::default() }
    }

    pub fn max_distance(mut self, px: f64) -> Self {
        self.max_distance = Some(px);
        self
    }

    pub fn attack_delay_ms(mut self, ms: u64) -> Self {
        self.attack_delay_ms = Some(ms);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub confidence_threshold: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { confidence_threshold: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementKeys {
    pub left: String,
    pub right: String,
    pub jump: String,
    pub down: String,
}

impl Default for MovementKeys {
    fn default() -> Self {
        Self {
            left: "left".into(),
            right: "right".into(),
            jump: "alt".into(),
            down: "down".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Controls {
    pub pickup_key: String,
    pub interact_key: String,
    pub attack_method: AttackMethod,
    pub attack_key: String,
    pub movement_keys: MovementKeys,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            pickup_key: "z".into(),
            interact_key: "space".into(),
            attack_method: AttackMethod::Click,
            attack_key: "ctrl".into(),
            movement_keys: MovementKeys::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub enable: bool,
    pub search_delay_secs: f64,
    pub max_search_secs: f64,
    pub pattern: SearchPattern,
    pub move_duration_ms: u64,
    /// Consecutive horizontal moves before the direction flips.
    pub direction_flip_moves: u32,
    pub return_to_start: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            enable: false,
            search_delay_secs: 5.0,
            max_search_secs: 20.0,
            pattern: SearchPattern::Horizontal,
            move_duration_ms: 300,
            direction_flip_moves: 5,
            return_to_start: true,
        }
    }
}

impl SearchSettings {
    pub fn search_delay(&self) -> Duration {
        Duration::from_secs_f64(self.search_delay_secs.max(0.0))
    }

    pub fn max_search(&self) -> Duration {
        Duration::from_secs_f64(self.max_search_secs.max(0.0))
    }

    pub fn move_duration(&self) -> Duration {
        Duration::from_millis(self.move_duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Automation {
    pub action_delay_ms: u64,
    pub scan_interval_ms: u64,
    pub max_actions_per_cycle: u32,
    pub max_detection_distance: f64,
    pub priority_targets: Vec<String>,
    /// Random +/- fraction applied to dispatch delays (0 disables).
    pub delay_jitter: f64,
    pub search: SearchSettings,
}

impl Default for Automation {
    fn default() -> Self {
        Self {
            action_delay_ms: 100,
            scan_interval_ms: 500,
            max_actions_per_cycle: 2,
            max_detection_distance: 150.0,
            priority_targets: vec!["item".into(), "mob".into(), "npc".into()],
            delay_jitter: 0.0,
            search: SearchSettings::default(),
        }
    }
}

impl Automation {
    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Safety {
    /// 0 disables the limit.
    pub max_runtime_hours: f64,
    pub max_consecutive_errors: u32,
}

impl Default for Safety {
    fn default() -> Self {
        Self { max_runtime_hours: 0.0, max_consecutive_errors: 10 }
    }
}

impl Safety {
    pub fn max_runtime(&self) -> Option<Duration> {
        (self.max_runtime_hours > 0.0).then(|| Duration::from_secs_f64(self.max_runtime_hours * 3600.0))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preview {
    pub show: bool,
}

/// Resolved configuration snapshot for one automation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture_region: CaptureRegion,
    pub model: ModelSettings,
    pub controls: Controls,
    pub automation: Automation,
    pub safety: Safety,
    pub detection_behavior: BTreeMap<String, BehaviorPolicy>,
    pub preview: Preview,
}

impl Default for Config {
    fn default() -> Self {
        let mut detection_behavior = BTreeMap::new();
        detection_behavior.insert(
            "mob".to_string(),
            BehaviorPolicy::new(ActionKind::Attack).attack_delay_ms(500).max_distance(150.0),
        );
        detection_behavior.insert("item".to_string(), BehaviorPolicy::new(ActionKind::Pickup).max_distance(100.0));
        detection_behavior.insert("npc".to_string(), BehaviorPolicy::new(ActionKind::Interact).max_distance(80.0));

        Self {
            capture_region: CaptureRegion::default(),
            model: ModelSettings::default(),
            controls: Controls::default(),
            automation: Automation::default(),
            safety: Safety::default(),
            detection_behavior,
            preview: Preview::default(),
        }
    }
}

impl Config {
    /// Load from a JSON file. A missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        let mut config = match Self::try_load(path) {
            Ok(c) => c,
            Err(e) => {
                logger::warn(&format!("config {}: {:#}, using defaults", path.display(), e));
                Self::default()
            }
        };
        config.validate();
        config
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Clamp values the loop cannot work with.
    pub fn validate(&mut self) {
        let auto = &mut self.automation;
        if auto.scan_interval_ms == 0 {
            logger::warn("scan_interval_ms must be positive, using 500");
            auto.scan_interval_ms = 500;
        }
        if auto.max_actions_per_cycle == 0 {
            logger::warn("max_actions_per_cycle must be at least 1, using 1");
            auto.max_actions_per_cycle = 1;
        }
        if !(0.0..=0.5).contains(&auto.delay_jitter) {
            logger::warn(&format!("delay_jitter {} out of range, clamping to 0..0.5", auto.delay_jitter));
            auto.delay_jitter = if auto.delay_jitter.is_nan() { 0.0 } else { auto.delay_jitter.clamp(0.0, 0.5) };
        }
        if auto.search.direction_flip_moves == 0 {
            auto.search.direction_flip_moves = 5;
        }
        if self.capture_region.width == 0 || self.capture_region.height == 0 {
            logger::warn("capture region has zero size, using full HD");
            self.capture_region = CaptureRegion::default();
        }
        if self.safety.max_consecutive_errors == 0 {
            self.safety.max_consecutive_errors = 1;
        }
    }

    /// Resolve per-class policies once, applying global fallbacks.
    pub fn policies(&self) -> PolicyTable {
        let fallback = ResolvedPolicy {
            action: ActionKind::LogOnly,
            max_distance: self.automation.max_detection_distance,
            action_delay: self.automation.action_delay(),
            attack_delay: self.automation.action_delay(),
            interact_delay: self.automation.action_delay(),
        };
        let by_class = self
            .detection_behavior
            .iter()
            .map(|(name, p)| {
                let resolved = ResolvedPolicy {
                    action: p.action,
                    max_distance: p.max_distance.unwrap_or(fallback.max_distance),
                    action_delay: fallback.action_delay,
                    attack_delay: p.attack_delay_ms.map(Duration::from_millis).unwrap_or(fallback.attack_delay),
                    interact_delay: p.interact_delay_ms.map(Duration::from_millis).unwrap_or(fallback.interact_delay),
                };
                (name.clone(), resolved)
            })
            .collect();
        PolicyTable { by_class, fallback }
    }
}

/// A behavior policy with every fallback applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPolicy {
    pub action: ActionKind,
    pub max_distance: f64,
    pub action_delay: Duration,
    pub attack_delay: Duration,
    pub interact_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct PolicyTable {
    by_class: HashMap<String, ResolvedPolicy>,
    fallback: ResolvedPolicy,
}

impl PolicyTable {
    /// Policy for `class_name`; unknown classes are log-only.
    pub fn get(&self, class_name: &str) -> &ResolvedPolicy {
        self.by_class.get(class_name).unwrap_or(&self.fallback)
    }
}
