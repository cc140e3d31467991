pub mod recording;
pub mod replay;
pub mod stub;

#[cfg(target_os = "macos")]
pub mod darwin;

use anyhow::Result;

use crate::logger;
use crate::types::*;

/// Screen capture collaborator.
pub trait Capture: Send {
    fn region(&self) -> CaptureRegion;
    fn grab(&mut self) -> Result<Frame>;
}

/// Object detector collaborator. Returned detections must already be
/// confidence-filtered (see [`confident`]).
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Input-injection collaborator. Coordinates are absolute screen pixels.
pub trait Input: Send {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn key_down(&mut self, key: &str) -> Result<()>;
    fn key_up(&mut self, key: &str) -> Result<()>;
    fn press(&mut self, key: &str) -> Result<()>;
    fn click(&mut self) -> Result<()>;
}

/// One side effect requested from an [`Input`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    MoveTo(i32, i32),
    KeyDown(String),
    KeyUp(String),
    Press(String),
    Click,
}

impl Effect {
    /// Key presses and clicks act on the target; moves and holds only position.
    pub fn is_trigger(&self) -> bool {
        matches!(self, Effect::Press(_) | Effect::Click)
    }
}

/// Capture and input backends for the current host.
pub struct Platform {
    pub capture: Box<dyn Capture>,
    pub input: Box<dyn Input>,
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool, region: CaptureRegion) -> Platform {
    logger::register_prefix("stub", logger::COLOR_GRAY);
    if force_stub {
        return stub::platform(region);
    }
    #[cfg(target_os = "macos")]
    {
        logger::register_prefix("darwin", logger::COLOR_GRAY);
        return Platform {
            capture: Box::new(darwin::DarwinCapture::new(region)),
            input: Box::new(darwin::DarwinInput::new()),
        };
    }
    #[cfg(not(target_os = "macos"))]
    {
        logger::warn("no native input backend for this OS, using stub platform");
        stub::platform(region)
    }
}

/// Keep detections whose confidence exceeds `threshold`. Detector adapters
/// call this before handing results to the engine.
pub fn confident(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections.into_iter().filter(|d| d.confidence > threshold).collect()
}
