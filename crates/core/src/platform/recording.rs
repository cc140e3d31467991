//! In-memory collaborators that record what the engine asks for and serve
//! scripted frames. Used by the test suites.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};

use crate::types::*;
use super::{Capture, Detector, Effect, Input};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared, cloneable view of recorded effects.
#[derive(Debug, Clone, Default)]
pub struct EffectLog(Arc<Mutex<Vec<Effect>>>);

impl EffectLog {
    pub fn all(&self) -> Vec<Effect> {
        lock(&self.0).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of presses and clicks recorded.
    pub fn triggers(&self) -> usize {
        lock(&self.0).iter().filter(|e| e.is_trigger()).count()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }

    fn push(&self, effect: Effect) {
        lock(&self.0).push(effect);
    }
}

/// Input that records effects. With `failing`, every call errors and
/// nothing is recorded.
#[derive(Debug, Default)]
pub struct RecordingInput {
    log: EffectLog,
    fail: bool,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn log(&self) -> EffectLog {
        self.log.clone()
    }

    fn record(&mut self, effect: Effect) -> Result<()> {
        if self.fail {
            bail!("injection refused: {:?}", effect);
        }
        self.log.push(effect);
        Ok(())
    }
}

impl Input for RecordingInput {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        if x < 0 || y < 0 {
            bail!("coordinates out of bounds: ({}, {})", x, y);
        }
        self.record(Effect::MoveTo(x, y))
    }

    fn key_down(&mut self, key: &str) -> Result<()> {
        self.record(Effect::KeyDown(key.to_string()))
    }

    fn key_up(&mut self, key: &str) -> Result<()> {
        self.record(Effect::KeyUp(key.to_string()))
    }

    fn press(&mut self, key: &str) -> Result<()> {
        self.record(Effect::Press(key.to_string()))
    }

    fn click(&mut self) -> Result<()> {
        self.record(Effect::Click)
    }
}

/// Capture that hands out blank frames, optionally failing a number of
/// grabs first.
#[derive(Debug, Clone)]
pub struct ScriptedCapture {
    region: CaptureRegion,
    failures: Arc<Mutex<u32>>,
}

impl ScriptedCapture {
    pub fn new(region: CaptureRegion) -> Self {
        Self { region, failures: Arc::new(Mutex::new(0)) }
    }

    /// Make the next `n` grabs fail.
    pub fn fail_next(&self, n: u32) {
        *lock(&self.failures) = n;
    }
}

impl Capture for ScriptedCapture {
    fn region(&self) -> CaptureRegion {
        self.region
    }

    fn grab(&mut self) -> Result<Frame> {
        let mut failures = lock(&self.failures);
        if *failures > 0 {
            *failures -= 1;
            return Err(anyhow!("capture device unavailable"));
        }
        Ok(Frame::blank(self.region.width, self.region.height))
    }
}

/// One scripted detector response.
#[derive(Debug, Clone)]
pub enum Script {
    Batch(Vec<Detection>),
    Fail(String),
    Panic(String),
}

/// Detector fed from a shared queue. An empty queue yields no detections.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDetector {
    queue: Arc<Mutex<VecDeque<Script>>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, script: Script) {
        lock(&self.queue).push_back(script);
    }

    pub fn push_batch(&self, batch: Vec<Detection>) {
        self.push(Script::Batch(batch));
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let next = lock(&self.queue).pop_front();
        match next {
            None => Ok(Vec::new()),
            Some(Script::Batch(batch)) => Ok(batch),
            Some(Script::Fail(msg)) => Err(anyhow!(msg)),
            Some(Script::Panic(msg)) => panic!("{}", msg),
        }
    }
}
