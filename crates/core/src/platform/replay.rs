use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::types::*;
use super::{confident, Detector};

/// One box as written by an external detector.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBox {
    pub bbox: [i32; 4],
    pub confidence: f32,
    #[serde(default)]
    pub class_id: u32,
    pub class_name: String,
}

/// Replays recorded detector output, one batch per frame, looping at the end.
///
/// The file is a JSON array of batches, each an array of [`RawBox`].
pub struct ReplayDetector {
    batches: Vec<Vec<Detection>>,
    next: usize,
}

impl ReplayDetector {
    pub fn load(path: &Path, region: CaptureRegion, threshold: f32) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text, region, threshold).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json(text: &str, region: CaptureRegion, threshold: f32) -> Result<Self> {
        let raw: Vec<Vec<RawBox>> = serde_json::from_str(text)?;
        if raw.is_empty() {
            bail!("replay contains no batches");
        }
        let batches = raw
            .into_iter()
            .map(|batch| {
                let dets = batch
                    .into_iter()
                    .map(|b| {
                        let [x1, y1, x2, y2] = b.bbox;
                        Detection::new(BoundingBox::new(x1, y1, x2, y2), b.confidence, b.class_id, b.class_name, &region)
                    })
                    .collect();
                confident(dets, threshold)
            })
            .collect();
        Ok(Self { batches, next: 0 })
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let batch = self.batches[self.next].clone();
        self.next = (self.next + 1) % self.batches.len();
        Ok(batch)
    }
}
