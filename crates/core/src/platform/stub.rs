use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::logger;
use crate::types::*;
use super::{confident, Capture, Detector, Input, Platform};

const STUB_CLASSES: [&str; 4] = ["mob", "item", "npc", "portal"];

/// Stub capture + input for dry runs: nothing touches the real screen.
pub fn platform(region: CaptureRegion) -> Platform {
    Platform {
        capture: Box::new(StubCapture { region }),
        input: Box::new(StubInput),
    }
}

pub struct StubCapture {
    region: CaptureRegion,
}

impl Capture for StubCapture {
    fn region(&self) -> CaptureRegion {
        self.region
    }

    fn grab(&mut self) -> Result<Frame> {
        Ok(Frame::blank(self.region.width, self.region.height))
    }
}

/// Logs every request instead of injecting it.
pub struct StubInput;

impl Input for StubInput {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        logger::info_p("stub", &format!("move_to({}, {})", x, y));
        Ok(())
    }

    fn key_down(&mut self, key: &str) -> Result<()> {
        logger::info_p("stub", &format!("key_down(\"{}\")", key));
        Ok(())
    }

    fn key_up(&mut self, key: &str) -> Result<()> {
        logger::info_p("stub", &format!("key_up(\"{}\")", key));
        Ok(())
    }

    fn press(&mut self, key: &str) -> Result<()> {
        logger::info_p("stub", &format!("press(\"{}\")", key));
        Ok(())
    }

    fn click(&mut self) -> Result<()> {
        logger::info_p("stub", "click()");
        Ok(())
    }
}

/// Produces a few random detections per frame so the whole loop can be
/// watched without a model.
pub struct StubDetector {
    region: CaptureRegion,
    threshold: f32,
    rng: StdRng,
}

impl StubDetector {
    pub fn new(region: CaptureRegion, threshold: f32) -> Self {
        Self { region, threshold, rng: StdRng::from_entropy() }
    }

    pub fn seeded(region: CaptureRegion, threshold: f32, seed: u64) -> Self {
        Self { region, threshold, rng: StdRng::seed_from_u64(seed) }
    }
}

impl Detector for StubDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let w = self.region.width.max(2) as i32;
        let h = self.region.height.max(2) as i32;
        let count = self.rng.gen_range(0..=3);
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let class_id = self.rng.gen_range(0..STUB_CLASSES.len());
            let bw = self.rng.gen_range(8..=64).min(w - 1);
            let bh = self.rng.gen_range(8..=64).min(h - 1);
            let x1 = self.rng.gen_range(0..w - bw);
            let y1 = self.rng.gen_range(0..h - bh);
            out.push(Detection::new(
                BoundingBox::new(x1, y1, x1 + bw, y1 + bh),
                self.rng.gen_range(0.3..1.0),
                class_id as u32,
                STUB_CLASSES[class_id],
                &self.region,
            ));
        }
        Ok(confident(out, self.threshold))
    }
}

/// Detector for hosts without a model backend: never sees anything.
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_detections_stay_inside_region() {
        let region = CaptureRegion { x: 10, y: 10, width: 320, height: 240 };
        let mut detector = StubDetector::seeded(region, 0.5, 7);
        let frame = Frame::blank(region.width, region.height);

        for _ in 0..50 {
            for det in detector.detect(&frame).unwrap() {
                assert!(det.confidence > 0.5);
                assert!(det.bbox.x1 >= 0 && det.bbox.x2 <= 320);
                assert!(det.bbox.y1 >= 0 && det.bbox.y2 <= 240);
                assert!(STUB_CLASSES.contains(&det.class_name.as_str()));
            }
        }
    }
}
