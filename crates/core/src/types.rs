use serde::{Deserialize, Serialize};

/// Screen area that frames are captured from. Detection coordinates are
/// relative to its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureRegion {
    fn default() -> Self {
        Self { x: 0, y: 0, width: 1920, height: 1080 }
    }
}

impl CaptureRegion {
    /// Center of the region in region-relative pixels.
    pub fn center(&self) -> (i32, i32) {
        (self.width as i32 / 2, self.height as i32 / 2)
    }

    /// Convert a region-relative point to absolute screen coordinates.
    pub fn to_screen(&self, point: (i32, i32)) -> (i32, i32) {
        (self.x + point.0, self.y + point.1)
    }
}

/// Raw screenshot pixel data (BGRA)
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl Frame {
    /// A frame with dimensions but no pixels, for adapters that do not read them.
    pub fn blank(width: u32, height: u32) -> Self {
        Self { data: Vec::new(), width, height, bytes_per_row: width * 4 }
    }
}

/// Axis-aligned box in region-relative pixels (x1,y1 top-left; x2,y2 bottom-right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }
}

/// One detected object in one frame. Built once by the detector adapter and
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
    pub class_name: String,
    pub center: (i32, i32),
    /// Euclidean distance from `center` to the capture region center.
    pub distance: f64,
}

impl Detection {
    pub fn new(
        bbox: BoundingBox,
        confidence: f32,
        class_id: u32,
        class_name: impl Into<String>,
        region: &CaptureRegion,
    ) -> Self {
        let center = bbox.center();
        let (cx, cy) = region.center();
        let dx = (center.0 - cx) as f64;
        let dy = (center.1 - cy) as f64;
        Self {
            bbox,
            confidence,
            class_id,
            class_name: class_name.into(),
            center,
            distance: (dx * dx + dy * dy).sqrt(),
        }
    }
}
