use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use core_graphics::event::{CGEvent, CGEventTapLocation, CGEventType, CGKeyCode, CGMouseButton};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::window::{
    create_image, kCGNullWindowID, kCGWindowImageNominalResolution, kCGWindowListOptionOnScreenOnly,
};

use crate::logger;
use crate::types::*;
use super::{Capture, Input};

// Virtual key codes (US layout) for the names used in controls config
fn key_code(key: &str) -> Option<CGKeyCode> {
    let code = match key.to_lowercase().as_str() {
        "a" => 0, "s" => 1, "d" => 2, "f" => 3, "h" => 4, "g" => 5, "z" => 6,
        "x" => 7, "c" => 8, "v" => 9, "b" => 11, "q" => 12, "w" => 13, "e" => 14,
        "r" => 15, "y" => 16, "t" => 17, "1" => 18, "2" => 19, "3" => 20, "4" => 21,
        "6" => 22, "5" => 23, "9" => 25, "7" => 26, "8" => 28, "0" => 29, "o" => 31,
        "u" => 32, "i" => 34, "p" => 35, "l" => 37, "j" => 38, "k" => 40, "n" => 45,
        "m" => 46,
        "enter" | "return" => 36,
        "tab" => 48,
        "space" => 49,
        "delete" | "backspace" => 51,
        "escape" | "esc" => 53,
        "cmd" | "command" => 55,
        "shift" => 56,
        "alt" | "option" => 58,
        "ctrl" | "control" => 59,
        "left" => 123,
        "right" => 124,
        "down" => 125,
        "up" => 126,
        _ => return None,
    };
    Some(code)
}

fn event_source() -> Result<CGEventSource> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .map_err(|_| anyhow!("failed to create CGEventSource"))
}

/// Posts synthetic pointer and keyboard events to the HID stream.
pub struct DarwinInput {
    cursor: CGPoint,
}

impl DarwinInput {
    pub fn new() -> Self {
        Self { cursor: CGPoint::new(0.0, 0.0) }
    }

    fn post_key(&self, key: &str, down: bool) -> Result<()> {
        let Some(code) = key_code(key) else {
            bail!("unknown key: {}", key);
        };
        let event = CGEvent::new_keyboard_event(event_source()?, code, down)
            .map_err(|_| anyhow!("failed to create key event for {}", key))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn post_mouse(&self, kind: CGEventType) -> Result<()> {
        let event = CGEvent::new_mouse_event(event_source()?, kind, self.cursor, CGMouseButton::Left)
            .map_err(|_| anyhow!("failed to create mouse event"))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

impl Default for DarwinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Input for DarwinInput {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        if x < 0 || y < 0 {
            bail!("coordinates out of bounds: ({}, {})", x, y);
        }
        self.cursor = CGPoint::new(x as f64, y as f64);
        self.post_mouse(CGEventType::MouseMoved)
    }

    fn key_down(&mut self, key: &str) -> Result<()> {
        self.post_key(key, true)
    }

    fn key_up(&mut self, key: &str) -> Result<()> {
        self.post_key(key, false)
    }

    fn press(&mut self, key: &str) -> Result<()> {
        self.post_key(key, true)?;
        thread::sleep(Duration::from_millis(15));
        self.post_key(key, false)
    }

    fn click(&mut self) -> Result<()> {
        self.post_mouse(CGEventType::LeftMouseDown)?;
        thread::sleep(Duration::from_millis(15));
        self.post_mouse(CGEventType::LeftMouseUp)
    }
}

/// Grabs the configured screen rectangle through the window server.
pub struct DarwinCapture {
    region: CaptureRegion,
}

impl DarwinCapture {
    pub fn new(region: CaptureRegion) -> Self {
        logger::info_p("darwin", &format!(
            "capturing {}x{} at ({}, {})", region.width, region.height, region.x, region.y
        ));
        Self { region }
    }
}

impl Capture for DarwinCapture {
    fn region(&self) -> CaptureRegion {
        self.region
    }

    fn grab(&mut self) -> Result<Frame> {
        let r = self.region;
        let bounds = CGRect::new(
            &CGPoint::new(r.x as f64, r.y as f64),
            &CGSize::new(r.width as f64, r.height as f64),
        );
        let image = create_image(
            bounds,
            kCGWindowListOptionOnScreenOnly,
            kCGNullWindowID,
            kCGWindowImageNominalResolution,
        )
        .ok_or_else(|| anyhow!("screen capture returned no image (screen recording permission?)"))?;

        let bpr = image.bytes_per_row() as u32;
        let cf_data = image.data();
        Ok(Frame {
            data: cf_data.bytes().to_vec(),
            width: image.width() as u32,
            height: image.height() as u32,
            bytes_per_row: bpr,
        })
    }
}
