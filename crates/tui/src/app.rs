use std::sync::{Arc, mpsc};

use seeker_core::state::{Control, RunSnapshot, RunStatus};

/// Log lines kept for the log pane.
const LOG_CAPACITY: usize = 2000;

pub struct App {
    pub control: Arc<Control>,
    pub snapshot: Option<RunSnapshot>,
    pub snapshot_rx: mpsc::Receiver<RunSnapshot>,
    pub show_detections: bool,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        control: Arc<Control>,
        snapshot_rx: mpsc::Receiver<RunSnapshot>,
        log_rx: mpsc::Receiver<String>,
        show_detections: bool,
    ) -> Self {
        Self {
            control,
            snapshot: None,
            snapshot_rx,
            show_detections,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            should_quit: false,
        }
    }

    /// Pull everything the engine thread published since the last frame.
    pub fn drain(&mut self) {
        while let Ok(snap) = self.snapshot_rx.try_recv() {
            self.snapshot = Some(snap);
        }
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
        if self.log_messages.len() > LOG_CAPACITY {
            let excess = self.log_messages.len() - LOG_CAPACITY;
            self.log_messages.drain(..excess);
        }
    }

    /// Status from the control flags, which move ahead of the last snapshot.
    pub fn status(&self) -> RunStatus {
        RunStatus::of(&self.control)
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn toggle_pause(&mut self) {
        if !self.control.is_running() {
            return;
        }
        let paused = self.control.toggle_pause();
        seeker_core::logger::info(if paused { "paused" } else { "resumed" });
    }

    pub fn stop(&mut self) {
        if self.control.is_running() {
            seeker_core::logger::info("stop requested");
            self.control.stop();
        }
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    pub fn toggle_detections(&mut self) {
        self.show_detections = !self.show_detections;
    }

    pub fn quit(&mut self) {
        self.stop();
        self.should_quit = true;
    }
}
