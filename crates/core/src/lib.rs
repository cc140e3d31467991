//! Perception-to-action decision engine.
//!
//! A detector reports what is on screen, the engine decides what to do about
//! it: rank the detections, act on the best ones through injected input, and
//! search for targets when nothing useful has been seen for a while.

pub mod clock;
pub mod dispatch;
pub mod logger;
pub mod orchestrator;
pub mod platform;
pub mod prioritize;
pub mod search;
pub mod settings;
pub mod state;
pub mod stats;
pub mod types;
