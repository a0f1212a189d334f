//! # Spinner
//!
//! A tiny animation whose phase lives in the instance. The dashboard caches
//! one spinner per running task and reuses it across frames. Constructing
//! a fresh spinner every render would reset the phase and freeze the
//! animation, which is exactly the bug the cache exists to prevent.

use std::time::{Duration, Instant};

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Frame advance interval.
const FRAME_INTERVAL: Duration = Duration::from_millis(80);

pub struct Spinner {
    started: Instant,
}

impl Spinner {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }

    /// Current frame, derived from elapsed time since this instance was
    /// created.
    pub fn frame(&self) -> &'static str {
        let ticks = self.started.elapsed().as_millis() / FRAME_INTERVAL.as_millis();
        FRAMES[(ticks as usize) % FRAMES.len()]
    }
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}
