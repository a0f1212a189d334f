//! # Terminal UI
//!
//! - [`tui`] - Live task-run dashboard (ratatui)
//! - [`keyboard`] - Raw-mode key polling
//! - [`log_buffer`] - Bounded per-task log rings with file tee
//! - [`spinner`] - Phase-preserving spinner instances

pub mod keyboard;
pub mod log_buffer;
pub mod spinner;
pub mod tui;
