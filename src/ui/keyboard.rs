//! # Keyboard Reader
//!
//! Scoped raw-mode terminal input with a non-blocking poll.
//!
//! The guard semantics are deliberately forgiving: entering raw mode twice,
//! leaving twice, or leaving without entering are all safe no-ops, and on a
//! non-TTY stdin every operation degrades to "no input". Byte-level escape
//! sequence decoding is delegated to crossterm's event reader; this module
//! owns the mapping into the small [`Key`] vocabulary the dashboard acts on.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal;
use tracing::debug;

/// Keys the dashboard reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Enter,
    Escape,
    /// A plain character, lowercased.
    Char(char),
    Unknown,
}

/// Map a crossterm key event into the dashboard vocabulary.
pub fn map_key_event(key: KeyEvent) -> Key {
    match key.code {
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Escape,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Key::Escape,
        KeyCode::Char(c) => Key::Char(c.to_ascii_lowercase()),
        _ => Key::Unknown,
    }
}

/// Raw-mode keyboard reader.
pub struct KeyboardReader {
    raw_mode_active: bool,
}

impl KeyboardReader {
    pub fn new() -> Self {
        Self { raw_mode_active: false }
    }

    /// Enter raw mode. Safe to call when already started or without a TTY.
    pub fn start(&mut self) {
        if self.raw_mode_active {
            return;
        }
        match terminal::enable_raw_mode() {
            Ok(()) => self.raw_mode_active = true,
            Err(e) => debug!(error = %e, "raw mode unavailable, keyboard reader disabled"),
        }
    }

    /// Leave raw mode. Safe to call repeatedly or without a prior start.
    pub fn stop(&mut self) {
        if !self.raw_mode_active {
            return;
        }
        if let Err(e) = terminal::disable_raw_mode() {
            debug!(error = %e, "failed to disable raw mode");
        }
        self.raw_mode_active = false;
    }

    pub fn is_active(&self) -> bool {
        self.raw_mode_active
    }

    /// Non-blocking read: `None` when no key is ready or the reader is not
    /// started.
    pub fn read_key(&self) -> Option<Key> {
        if !self.raw_mode_active {
            return None;
        }
        poll_key_nonblocking()
    }
}

impl Default for KeyboardReader {
    fn default() -> Self {
        Self::new()
    }
}

/// One zero-timeout poll against crossterm's event stream. Raw mode is the
/// caller's business; without it, line buffering simply delays delivery.
pub fn poll_key_nonblocking() -> Option<Key> {
    match event::poll(Duration::ZERO) {
        Ok(true) => match event::read() {
            Ok(Event::Key(key)) => Some(map_key_event(key)),
            _ => None,
        },
        _ => None,
    }
}

impl Drop for KeyboardReader {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        let plain = KeyModifiers::NONE;
        assert_eq!(map_key_event(KeyEvent::new(KeyCode::Up, plain)), Key::Up);
        assert_eq!(map_key_event(KeyEvent::new(KeyCode::Down, plain)), Key::Down);
        assert_eq!(map_key_event(KeyEvent::new(KeyCode::Enter, plain)), Key::Enter);
        assert_eq!(map_key_event(KeyEvent::new(KeyCode::Esc, plain)), Key::Escape);
        assert_eq!(map_key_event(KeyEvent::new(KeyCode::Char('Q'), plain)), Key::Char('q'));
        assert_eq!(map_key_event(KeyEvent::new(KeyCode::F(5), plain)), Key::Unknown);
    }

    #[test]
    fn test_ctrl_c_maps_to_escape() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key_event(key), Key::Escape);
    }

    #[test]
    fn test_read_before_start_is_none() {
        let reader = KeyboardReader::new();
        assert!(reader.read_key().is_none());
    }

    #[test]
    fn test_stop_without_start_is_safe() {
        let mut reader = KeyboardReader::new();
        reader.stop();
        reader.stop();
        assert!(!reader.is_active());
    }

    #[test]
    fn test_double_start_and_stop_are_safe() {
        // In a non-TTY test environment raw mode may fail; the reader must
        // stay inert rather than erroring.
        let mut reader = KeyboardReader::new();
        reader.start();
        reader.start();
        reader.stop();
        reader.stop();
        assert!(!reader.is_active());
    }
}
