//! # Task Log Buffer
//!
//! Bounded in-memory ring of recent lines with a backing file for full
//! history. The ring serves the TUI's tail window; the file keeps the
//! complete task transcript under the run directory.
//!
//! The file handle is created on first write (parent directories included)
//! and closed idempotently; dropping the buffer closes it too.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::workflow::events::format_timestamp;

/// Default ring capacity in lines.
pub const DEFAULT_TAIL_LINES: usize = 100;

/// Default tail-window size for display.
pub const DEFAULT_TAIL_WINDOW: usize = 15;

pub struct TaskLogBuffer {
    log_path: Option<PathBuf>,
    tail_lines: usize,
    ring: VecDeque<String>,
    file: Option<BufWriter<File>>,
    line_count: usize,
    closed: bool,
}

impl TaskLogBuffer {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(log_path, DEFAULT_TAIL_LINES)
    }

    pub fn with_capacity(log_path: impl Into<PathBuf>, tail_lines: usize) -> Self {
        Self {
            log_path: Some(log_path.into()),
            tail_lines,
            ring: VecDeque::with_capacity(tail_lines.min(256)),
            file: None,
            line_count: 0,
            closed: false,
        }
    }

    /// Ring-only buffer with no backing file; used for display-side copies
    /// where another owner already persists the full transcript.
    pub fn ring_only(tail_lines: usize) -> Self {
        Self {
            log_path: None,
            tail_lines,
            ring: VecDeque::with_capacity(tail_lines.min(256)),
            file: None,
            line_count: 0,
            closed: false,
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn tail_lines(&self) -> usize {
        self.tail_lines
    }

    /// Total lines written, not just the buffered window.
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Append a line with a millisecond timestamp prefix in the file copy.
    pub fn write(&mut self, line: &str) {
        self.push(line, true);
    }

    /// Append a line verbatim, no timestamp.
    pub fn write_raw(&mut self, line: &str) {
        self.push(line, false);
    }

    fn push(&mut self, line: &str, timestamp: bool) {
        self.ring.push_back(line.to_string());
        while self.ring.len() > self.tail_lines {
            self.ring.pop_front();
        }
        self.line_count += 1;

        if self.file.is_none() && !self.closed {
            self.file = self.open_file();
        }
        if let Some(file) = &mut self.file {
            let result = if timestamp {
                writeln!(file, "{} {}", format_timestamp(), line)
            } else {
                writeln!(file, "{line}")
            };
            if let Err(e) = result {
                debug!(error = %e, "log write failed");
            }
        }
    }

    fn open_file(&self) -> Option<BufWriter<File>> {
        let path = self.log_path.as_ref()?;
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                debug!(path = %parent.display(), error = %e, "failed to create log dir");
                return None;
            }
        }
        match File::create(path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "failed to create log file");
                None
            }
        }
    }

    /// Last `n` buffered lines, oldest first. Fewer when fewer were written.
    pub fn get_tail(&self, n: usize) -> Vec<String> {
        let skip = self.ring.len().saturating_sub(n);
        self.ring.iter().skip(skip).cloned().collect()
    }

    /// Tail with the default display window.
    pub fn tail(&self) -> Vec<String> {
        self.get_tail(DEFAULT_TAIL_WINDOW)
    }

    /// Flush and release the file handle. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for TaskLogBuffer {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_file_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subdir").join("test.log");
        let mut buffer = TaskLogBuffer::new(&path);

        assert!(!path.exists());
        buffer.write("First line");
        buffer.close();
        assert!(path.exists());
    }

    #[test]
    fn test_writes_lines_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let mut buffer = TaskLogBuffer::new(&path);
        buffer.write("Line 1");
        buffer.write("Line 2");
        buffer.close();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Line 1"));
        assert!(content.contains("Line 2"));
    }

    #[test]
    fn test_write_includes_timestamp_write_raw_does_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let mut buffer = TaskLogBuffer::new(&path);
        buffer.write("Stamped");
        buffer.write_raw("Raw line");
        buffer.close();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("[20"));
        assert_eq!(lines[1], "Raw line");
    }

    #[test]
    fn test_line_count_tracks_all_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut buffer = TaskLogBuffer::with_capacity(dir.path().join("t.log"), 5);
        assert_eq!(buffer.line_count(), 0);
        for i in 0..100 {
            buffer.write(&format!("Line {i}"));
        }
        assert_eq!(buffer.line_count(), 100);
    }

    #[test]
    fn test_get_tail_returns_last_n() {
        let dir = tempfile::tempdir().unwrap();
        let mut buffer = TaskLogBuffer::new(dir.path().join("t.log"));
        for i in 0..10 {
            buffer.write(&format!("Line {i}"));
        }
        assert_eq!(buffer.get_tail(3), vec!["Line 7", "Line 8", "Line 9"]);
    }

    #[test]
    fn test_get_tail_with_fewer_lines_returns_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut buffer = TaskLogBuffer::new(dir.path().join("t.log"));
        buffer.write("Line 1");
        buffer.write("Line 2");
        assert_eq!(buffer.get_tail(10), vec!["Line 1", "Line 2"]);
    }

    #[test]
    fn test_default_tail_window_is_15() {
        let dir = tempfile::tempdir().unwrap();
        let mut buffer = TaskLogBuffer::new(dir.path().join("t.log"));
        for i in 0..20 {
            buffer.write(&format!("Line {i}"));
        }
        let tail = buffer.tail();
        assert_eq!(tail.len(), 15);
        assert_eq!(tail[0], "Line 5");
        assert_eq!(tail[14], "Line 19");
    }

    #[test]
    fn test_ring_respects_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut buffer = TaskLogBuffer::with_capacity(dir.path().join("t.log"), 5);
        for i in 0..100 {
            buffer.write(&format!("Line {i}"));
        }
        let tail = buffer.get_tail(100);
        assert_eq!(tail.len(), 5);
        assert_eq!(tail, vec!["Line 95", "Line 96", "Line 97", "Line 98", "Line 99"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut buffer = TaskLogBuffer::new(dir.path().join("t.log"));
        buffer.write("Test");
        buffer.close();
        buffer.close();
        buffer.close();
        assert!(buffer.is_closed());
    }

    #[test]
    fn test_unwritable_path_degrades_gracefully() {
        let mut buffer = TaskLogBuffer::new("/proc/ingot-definitely-not-writable/t.log");
        buffer.write("Line");
        // Ring still works even when the file cannot be created.
        assert_eq!(buffer.get_tail(5), vec!["Line"]);
    }

    #[test]
    fn test_ring_only_buffer_has_no_file() {
        let mut buffer = TaskLogBuffer::ring_only(3);
        for i in 0..5 {
            buffer.write_raw(&format!("Line {i}"));
        }
        assert!(buffer.log_path().is_none());
        assert_eq!(buffer.get_tail(10), vec!["Line 2", "Line 3", "Line 4"]);
        assert_eq!(buffer.line_count(), 5);
    }
}
