//! # Task Lifecycle Events
//!
//! Immutable events flowing from scheduler workers to the TUI consumer over
//! the [`EventBus`], plus the per-task UI projection ([`TaskRunRecord`]) and
//! the naming helpers for run directories and log files.
//!
//! Events from a single task arrive in issue order; events from different
//! tasks interleave freely. The bus neither coalesces nor reorders.

use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ui::log_buffer::TaskLogBuffer;

/// Bound on queued events between TUI drains.
const EVENT_QUEUE_CAPACITY: usize = 4096;

/// Maximum slug length in log filenames.
const SLUG_MAX_LEN: usize = 30;

// ============================================================================
// EVENTS
// ============================================================================

/// Monotonic-enough wall-clock timestamp in seconds.
pub fn now_ts() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

/// Outcome of a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
    Skipped,
}

/// One task-lifecycle event. Events are immutable once posted.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub timestamp: f64,
    pub kind: TaskEventKind,
}

#[derive(Debug, Clone)]
pub enum TaskEventKind {
    RunStarted { total: usize },
    TaskStarted { index: usize, name: String },
    TaskOutput { index: usize, line: String },
    TaskFinished { index: usize, outcome: TaskOutcome, duration: f64, error: Option<String> },
    RunFinished { summary: RunSummary },
}

impl TaskEvent {
    fn new(kind: TaskEventKind) -> Self {
        Self { timestamp: now_ts(), kind }
    }

    pub fn run_started(total: usize) -> Self {
        Self::new(TaskEventKind::RunStarted { total })
    }

    pub fn task_started(index: usize, name: impl Into<String>) -> Self {
        Self::new(TaskEventKind::TaskStarted { index, name: name.into() })
    }

    pub fn task_output(index: usize, line: impl Into<String>) -> Self {
        Self::new(TaskEventKind::TaskOutput { index, line: line.into() })
    }

    pub fn task_finished(
        index: usize,
        outcome: TaskOutcome,
        duration: f64,
        error: Option<String>,
    ) -> Self {
        Self::new(TaskEventKind::TaskFinished { index, outcome, duration, error })
    }

    pub fn run_finished(summary: RunSummary) -> Self {
        Self::new(TaskEventKind::RunFinished { summary })
    }
}

/// Final counts for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.success == self.total
    }
}

// ============================================================================
// EVENT BUS
// ============================================================================

/// Multi-producer side of the event queue. Cheap to clone into workers.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::SyncSender<TaskEvent>,
}

/// Single-consumer side, drained by the TUI tick.
pub struct EventDrain {
    rx: mpsc::Receiver<TaskEvent>,
}

/// Create a connected bus/drain pair.
pub fn event_channel() -> (EventBus, EventDrain) {
    let (tx, rx) = mpsc::sync_channel(EVENT_QUEUE_CAPACITY);
    (EventBus { tx }, EventDrain { rx })
}

impl EventBus {
    /// Post an event. Blocks only if the consumer has fallen a full queue
    /// behind.
    pub fn post(&self, event: TaskEvent) {
        let _ = self.tx.send(event);
    }
}

impl EventDrain {
    /// Take every queued event, in order.
    pub fn drain(&self) -> Vec<TaskEvent> {
        self.rx.try_iter().collect()
    }
}

// ============================================================================
// TASK RUN RECORD (UI PROJECTION)
// ============================================================================

/// Display status of a task in the run dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl TaskRunStatus {
    /// Static status glyph; Running tasks normally render a live spinner
    /// instead.
    pub fn icon(&self) -> &'static str {
        match self {
            TaskRunStatus::Pending => "○",
            TaskRunStatus::Running => "⟳",
            TaskRunStatus::Success => "✓",
            TaskRunStatus::Failed => "✗",
            TaskRunStatus::Skipped => "⊘",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskRunStatus::Success | TaskRunStatus::Failed | TaskRunStatus::Skipped)
    }
}

impl From<TaskOutcome> for TaskRunStatus {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Success => TaskRunStatus::Success,
            TaskOutcome::Failed => TaskRunStatus::Failed,
            TaskOutcome::Skipped => TaskRunStatus::Skipped,
        }
    }
}

/// Per-task projection mutated only by the TUI event loop.
pub struct TaskRunRecord {
    pub index: usize,
    pub name: String,
    pub status: TaskRunStatus,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub error: Option<String>,
    pub log_buffer: Option<TaskLogBuffer>,
}

impl TaskRunRecord {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            status: TaskRunStatus::Pending,
            start_time: None,
            end_time: None,
            error: None,
            log_buffer: None,
        }
    }

    /// Seconds since start: live for running tasks, final for finished ones,
    /// zero before start.
    pub fn elapsed_time(&self) -> f64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end - start,
            (Some(start), None) => (now_ts() - start).max(0.0),
            _ => 0.0,
        }
    }

    /// Final duration, only once the task has ended.
    pub fn duration(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// `"1.5s"` under a minute, `"1m 30s"` beyond.
    pub fn format_duration(&self) -> String {
        let Some(duration) = self.duration() else { return String::new() };
        if duration < 60.0 {
            format!("{duration:.1}s")
        } else {
            let minutes = (duration / 60.0) as u64;
            let seconds = (duration % 60.0) as u64;
            format!("{minutes}m {seconds}s")
        }
    }
}

// ============================================================================
// NAMING HELPERS
// ============================================================================

/// Slug a task name for filesystem use: lowercase, runs of non-alphanumerics
/// collapsed to single underscores, truncated at a word boundary.
pub fn slugify_task_name(name: &str, max_length: usize) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_underscore = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            slug.push('_');
            last_underscore = true;
        }
    }
    let slug = slug.trim_matches('_').to_string();
    if slug.len() <= max_length {
        return slug;
    }
    match slug[..max_length].rfind('_') {
        Some(idx) if idx > 0 => slug[..idx].to_string(),
        _ => slug[..max_length].to_string(),
    }
}

/// Per-task log filename: `task_NNN_<slug>.log`, 1-based zero-padded index.
pub fn format_log_filename(index: usize, name: &str) -> String {
    format!("task_{:03}_{}.log", index + 1, slugify_task_name(name, SLUG_MAX_LEN))
}

/// Bracketed millisecond timestamp for log lines.
pub fn format_timestamp() -> String {
    chrono::Local::now().format("[%Y-%m-%d %H:%M:%S%.3f]").to_string()
}

/// Run directory name: `YYYYMMDD_HHMMSS`.
pub fn format_run_directory() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_preserves_order() {
        let (bus, drain) = event_channel();
        bus.post(TaskEvent::run_started(2));
        bus.post(TaskEvent::task_started(0, "A"));
        bus.post(TaskEvent::task_output(0, "line"));

        let events = drain.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0].kind, TaskEventKind::RunStarted { total: 2 }));
        assert!(matches!(events[1].kind, TaskEventKind::TaskStarted { index: 0, .. }));
        assert!(matches!(events[2].kind, TaskEventKind::TaskOutput { .. }));
    }

    #[test]
    fn test_drain_empties_queue() {
        let (bus, drain) = event_channel();
        bus.post(TaskEvent::run_started(1));
        assert_eq!(drain.drain().len(), 1);
        assert!(drain.drain().is_empty());
    }

    #[test]
    fn test_bus_clones_share_queue() {
        let (bus, drain) = event_channel();
        let clone = bus.clone();
        bus.post(TaskEvent::task_started(0, "A"));
        clone.post(TaskEvent::task_started(1, "B"));
        assert_eq!(drain.drain().len(), 2);
    }

    #[test]
    fn test_status_icons() {
        assert_eq!(TaskRunStatus::Pending.icon(), "○");
        assert_eq!(TaskRunStatus::Running.icon(), "⟳");
        assert_eq!(TaskRunStatus::Success.icon(), "✓");
        assert_eq!(TaskRunStatus::Failed.icon(), "✗");
        assert_eq!(TaskRunStatus::Skipped.icon(), "⊘");
    }

    #[test]
    fn test_record_elapsed_and_duration() {
        let mut record = TaskRunRecord::new(0, "Test");
        assert_eq!(record.elapsed_time(), 0.0);
        assert!(record.duration().is_none());

        record.start_time = Some(100.0);
        record.end_time = Some(110.0);
        assert_eq!(record.duration(), Some(10.0));
        assert_eq!(record.elapsed_time(), 10.0);
    }

    #[test]
    fn test_format_duration_seconds_and_minutes() {
        let mut record = TaskRunRecord::new(0, "Test");
        record.start_time = Some(100.0);
        record.end_time = Some(101.5);
        assert_eq!(record.format_duration(), "1.5s");

        record.end_time = Some(190.0);
        assert_eq!(record.format_duration(), "1m 30s");
    }

    #[test]
    fn test_slugify_basics() {
        assert_eq!(slugify_task_name("Implement authentication", 64), "implement_authentication");
        assert_eq!(slugify_task_name("Add user auth!", 64), "add_user_auth");
        assert_eq!(slugify_task_name("foo---bar___baz", 64), "foo_bar_baz");
        assert_eq!(slugify_task_name("!!!test!!!", 64), "test");
    }

    #[test]
    fn test_slugify_truncates_at_word_boundary() {
        let slug = slugify_task_name("implement user authentication", 20);
        assert_eq!(slug, "implement_user");
        assert!(slugify_task_name("a very long task name here", 20).len() <= 20);
    }

    #[test]
    fn test_log_filename_padding() {
        assert_eq!(format_log_filename(0, "Implement auth"), "task_001_implement_auth.log");
        assert_eq!(format_log_filename(9, "test"), "task_010_test.log");
        assert_eq!(format_log_filename(99, "test"), "task_100_test.log");
    }

    #[test]
    fn test_timestamp_format_shape() {
        let ts = format_timestamp();
        assert!(ts.starts_with('['));
        assert!(ts.ends_with(']'));
        assert_eq!(ts.len(), 25);
        assert_eq!(&ts[5..6], "-");
        assert_eq!(&ts[21..22], ".");
    }

    #[test]
    fn test_run_directory_shape() {
        let dir = format_run_directory();
        assert_eq!(dir.len(), 15);
        assert_eq!(&dir[8..9], "_");
        assert!(dir.replace('_', "").bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_run_summary_all_succeeded() {
        let summary = RunSummary { total: 3, success: 3, failed: 0, skipped: 0 };
        assert!(summary.all_succeeded());
        let partial = RunSummary { total: 3, success: 2, failed: 1, skipped: 0 };
        assert!(!partial.all_succeeded());
    }
}
