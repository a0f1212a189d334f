//! # Task Run Dashboard
//!
//! Event-driven live view of a task run: a task table, a log tail for the
//! selected task, and a status bar. The dashboard owns no execution state:
//! it drains the [`EventBus`](crate::workflow::events::EventBus) queue on a
//! fixed cadence and projects events onto [`TaskRunRecord`]s.
//!
//! One mutex guards the whole model, including the spinner cache. Spinner
//! instances are created on `TaskStarted` and removed on `TaskFinished`;
//! render looks them up and falls back to a static glyph when absent,
//! never to a throwaway instance.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Frame;
use tracing::debug;

use crate::ui::keyboard::Key;
use crate::ui::log_buffer::TaskLogBuffer;
use crate::ui::spinner::Spinner;
use crate::workflow::events::{
    EventDrain, RunSummary, TaskEvent, TaskEventKind, TaskRunRecord, TaskRunStatus,
};

/// Refresh cadence: 10 Hz.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Log tail window sizes.
const TAIL_NORMAL: usize = 15;
const TAIL_VERBOSE: usize = 30;

/// Display ring capacity per task.
const DISPLAY_RING_LINES: usize = 100;

// ============================================================================
// MODEL
// ============================================================================

struct DashboardState {
    records: Vec<TaskRunRecord>,
    selected_index: usize,
    follow_mode: bool,
    verbose_mode: bool,
    parallel_mode: bool,
    running: BTreeSet<usize>,
    spinners: HashMap<usize, Spinner>,
    summary: Option<RunSummary>,
}

pub struct TaskDashboard {
    state: Mutex<DashboardState>,
    quit_requested: AtomicBool,
}

impl TaskDashboard {
    pub fn new(task_names: &[String], parallel_mode: bool) -> Self {
        let records = task_names
            .iter()
            .enumerate()
            .map(|(index, name)| TaskRunRecord::new(index, name))
            .collect();
        Self {
            state: Mutex::new(DashboardState {
                records,
                selected_index: 0,
                follow_mode: true,
                verbose_mode: false,
                parallel_mode,
                running: BTreeSet::new(),
                spinners: HashMap::new(),
                summary: None,
            }),
            quit_requested: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Event application
    // ------------------------------------------------------------------

    /// Drain the queue fully and apply every event, under the model mutex.
    pub fn drain_events(&self, drain: &EventDrain) {
        let events = drain.drain();
        if events.is_empty() {
            return;
        }
        let mut state = self.state.lock().expect("tui mutex poisoned");
        for event in events {
            Self::apply(&mut state, event);
        }
    }

    /// Apply one event; exposed for tests.
    pub fn apply_event(&self, event: TaskEvent) {
        let mut state = self.state.lock().expect("tui mutex poisoned");
        Self::apply(&mut state, event);
    }

    fn apply(state: &mut DashboardState, event: TaskEvent) {
        let timestamp = event.timestamp;
        match event.kind {
            TaskEventKind::RunStarted { .. } => {}
            TaskEventKind::TaskStarted { index, .. } => {
                let Some(record) = state.records.get_mut(index) else { return };
                record.status = TaskRunStatus::Running;
                record.start_time = Some(timestamp);
                record.log_buffer = Some(TaskLogBuffer::ring_only(DISPLAY_RING_LINES));
                // Same instance across renders; phase lives here.
                state.spinners.insert(index, Spinner::new());
                state.running.insert(index);

                // Follow mode: pull selection onto a running task if the
                // currently selected one is not running.
                if state.follow_mode && !state.running.contains(&state.selected_index) {
                    state.selected_index = index;
                }
            }
            TaskEventKind::TaskOutput { index, line } => {
                if let Some(record) = state.records.get_mut(index) {
                    if let Some(buffer) = &mut record.log_buffer {
                        buffer.write_raw(&line);
                    }
                }
            }
            TaskEventKind::TaskFinished { index, outcome, error, .. } => {
                let Some(record) = state.records.get_mut(index) else { return };
                record.status = outcome.into();
                record.end_time = Some(timestamp);
                record.error = error;
                // Dispose exactly once: spinner out of the cache, buffer
                // closed (close never panics; failures are logged inside).
                state.spinners.remove(&index);
                if let Some(buffer) = &mut record.log_buffer {
                    buffer.close();
                }
                state.running.remove(&index);
                debug!(index, "task finished, spinner and buffer disposed");

                if state.follow_mode && state.selected_index == index {
                    Self::auto_switch(state, index);
                }
            }
            TaskEventKind::RunFinished { summary } => {
                state.summary = Some(summary);
            }
        }
    }

    /// Follow-mode auto-switch, parallel mode only: the smallest running
    /// index strictly greater than the finished one, wrapping to the
    /// smallest running index. Selection is untouched when nothing runs.
    fn auto_switch(state: &mut DashboardState, finished_index: usize) {
        if !state.parallel_mode || state.running.is_empty() {
            return;
        }
        let next = state
            .running
            .iter()
            .find(|&&i| i > finished_index)
            .or_else(|| state.running.iter().next());
        if let Some(&next) = next {
            state.selected_index = next;
        }
    }

    // ------------------------------------------------------------------
    // Keyboard
    // ------------------------------------------------------------------

    pub fn handle_key(&self, key: Key) {
        let mut state = self.state.lock().expect("tui mutex poisoned");
        match key {
            Key::Up | Key::Char('k') => {
                state.selected_index = state.selected_index.saturating_sub(1);
                state.follow_mode = false;
            }
            Key::Down | Key::Char('j') => {
                let max = state.records.len().saturating_sub(1);
                state.selected_index = (state.selected_index + 1).min(max);
                state.follow_mode = false;
            }
            Key::Enter => {
                if state.running.len() > 1 {
                    state.follow_mode = true;
                }
            }
            Key::Char('f') => state.follow_mode = !state.follow_mode,
            Key::Char('v') => state.verbose_mode = !state.verbose_mode,
            Key::Char('q') | Key::Escape => {
                self.quit_requested.store(true, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    pub fn check_quit_requested(&self) -> bool {
        self.quit_requested.load(Ordering::SeqCst)
    }

    pub fn clear_quit_request(&self) {
        self.quit_requested.store(false, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Introspection (tests and the owning loop)
    // ------------------------------------------------------------------

    pub fn selected_index(&self) -> usize {
        self.state.lock().expect("tui mutex poisoned").selected_index
    }

    pub fn follow_mode(&self) -> bool {
        self.state.lock().expect("tui mutex poisoned").follow_mode
    }

    pub fn verbose_mode(&self) -> bool {
        self.state.lock().expect("tui mutex poisoned").verbose_mode
    }

    pub fn running_count(&self) -> usize {
        self.state.lock().expect("tui mutex poisoned").running.len()
    }

    pub fn has_spinner(&self, index: usize) -> bool {
        self.state.lock().expect("tui mutex poisoned").spinners.contains_key(&index)
    }

    pub fn record_status(&self, index: usize) -> Option<TaskRunStatus> {
        self.state.lock().expect("tui mutex poisoned").records.get(index).map(|r| r.status)
    }

    pub fn summary(&self) -> Option<RunSummary> {
        self.state.lock().expect("tui mutex poisoned").summary
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    pub fn render(&self, frame: &mut Frame<'_>) {
        let state = self.state.lock().expect("tui mutex poisoned");
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(6),
                Constraint::Length(if state.verbose_mode {
                    TAIL_VERBOSE as u16 + 2
                } else {
                    TAIL_NORMAL as u16 + 2
                }),
                Constraint::Length(1),
            ])
            .split(frame.area());

        Self::render_task_table(&state, frame, chunks[0]);
        Self::render_log_tail(&state, frame, chunks[1]);
        Self::render_status_bar(&state, frame, chunks[2]);
    }

    fn status_style(status: TaskRunStatus) -> Style {
        match status {
            TaskRunStatus::Pending => Style::default().fg(Color::DarkGray),
            TaskRunStatus::Running => {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            }
            TaskRunStatus::Success => {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            }
            TaskRunStatus::Failed => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            TaskRunStatus::Skipped => Style::default().fg(Color::Yellow),
        }
    }

    fn render_task_table(state: &DashboardState, frame: &mut Frame<'_>, area: Rect) {
        let title = if state.parallel_mode {
            format!(" Tasks ({} running) ", state.running.len())
        } else {
            " Tasks ".to_string()
        };

        let rows: Vec<Row> = state
            .records
            .iter()
            .map(|record| {
                // The cached spinner keeps its animation phase between
                // frames. A Running task missing its spinner (non-TTY
                // render paths) gets the static glyph instead.
                let status_cell = if record.status == TaskRunStatus::Running {
                    state
                        .spinners
                        .get(&record.index)
                        .map(|s| s.frame())
                        .unwrap_or_else(|| record.status.icon())
                } else {
                    record.status.icon()
                };
                let selected = record.index == state.selected_index;
                let name_style = if selected {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    Cell::from(status_cell).style(Self::status_style(record.status)),
                    Cell::from(record.name.clone()).style(name_style),
                    Cell::from(record.format_duration()),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            [Constraint::Length(2), Constraint::Min(20), Constraint::Length(10)],
        )
        .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(table, area);
    }

    fn render_log_tail(state: &DashboardState, frame: &mut Frame<'_>, area: Rect) {
        let window = if state.verbose_mode { TAIL_VERBOSE } else { TAIL_NORMAL };
        let selected = state.records.get(state.selected_index);
        let lines: Vec<Line> = selected
            .and_then(|record| record.log_buffer.as_ref())
            .map(|buffer| buffer.get_tail(window))
            .unwrap_or_default()
            .into_iter()
            .map(Line::from)
            .collect();

        let title = selected
            .map(|record| format!(" Log: {} ", record.name))
            .unwrap_or_else(|| " Log ".to_string());
        let paragraph =
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(paragraph, area);
    }

    fn render_status_bar(state: &DashboardState, frame: &mut Frame<'_>, area: Rect) {
        let activity = if let Some(summary) = &state.summary {
            format!(
                "done: {} ok, {} failed, {} skipped",
                summary.success, summary.failed, summary.skipped
            )
        } else if state.running.is_empty() {
            "idle".to_string()
        } else if state.parallel_mode {
            format!("running {} tasks", state.running.len())
        } else {
            "running".to_string()
        };
        let follow = if state.follow_mode { "follow" } else { "manual" };
        let bar = Line::from(vec![
            Span::styled(format!(" {activity} "), Style::default().fg(Color::Cyan)),
            Span::raw(format!("[{follow}]  ")),
            Span::styled(
                "↑/k ↓/j select  Enter follow  f follow  v verbose  q quit",
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        frame.render_widget(Paragraph::new(bar), area);
    }

    // ------------------------------------------------------------------
    // Owning loop
    // ------------------------------------------------------------------

    /// Drive the dashboard until the run finishes or the user quits.
    ///
    /// Enters the alternate screen and raw mode for the duration; both are
    /// restored on every exit path. Returns the run summary when the run
    /// completed, `None` when the user quit first.
    pub fn run_loop(&self, drain: &EventDrain) -> io::Result<Option<RunSummary>> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        let result = self.run_loop_inner(drain);
        let _ = io::stdout().execute(LeaveAlternateScreen);
        let _ = disable_raw_mode();
        result
    }

    fn run_loop_inner(&self, drain: &EventDrain) -> io::Result<Option<RunSummary>> {
        let backend = ratatui::backend::CrosstermBackend::new(io::stdout());
        let mut terminal = ratatui::Terminal::new(backend)?;

        loop {
            self.drain_events(drain);
            terminal.draw(|frame| self.render(frame))?;

            // The quit flag is consulted between ticks; it does not
            // interrupt an ongoing render.
            if self.check_quit_requested() {
                return Ok(None);
            }
            if let Some(summary) = self.summary() {
                // One final drain so late output is not lost from the
                // transcript view.
                self.drain_events(drain);
                terminal.draw(|frame| self.render(frame))?;
                return Ok(Some(summary));
            }

            let deadline = std::time::Instant::now() + TICK_INTERVAL;
            while std::time::Instant::now() < deadline {
                match crate::ui::keyboard::poll_key_nonblocking() {
                    Some(key) => self.handle_key(key),
                    None => std::thread::sleep(Duration::from_millis(10)),
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
