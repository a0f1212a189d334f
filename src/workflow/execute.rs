//! # Task Scheduler
//!
//! Executes a parsed task list against the AI backend, honoring the
//! two-tier wave structure: Fundamental tasks run alone in order,
//! Independent tasks sharing a group run concurrently on a bounded worker
//! pool.
//!
//! Every task's failure is contained: workers convert all errors into a
//! `TaskFinished{failed}` event, and the run continues unless fail-fast is
//! enabled. Rate-limit hits retry with jittered exponential backoff without
//! consuming the error-retry budget.
//!
//! File-disjointness of parallel tasks is the tasklist author's
//! responsibility; the scheduler does not police it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::backend::AiBackend;
use crate::git;
use crate::ui::log_buffer::TaskLogBuffer;
use crate::workflow::events::{
    format_log_filename, now_ts, EventBus, RunSummary, TaskEvent, TaskOutcome,
};
use crate::workflow::state::{TaskMemory, WorkflowState};
use crate::workflow::tasks::{self, Task, TaskCategory};

// ============================================================================
// WAVES
// ============================================================================

/// A schedulable unit: one Fundamental task, or a group of Independent
/// tasks that run concurrently.
#[derive(Debug, Clone, PartialEq)]
pub enum Wave {
    Single(Task),
    Parallel(Vec<Task>),
}

impl Wave {
    pub fn tasks(&self) -> Vec<&Task> {
        match self {
            Wave::Single(task) => vec![task],
            Wave::Parallel(tasks) => tasks.iter().collect(),
        }
    }
}

/// Partition tasks into waves.
///
/// Waves appear in source order. Independent tasks join the wave of the
/// first task carrying their group tag; unannotated tasks are Fundamental.
/// A contiguous run of Fundamental tasks with explicit `order` annotations
/// is sorted by that order.
pub fn partition_waves(task_list: &[Task]) -> Vec<Wave> {
    let mut waves: Vec<Wave> = Vec::new();
    let mut consumed = vec![false; task_list.len()];
    // Pending run of explicitly-ordered fundamentals, flushed when broken.
    let mut ordered_run: Vec<Task> = Vec::new();

    fn flush_ordered(run: &mut Vec<Task>, waves: &mut Vec<Wave>) {
        run.sort_by_key(|t| t.order.unwrap_or(u32::MAX));
        for task in run.drain(..) {
            waves.push(Wave::Single(task));
        }
    }

    for (idx, task) in task_list.iter().enumerate() {
        if consumed[idx] {
            continue;
        }
        match (task.category, &task.group) {
            (Some(TaskCategory::Independent), Some(group)) => {
                flush_ordered(&mut ordered_run, &mut waves);
                let mut members = Vec::new();
                for (other_idx, other) in task_list.iter().enumerate().skip(idx) {
                    if consumed[other_idx] {
                        continue;
                    }
                    if other.category == Some(TaskCategory::Independent)
                        && other.group.as_ref() == Some(group)
                    {
                        consumed[other_idx] = true;
                        members.push(other.clone());
                    }
                }
                waves.push(Wave::Parallel(members));
            }
            (Some(TaskCategory::Independent), None) => {
                // Independent without a group tag degenerates to a
                // single-member parallel wave.
                flush_ordered(&mut ordered_run, &mut waves);
                consumed[idx] = true;
                waves.push(Wave::Parallel(vec![task.clone()]));
            }
            (Some(TaskCategory::Fundamental), _) if task.order.is_some() => {
                consumed[idx] = true;
                ordered_run.push(task.clone());
            }
            _ => {
                flush_ordered(&mut ordered_run, &mut waves);
                consumed[idx] = true;
                waves.push(Wave::Single(task.clone()));
            }
        }
    }
    flush_ordered(&mut ordered_run, &mut waves);
    waves
}

// ============================================================================
// ERROR ANALYSIS
// ============================================================================

/// Structured analysis of a failed task's output, fed back into retry
/// prompts.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorAnalysis {
    /// `syntax`, `compile`, `import`, `test_failure`, `runtime`, `unknown`.
    pub kind: &'static str,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    pub root_cause: String,
    pub suggested_fix: String,
}

impl ErrorAnalysis {
    pub fn to_markdown(&self) -> String {
        format!(
            "**Type:** {}\n**File:** {}\n**Line:** {}\n\n**Error Message:**\n{}\n\n\
             **Root Cause:**\n{}\n\n**Suggested Fix:**\n{}",
            self.kind,
            self.file.as_deref().unwrap_or("Unknown"),
            self.line.map(|l| l.to_string()).unwrap_or_else(|| "Unknown".to_string()),
            self.message,
            self.root_cause,
            self.suggested_fix,
        )
    }
}

static PY_TRACEBACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"File "([^"]+)", line (\d+)"#).expect("valid regex"));
static RUST_LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-->\s+([^\s:]+):(\d+):\d+").expect("valid regex"));

/// Classify error output with a small regex battery.
pub fn analyze_error_output(output: &str) -> ErrorAnalysis {
    let last_line = output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string();

    let (mut file, mut line) = (None, None);
    if let Some(captures) = PY_TRACEBACK_RE.captures_iter(output).last() {
        file = Some(captures[1].to_string());
        line = captures[2].parse().ok();
    } else if let Some(captures) = RUST_LOCATION_RE.captures(output) {
        file = Some(captures[1].to_string());
        line = captures[2].parse().ok();
    }

    let lower = output.to_ascii_lowercase();
    let (kind, root_cause, suggested_fix): (&'static str, &str, &str) =
        if lower.contains("syntaxerror") {
            ("syntax", "The code contains a syntax error", "Fix the syntax at the reported location")
        } else if lower.contains("modulenotfounderror")
            || lower.contains("importerror")
            || lower.contains("unresolved import")
            || lower.contains("cannot find crate")
        {
            ("import", "A dependency or module cannot be resolved", "Add the missing dependency or correct the import path")
        } else if lower.contains("error[e") || lower.contains("cannot borrow") || lower.contains("mismatched types") {
            ("compile", "The code does not compile", "Fix the compiler diagnostic at the reported location")
        } else if lower.contains("assertion")
            || lower.contains("test result: failed")
            || lower.contains("failed=")
            || (lower.contains("failed") && lower.contains("test"))
        {
            ("test_failure", "One or more tests fail", "Make the implementation satisfy the failing tests")
        } else if lower.contains("traceback") || lower.contains("panicked at") {
            ("runtime", "The code fails at runtime", "Handle the failing case at the reported location")
        } else {
            ("unknown", "The failure does not match a known pattern", "Review the full output and address the reported error")
        };

    ErrorAnalysis {
        kind,
        file,
        line,
        message: last_line,
        root_cause: root_cause.to_string(),
        suggested_fix: suggested_fix.to_string(),
    }
}

// ============================================================================
// VERIFICATION
// ============================================================================

/// Post-task verification hook, injectable per project.
pub trait TaskVerifier: Send + Sync {
    fn verify(&self, task: &Task, state: &WorkflowState) -> Result<(), String>;
}

/// Default verifier: always passes. Projects wire real checks here.
pub struct NoopVerifier;

impl TaskVerifier for NoopVerifier {
    fn verify(&self, _task: &Task, _state: &WorkflowState) -> Result<(), String> {
        Ok(())
    }
}

// ============================================================================
// MEMORY CAPTURE
// ============================================================================

/// Infer pattern names from modified paths and diff content.
fn identify_patterns(files: &[String], diff: &str) -> Vec<String> {
    let mut patterns = Vec::new();
    let has_ext = |ext: &str| files.iter().any(|f| f.ends_with(ext));

    if has_ext(".rs") {
        patterns.push("Rust implementation".to_string());
    }
    if has_ext(".py") {
        patterns.push("Python implementation".to_string());
    }
    if has_ext(".ts") || has_ext(".tsx") {
        patterns.push("TypeScript implementation".to_string());
    }
    if files.iter().any(|f| f.contains("test") || f.contains("spec")) {
        patterns.push("test suite structure".to_string());
    }
    if files.iter().any(|f| f.to_ascii_lowercase().contains("api")) {
        patterns.push("API endpoint implementation".to_string());
    }
    if diff.contains("async fn") || diff.contains("async def") || diff.contains("async function") {
        patterns.push("async pattern".to_string());
    }
    if diff.contains("#[derive(") || diff.contains("@dataclass") {
        patterns.push("derived data types".to_string());
    }
    patterns
}

fn capture_task_memory(task: &Task) -> TaskMemory {
    let files = git::modified_files();
    let diff = git::worktree_diff();
    let patterns = identify_patterns(&files, &diff);

    let mut test_commands = Vec::new();
    if task.name.to_ascii_lowercase().contains("test") {
        for file in files.iter().filter(|f| f.contains("test") || f.contains("spec")) {
            if file.ends_with(".py") {
                test_commands.push(format!("pytest {file}"));
            } else if file.ends_with(".rs") {
                test_commands.push("cargo test".to_string());
            }
        }
        test_commands.dedup();
    }

    TaskMemory {
        task_name: task.name.clone(),
        files_modified: files,
        patterns_used: patterns,
        key_decisions: Vec::new(),
        test_commands,
    }
}

/// Memories relevant to a task: at least two shared name keywords.
fn related_memories<'a>(task: &Task, memories: &'a [TaskMemory]) -> Vec<&'a TaskMemory> {
    let task_words: std::collections::BTreeSet<String> = task
        .name
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    memories
        .iter()
        .filter(|memory| {
            let memory_words: std::collections::BTreeSet<String> = memory
                .task_name
                .to_ascii_lowercase()
                .split(|c: char| !c.is_ascii_alphanumeric())
                .filter(|w| !w.is_empty())
                .map(str::to_string)
                .collect();
            task_words.intersection(&memory_words).count() >= 2
        })
        .collect()
}

/// Pattern context block for the task prompt; empty when nothing relates.
fn build_pattern_context(task: &Task, memories: &[TaskMemory]) -> String {
    let related = related_memories(task, memories);
    if related.is_empty() {
        return String::new();
    }
    let mut parts = vec![
        "## Patterns from Previous Tasks".to_string(),
        "The following patterns were established in earlier tasks:".to_string(),
        String::new(),
    ];
    for memory in related {
        parts.push(memory.to_markdown());
        parts.push(String::new());
    }
    parts.push("Follow these established patterns for consistency.".to_string());
    parts.join("\n")
}

// ============================================================================
// PROMPTS
// ============================================================================

fn build_task_prompt(task: &Task, plan_content: &str, pattern_context: &str) -> String {
    let mut prompt = format!(
        "Execute this task from the implementation plan:\n\n## Task: {}\n",
        task.name
    );
    if !plan_content.is_empty() {
        prompt.push_str(&format!("\n## Implementation Plan:\n{plan_content}\n"));
    }
    if !pattern_context.is_empty() {
        prompt.push_str(&format!("\n{pattern_context}\n"));
    }
    prompt.push_str(
        "\n## Instructions:\n\
         - Find and follow existing patterns in the codebase\n\
         - Make focused changes that accomplish the task completely\n\
         - Include tests with the implementation\n\
         - Leave the codebase in a working state\n\n\
         Complete this task fully. If you encounter blockers, explain what is preventing completion.\n",
    );
    prompt
}

fn build_retry_prompt(task: &Task, attempt: u32, max_retries: u32, analysis: &ErrorAnalysis) -> String {
    format!(
        "The previous attempt at this task failed (attempt {attempt} of {max_retries}).\n\n\
         ## Task: {}\n\n## Error Analysis:\n{}\n\n\
         Fix the reported problem and complete the task. Focus on the root cause rather than \
         suppressing the symptom.\n",
        task.name,
        analysis.to_markdown(),
    )
}

/// Rate-limit signal sniffing over streamed output.
fn is_rate_limited(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("429") || lower.contains("rate limit")
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Scheduler knobs.
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Worker bound for parallel waves; clamped to 1–5.
    pub max_parallel: usize,
    pub fail_fast: bool,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
    /// Directory for per-task log files.
    pub run_dir: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            fail_fast: false,
            max_retries: 3,
            retry_delay_seconds: 1.0,
            run_dir: PathBuf::from("."),
        }
    }
}

pub struct TaskScheduler {
    backend: Arc<dyn AiBackend>,
    bus: EventBus,
    state: Arc<Mutex<WorkflowState>>,
    verifier: Arc<dyn TaskVerifier>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    pub fn new(
        backend: Arc<dyn AiBackend>,
        bus: EventBus,
        state: Arc<Mutex<WorkflowState>>,
        config: SchedulerConfig,
    ) -> Self {
        Self { backend, bus, state, verifier: Arc::new(NoopVerifier), config }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TaskVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Run all tasks, returning the summary. Also emits `RunStarted` and
    /// `RunFinished` on the bus.
    pub async fn run(&self, task_list: Vec<Task>) -> RunSummary {
        let total = task_list.len();
        self.bus.post(TaskEvent::run_started(total));

        // Task index in the original list drives event identity.
        let indexed: Vec<(usize, Task)> = task_list.into_iter().enumerate().collect();
        let waves = partition_indexed(&indexed);

        let mut summary = RunSummary { total, ..Default::default() };
        let abort = Arc::new(AtomicBool::new(false));
        let mut aborted_at_wave: Option<usize> = None;

        for (wave_idx, wave) in waves.iter().enumerate() {
            if abort.load(Ordering::SeqCst) {
                aborted_at_wave = Some(wave_idx);
                break;
            }
            match wave {
                IndexedWave::Single(index, task) => {
                    let outcome = self.execute_task(*index, task).await;
                    tally(&mut summary, outcome);
                    if outcome == TaskOutcome::Failed && self.config.fail_fast {
                        abort.store(true, Ordering::SeqCst);
                    }
                }
                IndexedWave::Parallel(members) => {
                    let outcomes = self.execute_parallel_wave(members, &abort).await;
                    for outcome in outcomes {
                        tally(&mut summary, outcome);
                    }
                }
            }
        }

        // Mark everything not reached as skipped.
        if let Some(start) = aborted_at_wave {
            for wave in waves.iter().skip(start) {
                for (index, task) in wave.members() {
                    self.bus.post(TaskEvent::task_finished(
                        index,
                        TaskOutcome::Skipped,
                        0.0,
                        None,
                    ));
                    debug!(task = task.name, "skipped after abort");
                    summary.skipped += 1;
                }
            }
        }

        self.bus.post(TaskEvent::run_finished(summary));
        summary
    }

    async fn execute_parallel_wave(
        &self,
        members: &[(usize, Task)],
        abort: &Arc<AtomicBool>,
    ) -> Vec<TaskOutcome> {
        let permits = self.config.max_parallel.clamp(1, 5);
        let semaphore = Arc::new(Semaphore::new(permits));
        info!(tasks = members.len(), permits, "executing parallel wave");

        let mut handles = Vec::with_capacity(members.len());
        for (index, task) in members.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let abort = Arc::clone(abort);
            let this = self.clone_for_worker();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                // Fail-fast: tasks that never launched are skipped; tasks
                // already past this gate run to completion.
                if abort.load(Ordering::SeqCst) {
                    this.bus.post(TaskEvent::task_finished(
                        index,
                        TaskOutcome::Skipped,
                        0.0,
                        None,
                    ));
                    return TaskOutcome::Skipped;
                }
                let outcome = this.execute_task(index, &task).await;
                if outcome == TaskOutcome::Failed && this.config.fail_fast {
                    abort.store(true, Ordering::SeqCst);
                }
                outcome
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await.unwrap_or(TaskOutcome::Failed));
        }
        outcomes
    }

    fn clone_for_worker(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            bus: self.bus.clone(),
            state: Arc::clone(&self.state),
            verifier: Arc::clone(&self.verifier),
            config: self.config.clone(),
        }
    }

    /// Run one task to a terminal outcome, emitting its full event
    /// lifecycle. Never propagates an error.
    async fn execute_task(&self, index: usize, task: &Task) -> TaskOutcome {
        let started = now_ts();
        self.bus.post(TaskEvent::task_started(index, task.name.clone()));

        let log_path = self.config.run_dir.join(format_log_filename(index, &task.name));
        let buffer = Arc::new(Mutex::new(TaskLogBuffer::new(log_path)));

        let (plan_content, pattern_context, tasklist_path) = {
            let state = self.state.lock().expect("workflow state mutex poisoned");
            let plan = std::fs::read_to_string(state.get_plan_path()).unwrap_or_default();
            let context = build_pattern_context(task, &state.task_memories);
            (plan, context, state.get_tasklist_path())
        };

        let mut prompt = build_task_prompt(task, &plan_content, &pattern_context);
        let mut error_retries = 0u32;
        let mut rate_limit_retries = 0u32;

        let outcome = loop {
            let attempt_result = self.invoke_streaming(index, &prompt, &buffer).await;

            match attempt_result {
                Ok(AttemptOutcome::Success) => {
                    let verification = {
                        let state = self.state.lock().expect("workflow state mutex poisoned");
                        self.verifier.verify(task, &state)
                    };
                    match verification {
                        Ok(()) => {
                            self.finalize_success(task, &tasklist_path);
                            break TaskOutcome::Success;
                        }
                        Err(message) => {
                            warn!(task = task.name, "verification failed");
                            if error_retries >= self.config.max_retries {
                                self.post_failure(index, started, &message);
                                break TaskOutcome::Failed;
                            }
                            error_retries += 1;
                            let analysis = analyze_error_output(&message);
                            prompt = build_retry_prompt(
                                task,
                                error_retries,
                                self.config.max_retries,
                                &analysis,
                            );
                        }
                    }
                }
                Ok(AttemptOutcome::RateLimited) => {
                    // Rate-limit retries do not consume the error budget.
                    if rate_limit_retries >= self.config.max_retries {
                        self.post_failure(index, started, "rate limit retries exhausted");
                        break TaskOutcome::Failed;
                    }
                    let delay = jittered_backoff(
                        self.config.retry_delay_seconds,
                        rate_limit_retries,
                    );
                    warn!(
                        task = task.name,
                        delay_secs = delay.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    rate_limit_retries += 1;
                    tokio::time::sleep(delay).await;
                }
                Ok(AttemptOutcome::Failed { output }) => {
                    if error_retries >= self.config.max_retries {
                        let analysis = analyze_error_output(&output);
                        self.post_failure(index, started, &analysis.message);
                        break TaskOutcome::Failed;
                    }
                    error_retries += 1;
                    let analysis = analyze_error_output(&output);
                    debug!(task = task.name, kind = analysis.kind, "task attempt failed");
                    prompt =
                        build_retry_prompt(task, error_retries, self.config.max_retries, &analysis);
                }
                Err(message) => {
                    // Backend invocation itself broke; no retry prompt can
                    // help a missing CLI.
                    self.post_failure(index, started, &message);
                    break TaskOutcome::Failed;
                }
            }
        };

        if outcome == TaskOutcome::Success {
            self.bus.post(TaskEvent::task_finished(
                index,
                TaskOutcome::Success,
                now_ts() - started,
                None,
            ));
        }
        buffer.lock().expect("log buffer mutex poisoned").close();
        outcome
    }

    /// One streaming backend invocation, teeing lines to the log buffer and
    /// the event bus, sniffing for rate-limit signals.
    async fn invoke_streaming(
        &self,
        index: usize,
        prompt: &str,
        buffer: &Arc<Mutex<TaskLogBuffer>>,
    ) -> Result<AttemptOutcome, String> {
        let backend = Arc::clone(&self.backend);
        let bus = self.bus.clone();
        let buffer = Arc::clone(buffer);
        let prompt = prompt.to_string();

        tokio::task::spawn_blocking(move || {
            let mut rate_limited = false;
            let mut collected = String::new();
            let mut on_line = |line: &str| {
                if is_rate_limited(line) {
                    rate_limited = true;
                }
                collected.push_str(line);
                collected.push('\n');
                buffer.lock().expect("log buffer mutex poisoned").write(line);
                bus.post(TaskEvent::task_output(index, line));
            };
            match backend.run_streaming(&prompt, &mut on_line) {
                Ok(_) if rate_limited => Ok(AttemptOutcome::RateLimited),
                Ok(true) => Ok(AttemptOutcome::Success),
                Ok(false) => Ok(AttemptOutcome::Failed { output: collected }),
                Err(e) => Err(e.to_string()),
            }
        })
        .await
        .map_err(|e| format!("worker panicked: {e}"))?
    }

    /// Success bookkeeping: memory capture, tasklist checkbox, checkpoint
    /// commit, state updates.
    fn finalize_success(&self, task: &Task, tasklist_path: &std::path::Path) {
        let memory = capture_task_memory(task);
        if let Err(e) = tasks::mark_task_complete(tasklist_path, &task.name) {
            debug!(task = task.name, error = %e, "could not update tasklist file");
        }
        let checkpoint = git::commit_all(&format!("checkpoint: {}", task.name));

        let mut state = self.state.lock().expect("workflow state mutex poisoned");
        state.mark_task_complete(&task.name);
        if let Some(hash) = checkpoint {
            state.add_checkpoint(hash);
        }
        state.add_task_memory(memory);
    }

    fn post_failure(&self, index: usize, started: f64, message: &str) {
        self.bus.post(TaskEvent::task_finished(
            index,
            TaskOutcome::Failed,
            now_ts() - started,
            Some(message.to_string()),
        ));
    }
}

enum AttemptOutcome {
    Success,
    Failed { output: String },
    RateLimited,
}

fn tally(summary: &mut RunSummary, outcome: TaskOutcome) {
    match outcome {
        TaskOutcome::Success => summary.success += 1,
        TaskOutcome::Failed => summary.failed += 1,
        TaskOutcome::Skipped => summary.skipped += 1,
    }
}

fn jittered_backoff(base_seconds: f64, attempt: u32) -> Duration {
    let delay = base_seconds * 2f64.powi(attempt as i32);
    let jitter = rand::thread_rng().gen_range(0.0..=(delay * 0.1).max(f64::MIN_POSITIVE));
    Duration::from_secs_f64(delay + jitter)
}

// ----------------------------------------------------------------------
// Index-preserving wave plumbing
// ----------------------------------------------------------------------

enum IndexedWave {
    Single(usize, Task),
    Parallel(Vec<(usize, Task)>),
}

impl IndexedWave {
    fn members(&self) -> Vec<(usize, &Task)> {
        match self {
            IndexedWave::Single(index, task) => vec![(*index, task)],
            IndexedWave::Parallel(members) => {
                members.iter().map(|(index, task)| (*index, task)).collect()
            }
        }
    }
}

fn partition_indexed(indexed: &[(usize, Task)]) -> Vec<IndexedWave> {
    let tasks_only: Vec<Task> = indexed.iter().map(|(_, t)| t.clone()).collect();
    let waves = partition_waves(&tasks_only);
    // Each source entry is consumed once so duplicate task names keep
    // distinct event indices.
    let mut used = vec![false; indexed.len()];
    let mut find_index = |task: &Task| {
        let position = indexed
            .iter()
            .enumerate()
            .position(|(slot, (_, t))| !used[slot] && t == task)
            .expect("wave task originates from the input list");
        used[position] = true;
        indexed[position].0
    };
    waves
        .into_iter()
        .map(|wave| match wave {
            Wave::Single(task) => {
                let index = find_index(&task);
                IndexedWave::Single(index, task)
            }
            Wave::Parallel(members) => IndexedWave::Parallel(
                members
                    .into_iter()
                    .map(|task| {
                        let index = find_index(&task);
                        (index, task)
                    })
                    .collect(),
            ),
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
