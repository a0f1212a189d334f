//! # Workflow Runner
//!
//! The three-phase state machine: plan → tasklist → execute, with
//! dirty-worktree handling on entry and branch-state reporting on every
//! failure path.
//!
//! ```text
//!           ┌──► Step1 ──► Step2 ──► Step3 ──► Done
//! Start ───►┤                                    │
//!           └──► Cleanup ◄── any failure ◄───────┘
//! ```
//!
//! Cleanup never auto-reverts: it reports what was created (checkpoint
//! commits, branch) and leaves remediation to the user.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use colored::Colorize;
use tracing::{info, warn};

use crate::backend::AiBackend;
use crate::git;
use crate::runtime::run_async;
use crate::ui::tui::TaskDashboard;
use crate::workflow::events::{event_channel, format_run_directory, RunSummary, TaskEventKind};
use crate::workflow::execute::{SchedulerConfig, TaskScheduler, TaskVerifier};
use crate::workflow::state::WorkflowState;
use crate::workflow::tasklist::{self, WorkflowPrompter};
use crate::workflow::tasks::{parse_task_list, TaskCategory, TaskStatus};
use crate::workflow::{plan, WorkflowError};

// ============================================================================
// OPTIONS
// ============================================================================

/// Knobs for one workflow run, resolved from config and CLI flags.
#[derive(Clone)]
pub struct WorkflowOptions {
    pub planning_model: String,
    pub implementation_model: String,
    pub skip_clarification: bool,
    pub squash_at_end: bool,
    pub fail_fast: bool,
    /// `None` = auto-detect from the terminal.
    pub use_tui: Option<bool>,
    pub parallel_enabled: bool,
    pub max_parallel: usize,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
    /// Directory for plan/tasklist artifacts; defaults to `specs/`.
    pub specs_dir: Option<PathBuf>,
    /// Parent directory for per-run log directories.
    pub runs_dir: Option<PathBuf>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            planning_model: String::new(),
            implementation_model: String::new(),
            skip_clarification: false,
            squash_at_end: true,
            fail_fast: false,
            use_tui: None,
            parallel_enabled: true,
            max_parallel: 3,
            max_retries: 3,
            retry_delay_seconds: 1.0,
            specs_dir: None,
            runs_dir: None,
        }
    }
}

// ============================================================================
// RUNNER
// ============================================================================

pub struct WorkflowRunner {
    backend: Arc<dyn AiBackend>,
    prompter: Arc<dyn WorkflowPrompter>,
    verifier: Option<Arc<dyn TaskVerifier>>,
    options: WorkflowOptions,
}

impl WorkflowRunner {
    pub fn new(
        backend: Arc<dyn AiBackend>,
        prompter: Arc<dyn WorkflowPrompter>,
        options: WorkflowOptions,
    ) -> Self {
        Self { backend, prompter, verifier: None, options }
    }

    /// Inject a project-specific post-task verifier.
    pub fn with_verifier(mut self, verifier: Arc<dyn TaskVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Run the full workflow for a ticket.
    pub fn run(&self, ticket: crate::ticket::GenericTicket) -> Result<bool, WorkflowError> {
        let mut state = WorkflowState::new(ticket);
        self.apply_options(&mut state);
        self.run_with_state(&mut state)
    }

    /// Run with caller-prepared state (resume, tests).
    pub fn run_with_state(&self, state: &mut WorkflowState) -> Result<bool, WorkflowError> {
        println!("{}", format!("Starting Workflow: {}", state.ticket.id).bold());
        let original_branch = git::current_branch();

        let result = self.run_inner(state);
        match &result {
            Ok(true) => self.show_completion(state),
            _ => self.report_cleanup(state, &original_branch),
        }
        result
    }

    fn apply_options(&self, state: &mut WorkflowState) {
        state.planning_model = self.options.planning_model.clone();
        state.implementation_model = self.options.implementation_model.clone();
        state.skip_clarification = self.options.skip_clarification;
        state.squash_at_end = self.options.squash_at_end;
        state.fail_fast = self.options.fail_fast;
        state.max_retries = self.options.max_retries;
        if let Some(specs_dir) = &self.options.specs_dir {
            state.plan_file = Some(specs_dir.join(state.plan_filename()));
            state.tasklist_file = Some(specs_dir.join(state.tasklist_filename()));
        }
    }

    fn run_inner(&self, state: &mut WorkflowState) -> Result<bool, WorkflowError> {
        // Dirty worktree gate.
        if git::is_dirty() {
            let action = self.prompter.dirty_state_action();
            if !git::handle_dirty_state("starting workflow", action) {
                println!("{}", "Aborted: resolve the working tree and retry.".yellow());
                return Ok(false);
            }
        }

        if !state.ticket.title.is_empty() {
            println!("{} {}", "Ticket:".bold(), state.ticket.title);
        }

        // Optional free-form context.
        if !state.skip_clarification
            && self
                .prompter
                .confirm("Would you like to add additional context about this ticket?", false)
        {
            let context = self.prompter.input_multiline("Enter additional context:");
            state.user_context = context.trim().to_string();
            if !state.user_context.is_empty() {
                println!("{}", "Additional context saved".green());
            }
        }

        if !self.setup_branch(state) {
            return Ok(false);
        }
        state.base_commit = git::current_commit();
        info!(base_commit = state.base_commit, "workflow base recorded");

        if state.current_step <= 1 {
            if !plan::step_1_create_plan(state, self.backend.as_ref())? {
                return Ok(false);
            }
        }
        if state.current_step <= 2 {
            if !tasklist::step_2_create_tasklist(
                state,
                self.backend.as_ref(),
                self.prompter.as_ref(),
            )? {
                return Ok(false);
            }
        }
        if state.current_step <= 3 {
            if !self.phase_3_execute(state)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Feature branch: `<ticket-id>-<branch-summary>`, or a bare
    /// `feature/<ticket-id>` when no summary is available.
    fn setup_branch(&self, state: &mut WorkflowState) -> bool {
        let ticket = &state.ticket;
        let branch_name = if ticket.branch_summary.is_empty() {
            format!("feature/{}", ticket.id.to_ascii_lowercase())
        } else {
            format!("{}-{}", ticket.id.to_ascii_lowercase(), ticket.branch_summary)
        };
        let current = git::current_branch();

        if current == branch_name {
            println!("Already on branch: {branch_name}");
            state.branch_name = branch_name;
            return true;
        }

        if self.prompter.confirm(&format!("Create branch '{branch_name}'?"), true) {
            if git::create_branch(&branch_name) {
                println!("{} Created and switched to branch: {branch_name}", "✓".green());
                state.branch_name = branch_name;
                true
            } else {
                println!("{} Failed to create branch: {branch_name}", "✗".red());
                false
            }
        } else {
            // Stay where we are.
            println!("Staying on branch: {current}");
            state.branch_name = current;
            true
        }
    }

    fn phase_3_execute(&self, state: &mut WorkflowState) -> Result<bool, WorkflowError> {
        println!("{}", "Step 3: Execute Implementation".bold());

        let tasklist_path = state.get_tasklist_path();
        let content = std::fs::read_to_string(&tasklist_path)?;
        let all_tasks = parse_task_list(&content);

        // Already-checked tasks count as done without re-execution.
        for task in all_tasks.iter().filter(|t| t.status == TaskStatus::Complete) {
            state.mark_task_complete(&task.name);
        }
        let pending: Vec<_> =
            all_tasks.into_iter().filter(|t| t.status == TaskStatus::Pending).collect();
        if pending.is_empty() {
            println!("All tasks already complete.");
            return Ok(true);
        }

        let run_dir = self
            .options
            .runs_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(format_run_directory());
        let parallel_mode = self.options.parallel_enabled
            && pending.iter().any(|t| t.category == Some(TaskCategory::Independent));

        let config = SchedulerConfig {
            max_parallel: self.options.max_parallel,
            fail_fast: state.fail_fast,
            max_retries: state.max_retries,
            retry_delay_seconds: self.options.retry_delay_seconds,
            run_dir,
        };

        let (bus, drain) = event_channel();
        let shared_state = Arc::new(Mutex::new(state.clone()));
        let mut scheduler =
            TaskScheduler::new(Arc::clone(&self.backend), bus, Arc::clone(&shared_state), config);
        if let Some(verifier) = &self.verifier {
            scheduler = scheduler.with_verifier(Arc::clone(verifier));
        }

        let use_tui = self.options.use_tui.unwrap_or_else(|| std::io::stdout().is_terminal());
        let summary = if use_tui {
            let names: Vec<String> = pending.iter().map(|t| t.name.clone()).collect();
            let dashboard = Arc::new(TaskDashboard::new(&names, parallel_mode));

            // Scheduler runs on its own runtime thread; the dashboard owns
            // this thread until the run finishes or the user quits.
            let worker = std::thread::spawn(move || run_async(scheduler.run(pending)));
            let loop_result = dashboard.run_loop(&drain);
            let summary = match worker.join() {
                Ok(Ok(summary)) => summary,
                Ok(Err(e)) => {
                    warn!(error = %e, "scheduler bridge failed");
                    RunSummary::default()
                }
                Err(_) => {
                    warn!("scheduler thread panicked");
                    RunSummary::default()
                }
            };
            if let Ok(None) = loop_result {
                println!("{}", "Dashboard closed; run completed in background.".yellow());
            }
            summary
        } else {
            let summary = run_async(scheduler.run(pending))
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            // Plain-console rendition of the event stream.
            for event in drain.drain() {
                if let TaskEventKind::TaskFinished { index, outcome, .. } = event.kind {
                    println!("  task {:>3}: {:?}", index + 1, outcome);
                }
            }
            summary
        };

        // Fold scheduler-side mutations back into the caller's state.
        *state = shared_state.lock().expect("workflow state mutex poisoned").clone();

        println!(
            "{} {} ok, {} failed, {} skipped",
            "Run finished:".bold(),
            summary.success,
            summary.failed,
            summary.skipped
        );
        Ok(summary.failed == 0)
    }

    fn show_completion(&self, state: &WorkflowState) {
        println!();
        println!("{}", "Workflow Complete!".bold());
        println!("{} Ticket: {}", "✓".green(), state.ticket.id);
        println!("{} Branch: {}", "✓".green(), state.branch_name);
        println!("{} Tasks: {} completed", "✓".green(), state.completed_tasks.len());
        if let Some(plan) = &state.plan_file {
            println!("{} Plan: {}", "✓".green(), plan.display());
        }
        if let Some(tasklist) = &state.tasklist_file {
            println!("{} Tasks: {}", "✓".green(), tasklist.display());
        }
        println!();
        println!("Next steps:");
        println!("  1. Review the changes");
        println!("  2. Run the test suite");
        println!("  3. Create a pull request");
    }

    /// Failure-path report. No automatic reverts.
    fn report_cleanup(&self, state: &WorkflowState, original_branch: &str) {
        println!();
        println!("{}", "Workflow did not complete successfully.".yellow());
        if !state.checkpoint_commits.is_empty() {
            println!("Created {} checkpoint commits", state.checkpoint_commits.len());
        }
        if !state.branch_name.is_empty() && state.branch_name != original_branch {
            println!("On branch: {}", state.branch_name);
            println!("Original branch: {original_branch}");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
