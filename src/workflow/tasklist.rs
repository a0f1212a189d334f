//! # Phase 2: Task List with Approval
//!
//! Generates a checkbox task list from the plan and loops until the user
//! approves it. `Edit` re-displays the file without regenerating; only an
//! explicit `Regenerate` invokes the backend again.

use std::path::Path;

use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::backend::AiBackend;
use crate::workflow::state::WorkflowState;
use crate::workflow::tasks::parse_task_list;
use crate::workflow::WorkflowError;

static CHECKBOX_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)[-*]?\s*\[([xX ])\]\s*(.+)$").expect("valid regex"));

// ============================================================================
// PROMPTER
// ============================================================================

/// User decision over a generated task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskReviewChoice {
    Approve,
    Regenerate,
    Edit,
    Abort,
}

/// Interactive surface for the workflow phases; swapped for a scripted
/// implementation in tests.
pub trait WorkflowPrompter: Send + Sync {
    fn review_tasklist(&self) -> TaskReviewChoice;

    fn confirm(&self, prompt: &str, default: bool) -> bool;

    /// Free-form multiline input; empty string when declined.
    fn input_multiline(&self, prompt: &str) -> String;

    /// Open the file in the user's editor and block until they return.
    fn edit_file(&self, path: &Path);

    /// Resolution for a dirty worktree.
    fn dirty_state_action(&self) -> crate::git::DirtyStateAction;
}

/// Stdin/stdout prompter for real CLI runs.
pub struct CliPrompter {
    pub editor: Option<String>,
}

impl CliPrompter {
    fn read_line(&self) -> String {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        line.trim().to_string()
    }
}

impl WorkflowPrompter for CliPrompter {
    fn review_tasklist(&self) -> TaskReviewChoice {
        loop {
            println!("[a]pprove / [r]egenerate / [e]dit / a[b]ort?");
            match self.read_line().to_ascii_lowercase().as_str() {
                "a" | "approve" => return TaskReviewChoice::Approve,
                "r" | "regenerate" => return TaskReviewChoice::Regenerate,
                "e" | "edit" => return TaskReviewChoice::Edit,
                "b" | "abort" => return TaskReviewChoice::Abort,
                _ => println!("Unrecognised choice."),
            }
        }
    }

    fn confirm(&self, prompt: &str, default: bool) -> bool {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        println!("{prompt} {hint}");
        match self.read_line().to_ascii_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        }
    }

    fn input_multiline(&self, prompt: &str) -> String {
        println!("{prompt} (finish with an empty line)");
        let mut lines = Vec::new();
        loop {
            let line = self.read_line();
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    fn edit_file(&self, path: &Path) {
        let editor = self
            .editor
            .clone()
            .or_else(|| std::env::var("EDITOR").ok())
            .unwrap_or_else(|| "vi".to_string());
        println!("Opening {} in {editor}...", path.display());
        match std::process::Command::new(&editor).arg(path).status() {
            Ok(status) if status.success() => println!("{}", "Task list updated".green()),
            Ok(_) => println!("{}", "Editor exited without saving".yellow()),
            Err(e) => println!("{} {e}", "Could not launch editor:".red()),
        }
    }

    fn dirty_state_action(&self) -> crate::git::DirtyStateAction {
        loop {
            println!("Working tree has uncommitted changes: [s]tash / [c]ommit / [a]bort?");
            match self.read_line().to_ascii_lowercase().as_str() {
                "s" | "stash" => return crate::git::DirtyStateAction::Stash,
                "c" | "commit" => return crate::git::DirtyStateAction::Commit,
                "a" | "abort" => return crate::git::DirtyStateAction::Abort,
                _ => println!("Unrecognised choice."),
            }
        }
    }
}

// ============================================================================
// GENERATION
// ============================================================================

fn build_tasklist_prompt(plan_content: &str) -> String {
    format!(
        "Based on this implementation plan, create a task list optimized for AI agent execution.\n\n\
         Plan:\n{plan_content}\n\n\
         ## Task Generation Guidelines:\n\
         - Each task is a complete, coherent unit of work (target 3-8 tasks, not micro-steps)\n\
         - Include tests WITH implementation, not as separate tasks\n\
         - Align tasks with natural code boundaries; each leaves the codebase working\n\
         - Order tasks by dependency (prerequisites first)\n\
         - Tasks that can safely run in parallel touch disjoint file sets; mark them with\n\
           `<!-- category: independent, group: NAME -->` on the preceding line, and ordering-\n\
           dependent tasks with `<!-- category: fundamental, order: N -->`\n\n\
         ## Output Format:\n\
         Output ONLY the task list as plain markdown checkboxes:\n\
         - [ ] Task description here\n\n\
         Be outcome-focused: describe WHAT to achieve, not HOW.\n"
    )
}

/// Pull checkbox lines (and their category annotations) out of free-text
/// backend output. `None` when the output contains no tasks.
fn extract_tasklist_from_output(output: &str, ticket_id: &str) -> Option<String> {
    let mut lines = vec![
        format!("# Task List: {ticket_id}"),
        String::new(),
        "## Implementation Tasks".to_string(),
        String::new(),
    ];
    let mut found = false;
    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("<!--") && trimmed.contains("category:") {
            lines.push(trimmed.to_string());
            continue;
        }
        if let Some(captures) = CHECKBOX_LINE_RE.captures(line) {
            let indent_level = captures[1].len() / 2;
            let checkbox = captures[2].to_ascii_lowercase();
            let name = captures[3].trim();
            lines.push(format!("{}- [{}] {}", "  ".repeat(indent_level), checkbox, name));
            found = true;
        }
    }
    if !found {
        debug!("no checkbox tasks found in backend output");
        return None;
    }
    lines.push(String::new());
    Some(lines.join("\n"))
}

fn default_tasklist(ticket_id: &str) -> String {
    format!(
        "# Task List: {ticket_id}\n\n\
         ## Implementation Tasks\n\n\
         - [ ] [Core functionality implementation with tests]\n\
         - [ ] [Integration/API layer with tests]\n\
         - [ ] [Documentation updates]\n\n\
         ## Notes\n\
         Tasks represent complete units of work, not micro-steps.\n\
         Each task should leave the codebase in a working state.\n"
    )
}

fn generate_tasklist(
    state: &WorkflowState,
    backend: &dyn AiBackend,
) -> Result<bool, WorkflowError> {
    let plan_content = std::fs::read_to_string(state.get_plan_path())?;
    let output = backend.run_print_quiet(&build_tasklist_prompt(&plan_content))?;

    let tasklist_path = state.get_tasklist_path();
    if let Some(parent) = tasklist_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match extract_tasklist_from_output(&output, &state.ticket.id) {
        Some(content) => {
            std::fs::write(&tasklist_path, &content)?;
            if parse_task_list(&content).is_empty() {
                warn!("written task list has no parseable tasks, using default");
                std::fs::write(&tasklist_path, default_tasklist(&state.ticket.id))?;
            }
        }
        None => {
            // No tasks in the output; keep a pre-existing parseable file,
            // otherwise fall back to the template.
            let existing_ok = std::fs::read_to_string(&tasklist_path)
                .map(|content| !parse_task_list(&content).is_empty())
                .unwrap_or(false);
            if !existing_ok {
                warn!("no tasks extracted, writing default template");
                std::fs::write(&tasklist_path, default_tasklist(&state.ticket.id))?;
            }
        }
    }
    info!(path = %tasklist_path.display(), "task list written");
    Ok(tasklist_path.exists())
}

fn display_tasklist(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else { return };
    let tasks = parse_task_list(&content);
    println!();
    println!("{}", "Task List:".bold());
    println!("{}", "-".repeat(50));
    println!("{content}");
    println!("{}", "-".repeat(50));
    println!("{}", format!("Total tasks: {}", tasks.len()).dimmed());
    println!();
}

// ============================================================================
// PHASE 2
// ============================================================================

/// Execute Phase 2. Loops until the user approves, regenerating only when
/// asked to. `Edit` never re-invokes the backend.
pub fn step_2_create_tasklist(
    state: &mut WorkflowState,
    backend: &dyn AiBackend,
    prompter: &dyn WorkflowPrompter,
) -> Result<bool, WorkflowError> {
    println!("{}", "Step 2: Create Task List".bold());

    let plan_path = state.get_plan_path();
    if !plan_path.exists() {
        println!("{} {}", "Implementation plan not found:".red(), plan_path.display());
        return Ok(false);
    }

    let tasklist_path = state.get_tasklist_path();
    let mut needs_generation = true;

    loop {
        if needs_generation {
            println!("Generating task list from plan...");
            if !generate_tasklist(state, backend)? {
                println!("{}", "Failed to generate task list".red());
                if !prompter.confirm("Retry?", true) {
                    return Ok(false);
                }
                continue;
            }
            needs_generation = false;
        }

        display_tasklist(&tasklist_path);

        match prompter.review_tasklist() {
            TaskReviewChoice::Approve => {
                state.tasklist_file = Some(tasklist_path.clone());
                state.current_step = 3;
                println!("{}", "Task list approved!".green());
                return Ok(true);
            }
            TaskReviewChoice::Regenerate => {
                println!("Regenerating task list...");
                needs_generation = true;
            }
            TaskReviewChoice::Edit => {
                prompter.edit_file(&tasklist_path);
                // Re-display only; the edit is the user's word.
            }
            TaskReviewChoice::Abort => {
                println!("{}", "Workflow aborted by user".yellow());
                return Ok(false);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
