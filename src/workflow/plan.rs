//! # Phase 1: Implementation Plan
//!
//! Prompts the backend for an implementation plan and persists it to
//! `specs/<TICKET>-plan.md`. The runner writes the file itself from the
//! captured output; it never assumes the AI created it.

use colored::Colorize;
use tracing::{debug, info};

use crate::backend::AiBackend;
use crate::workflow::state::WorkflowState;
use crate::workflow::WorkflowError;

fn build_plan_prompt(state: &WorkflowState) -> String {
    let ticket = &state.ticket;
    let mut prompt = format!(
        "Create a detailed implementation plan for this ticket.\n\n\
         ## Ticket: {}\n",
        ticket.id
    );
    if !ticket.title.is_empty() {
        prompt.push_str(&format!("**Title:** {}\n", ticket.title));
    }
    if !ticket.description.is_empty() {
        prompt.push_str(&format!("\n**Description:**\n{}\n", ticket.description));
    }
    if !state.user_context.is_empty() {
        prompt.push_str(&format!("\n## Additional Context from the Developer:\n{}\n", state.user_context));
    }
    prompt.push_str(
        "\n## Plan Requirements:\n\
         - Survey the relevant parts of the codebase before proposing changes\n\
         - Describe WHAT to build and WHERE, referencing real files and modules\n\
         - Call out risks, open questions, and testing strategy\n\
         - Keep the plan focused on this ticket; no speculative scope\n\n\
         Output the plan as plain markdown text. Do NOT write any files.\n",
    );
    prompt
}

/// Execute Phase 1. On success the plan file exists and
/// `state.current_step` is 2.
pub fn step_1_create_plan(
    state: &mut WorkflowState,
    backend: &dyn AiBackend,
) -> Result<bool, WorkflowError> {
    println!("{}", "Step 1: Create Implementation Plan".bold());

    let prompt = build_plan_prompt(state);
    let output = backend.run_print_quiet(&prompt)?;

    if output.trim().is_empty() {
        println!("{}", "The backend produced no plan output.".red());
        return Ok(false);
    }

    let plan_path = state.get_plan_path();
    if let Some(parent) = plan_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Durability: persist the captured output ourselves.
    std::fs::write(&plan_path, ensure_trailing_newline(output.trim()))?;
    info!(path = %plan_path.display(), "plan written");

    state.plan_file = Some(plan_path.clone());
    state.current_step = 2;
    println!("{} Plan saved to {}", "✓".green(), plan_path.display());
    debug!(step = state.current_step, "phase 1 complete");
    Ok(true)
}

fn ensure_trailing_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::ticket::{GenericTicket, Platform};

    fn state_in(dir: &std::path::Path) -> WorkflowState {
        let mut ticket = GenericTicket::with_id_only("PROJ-1", Platform::Jira);
        ticket.title = "Add login".to_string();
        ticket.description = "Users need to log in".to_string();
        let mut state = WorkflowState::new(ticket);
        state.plan_file = Some(dir.join("PROJ-1-plan.md"));
        state
    }

    #[test]
    fn test_plan_written_and_step_advanced() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        let backend = MockBackend::new().with_response("# Plan\n\nDo the thing.");

        assert!(step_1_create_plan(&mut state, &backend).unwrap());
        assert_eq!(state.current_step, 2);
        let content = std::fs::read_to_string(dir.path().join("PROJ-1-plan.md")).unwrap();
        assert!(content.contains("Do the thing."));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_prompt_includes_ticket_and_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        state.user_context = "Prefer the existing session middleware".to_string();
        let backend = MockBackend::new().with_response("plan");

        step_1_create_plan(&mut state, &backend).unwrap();
        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("PROJ-1"));
        assert!(prompt.contains("Add login"));
        assert!(prompt.contains("session middleware"));
    }

    #[test]
    fn test_empty_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        let backend = MockBackend::new().with_response("   \n");
        assert!(!step_1_create_plan(&mut state, &backend).unwrap());
        assert_eq!(state.current_step, 1);
    }
}
