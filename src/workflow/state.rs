//! # Workflow State
//!
//! The single shared record of an in-flight workflow run. One owner at a
//! time; the scheduler mutates it only through the runner's lock.

use std::path::PathBuf;

use crate::ticket::GenericTicket;

// ============================================================================
// TASK MEMORY
// ============================================================================

/// Learnings captured from a completed task, consulted when prompting
/// later tasks. Appended monotonically, never rewritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskMemory {
    pub task_name: String,
    pub files_modified: Vec<String>,
    pub patterns_used: Vec<String>,
    pub key_decisions: Vec<String>,
    pub test_commands: Vec<String>,
}

impl TaskMemory {
    /// Markdown projection for prompt context.
    pub fn to_markdown(&self) -> String {
        let mut parts = vec![format!("### {}", self.task_name)];
        if !self.files_modified.is_empty() {
            parts.push(format!("**Files:** {}", self.files_modified.join(", ")));
        }
        if !self.patterns_used.is_empty() {
            parts.push("**Patterns:**".to_string());
            for pattern in &self.patterns_used {
                parts.push(format!("- {pattern}"));
            }
        }
        if !self.key_decisions.is_empty() {
            parts.push("**Key Decisions:**".to_string());
            for decision in &self.key_decisions {
                parts.push(format!("- {decision}"));
            }
        }
        if !self.test_commands.is_empty() {
            parts.push("**Test Commands:**".to_string());
            for command in &self.test_commands {
                parts.push(format!("- `{command}`"));
            }
        }
        parts.join("\n")
    }
}

// ============================================================================
// WORKFLOW STATE
// ============================================================================

/// State of one workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub ticket: GenericTicket,

    // Git state
    pub branch_name: String,
    pub base_commit: String,

    // Model configuration
    pub planning_model: String,
    pub implementation_model: String,

    // Workflow options
    pub skip_clarification: bool,
    pub squash_at_end: bool,
    /// Stop executing on the first task failure.
    pub fail_fast: bool,

    /// User-provided additional context.
    pub user_context: String,

    // File paths
    pub plan_file: Option<PathBuf>,
    pub tasklist_file: Option<PathBuf>,

    // Progress tracking
    pub completed_tasks: Vec<String>,
    pub checkpoint_commits: Vec<String>,

    // Execution state
    pub current_step: u8,
    pub retry_count: u32,
    pub max_retries: u32,

    // Cross-task learning
    pub task_memories: Vec<TaskMemory>,
}

impl WorkflowState {
    pub fn new(ticket: GenericTicket) -> Self {
        Self {
            ticket,
            branch_name: String::new(),
            base_commit: String::new(),
            planning_model: String::new(),
            implementation_model: String::new(),
            skip_clarification: false,
            squash_at_end: true,
            fail_fast: false,
            user_context: String::new(),
            plan_file: None,
            tasklist_file: None,
            completed_tasks: Vec::new(),
            checkpoint_commits: Vec::new(),
            current_step: 1,
            retry_count: 0,
            max_retries: 3,
            task_memories: Vec::new(),
        }
    }

    pub fn specs_dir(&self) -> PathBuf {
        PathBuf::from("specs")
    }

    pub fn plan_filename(&self) -> String {
        format!("{}-plan.md", self.ticket.id)
    }

    pub fn tasklist_filename(&self) -> String {
        format!("{}-tasklist.md", self.ticket.id)
    }

    pub fn get_plan_path(&self) -> PathBuf {
        self.plan_file.clone().unwrap_or_else(|| self.specs_dir().join(self.plan_filename()))
    }

    pub fn get_tasklist_path(&self) -> PathBuf {
        self.tasklist_file
            .clone()
            .unwrap_or_else(|| self.specs_dir().join(self.tasklist_filename()))
    }

    /// Record a completed task. Idempotent.
    pub fn mark_task_complete(&mut self, task_name: &str) {
        if !self.completed_tasks.iter().any(|t| t == task_name) {
            self.completed_tasks.push(task_name.to_string());
        }
    }

    /// Append a checkpoint commit hash.
    pub fn add_checkpoint(&mut self, commit_hash: impl Into<String>) {
        self.checkpoint_commits.push(commit_hash.into());
    }

    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
    }

    /// Increment the retry counter; true while more retries remain.
    pub fn increment_retries(&mut self) -> bool {
        self.retry_count += 1;
        self.retry_count < self.max_retries
    }

    pub fn add_task_memory(&mut self, memory: TaskMemory) {
        self.task_memories.push(memory);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::Platform;

    fn state() -> WorkflowState {
        WorkflowState::new(GenericTicket::with_id_only("PROJ-1", Platform::Jira))
    }

    #[test]
    fn test_default_paths_derive_from_ticket() {
        let s = state();
        assert_eq!(s.get_plan_path(), PathBuf::from("specs/PROJ-1-plan.md"));
        assert_eq!(s.get_tasklist_path(), PathBuf::from("specs/PROJ-1-tasklist.md"));
    }

    #[test]
    fn test_explicit_paths_win() {
        let mut s = state();
        s.plan_file = Some(PathBuf::from("/tmp/custom-plan.md"));
        assert_eq!(s.get_plan_path(), PathBuf::from("/tmp/custom-plan.md"));
    }

    #[test]
    fn test_mark_task_complete_is_idempotent() {
        let mut s = state();
        s.mark_task_complete("A");
        s.mark_task_complete("A");
        s.mark_task_complete("B");
        assert_eq!(s.completed_tasks, vec!["A", "B"]);
    }

    #[test]
    fn test_checkpoints_append_in_order() {
        let mut s = state();
        s.add_checkpoint("abc123");
        s.add_checkpoint("def456");
        assert_eq!(s.checkpoint_commits, vec!["abc123", "def456"]);
    }

    #[test]
    fn test_retry_counter() {
        let mut s = state();
        s.max_retries = 2;
        assert!(s.increment_retries()); // 1 < 2
        assert!(!s.increment_retries()); // 2 == 2
        s.reset_retries();
        assert_eq!(s.retry_count, 0);
    }

    #[test]
    fn test_task_memory_markdown() {
        let memory = TaskMemory {
            task_name: "Implement auth".into(),
            files_modified: vec!["src/auth.rs".into()],
            patterns_used: vec!["async pattern".into()],
            key_decisions: vec![],
            test_commands: vec!["cargo test auth".into()],
        };
        let md = memory.to_markdown();
        assert!(md.starts_with("### Implement auth"));
        assert!(md.contains("**Files:** src/auth.rs"));
        assert!(md.contains("- async pattern"));
        assert!(md.contains("`cargo test auth`"));
    }
}
