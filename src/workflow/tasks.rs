//! # Task List Parsing
//!
//! Markdown checkbox tasklists with optional execution-category
//! annotations.
//!
//! Recognised task forms (bullet optional, checkbox required):
//!
//! ```text
//! - [ ] Pending task
//! * [x] Completed task
//!   - [ ] Nested task (2 spaces per indent level)
//! ```
//!
//! HTML-comment sentinels preceding a task set its execution category:
//!
//! ```text
//! <!-- category: fundamental, order: 1 -->
//! - [ ] Must run first, sequentially
//! <!-- category: independent, group: api -->
//! - [ ] May run in parallel with its group
//! ```
//!
//! Unannotated tasks default to Fundamental in source order, each in its
//! own group, which degenerates to fully sequential execution.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static TASK_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)[-*]?\s*\[([xX ])\]\s*(.+)$").expect("valid regex"));

static CATEGORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)<!--\s*category:\s*(?P<category>fundamental|independent)\s*(?:,\s*order:\s*(?P<order>\d+))?\s*(?:,\s*group:\s*(?P<group>[A-Za-z0-9_-]+))?\s*-->",
    )
    .expect("valid regex")
});

// ============================================================================
// TYPES
// ============================================================================

/// Completion status of a parsed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Complete,
    InProgress,
    Skipped,
}

/// Execution category from the annotation sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    /// Ordering-dependent; runs alone, in sequence.
    Fundamental,
    /// File-disjoint within its group; may run in parallel.
    Independent,
}

/// A single task from the task list.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: String,
    pub status: TaskStatus,
    pub line_number: usize,
    pub indent_level: usize,
    pub parent: Option<String>,
    pub category: Option<TaskCategory>,
    /// Total order within the fundamental group.
    pub order: Option<u32>,
    /// Parallel group tag for independent tasks.
    pub group: Option<String>,
}

impl Task {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TaskStatus::Pending,
            line_number: 0,
            indent_level: 0,
            parent: None,
            category: None,
            order: None,
            group: None,
        }
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse a markdown document into tasks.
pub fn parse_task_list(content: &str) -> Vec<Task> {
    let mut tasks: Vec<Task> = Vec::new();
    // Annotation context from the most recent category comment; consumed by
    // the next task line.
    let mut pending_annotation: Option<(TaskCategory, Option<u32>, Option<String>)> = None;

    for (line_idx, line) in content.lines().enumerate() {
        if let Some(captures) = CATEGORY_RE.captures(line) {
            let category = if captures["category"].eq_ignore_ascii_case("independent") {
                TaskCategory::Independent
            } else {
                TaskCategory::Fundamental
            };
            let order = captures.name("order").and_then(|m| m.as_str().parse().ok());
            let group = captures.name("group").map(|m| m.as_str().to_string());
            pending_annotation = Some((category, order, group));
            continue;
        }

        let Some(captures) = TASK_LINE_RE.captures(line) else { continue };
        let indent = &captures[1];
        let checkbox = &captures[2];
        let name = captures[3].trim().to_string();
        let indent_level = indent.len() / 2;

        let status =
            if checkbox.eq_ignore_ascii_case("x") { TaskStatus::Complete } else { TaskStatus::Pending };

        // Nearest earlier task with a lower indent is the parent.
        let parent = if indent_level > 0 {
            tasks
                .iter()
                .rev()
                .find(|t| t.indent_level < indent_level)
                .map(|t| t.name.clone())
        } else {
            None
        };

        let (category, order, group) = match pending_annotation.take() {
            Some((category, order, group)) => (Some(category), order, group),
            None => (None, None, None),
        };

        tasks.push(Task {
            name,
            status,
            line_number: line_idx + 1,
            indent_level,
            parent,
            category,
            order,
            group,
        });
    }

    debug!(count = tasks.len(), "parsed tasks");
    tasks
}

pub fn get_pending_tasks(tasks: &[Task]) -> Vec<&Task> {
    tasks.iter().filter(|t| t.status == TaskStatus::Pending).collect()
}

pub fn get_completed_tasks(tasks: &[Task]) -> Vec<&Task> {
    tasks.iter().filter(|t| t.status == TaskStatus::Complete).collect()
}

/// Render tasks back to markdown with normalized `-` bullets and 2-space
/// indents. Category annotations are not re-emitted.
pub fn format_task_list(tasks: &[Task]) -> String {
    let mut lines = Vec::with_capacity(tasks.len());
    for task in tasks {
        let indent = "  ".repeat(task.indent_level);
        let checkbox = if task.status == TaskStatus::Complete { "[x]" } else { "[ ]" };
        lines.push(format!("{indent}- {checkbox} {}", task.name));
    }
    lines.join("\n")
}

/// Flip the single matching `[ ]` to `[x]` in the tasklist file.
///
/// The rewrite is atomic (temp file + rename). Returns whether a matching
/// pending task was found.
pub fn mark_task_complete(tasklist_path: &Path, task_name: &str) -> std::io::Result<bool> {
    let content = std::fs::read_to_string(tasklist_path)?;
    let mut modified = false;
    let mut lines: Vec<String> = Vec::new();

    for line in content.lines() {
        if !modified {
            if let Some(captures) = TASK_LINE_RE.captures(line) {
                let is_pending = captures[2].trim().is_empty();
                if is_pending && captures[3].trim() == task_name {
                    // Replace only the checkbox, preserving bullet/indent.
                    lines.push(line.replacen("[ ]", "[x]", 1));
                    modified = true;
                    continue;
                }
            }
        }
        lines.push(line.to_string());
    }

    if !modified {
        debug!(task_name, "task not found in tasklist file");
        return Ok(false);
    }

    let mut output = lines.join("\n");
    output.push('\n');
    let tmp_path = tasklist_path.with_extension("md.tmp");
    std::fs::write(&tmp_path, &output)?;
    std::fs::rename(&tmp_path, tasklist_path)?;
    debug!(task_name, "marked task complete");
    Ok(true)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_forms() {
        let content = "- [ ] Pending one\n* [x] Done one\n[X] Bare done\n";
        let tasks = parse_task_list(content);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[1].status, TaskStatus::Complete);
        assert_eq!(tasks[2].status, TaskStatus::Complete);
        assert_eq!(tasks[0].name, "Pending one");
    }

    #[test]
    fn test_non_task_lines_ignored() {
        let content = "# Header\n\nSome prose.\n- not a task\n- [ ] Real task\n";
        let tasks = parse_task_list(content);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Real task");
        assert_eq!(tasks[0].line_number, 5);
    }

    #[test]
    fn test_indent_and_parent_assignment() {
        let content = "- [ ] Parent\n  - [ ] Child\n    - [ ] Grandchild\n  - [ ] Second child\n";
        let tasks = parse_task_list(content);
        assert_eq!(tasks[0].indent_level, 0);
        assert_eq!(tasks[1].indent_level, 1);
        assert_eq!(tasks[1].parent.as_deref(), Some("Parent"));
        assert_eq!(tasks[2].indent_level, 2);
        assert_eq!(tasks[2].parent.as_deref(), Some("Child"));
        assert_eq!(tasks[3].parent.as_deref(), Some("Parent"));
    }

    #[test]
    fn test_category_annotations() {
        let content = "\
<!-- category: fundamental, order: 1 -->
- [ ] Set up schema
<!-- category: independent, group: api -->
- [ ] Build endpoint A
<!-- category: independent, group: api -->
- [ ] Build endpoint B
- [ ] Unannotated
";
        let tasks = parse_task_list(content);
        assert_eq!(tasks[0].category, Some(TaskCategory::Fundamental));
        assert_eq!(tasks[0].order, Some(1));
        assert_eq!(tasks[1].category, Some(TaskCategory::Independent));
        assert_eq!(tasks[1].group.as_deref(), Some("api"));
        assert_eq!(tasks[2].group.as_deref(), Some("api"));
        assert_eq!(tasks[3].category, None);
        assert_eq!(tasks[3].group, None);
    }

    #[test]
    fn test_annotation_applies_only_to_next_task() {
        let content = "\
<!-- category: independent, group: g1 -->
- [ ] Annotated
- [ ] Not annotated
";
        let tasks = parse_task_list(content);
        assert_eq!(tasks[0].category, Some(TaskCategory::Independent));
        assert_eq!(tasks[1].category, None);
    }

    #[test]
    fn test_format_parse_roundtrip() {
        let content = "- [ ] First\n- [x] Second\n  - [ ] Nested";
        let tasks = parse_task_list(content);
        assert_eq!(format_task_list(&tasks), content);
    }

    #[test]
    fn test_format_normalizes_bullets() {
        let content = "* [ ] Star bullet\n[x] Bare";
        let formatted = format_task_list(&parse_task_list(content));
        assert_eq!(formatted, "- [ ] Star bullet\n- [x] Bare");
    }

    #[test]
    fn test_pending_and_completed_filters() {
        let tasks = parse_task_list("- [ ] A\n- [x] B\n- [ ] C\n");
        assert_eq!(get_pending_tasks(&tasks).len(), 2);
        assert_eq!(get_completed_tasks(&tasks).len(), 1);
    }

    #[test]
    fn test_mark_task_complete_rewrites_single_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasklist.md");
        std::fs::write(&path, "# Tasks\n\n- [ ] First\n- [ ] Second\n").unwrap();

        assert!(mark_task_complete(&path, "First").unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("- [x] First"));
        assert!(content.contains("- [ ] Second"));
    }

    #[test]
    fn test_mark_task_complete_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasklist.md");
        std::fs::write(&path, "- [ ] Only task\n").unwrap();
        assert!(!mark_task_complete(&path, "Missing task").unwrap());
        // File unchanged.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "- [ ] Only task\n");
    }

    #[test]
    fn test_mark_task_complete_skips_already_done() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasklist.md");
        std::fs::write(&path, "- [x] Done\n").unwrap();
        assert!(!mark_task_complete(&path, "Done").unwrap());
    }
}
