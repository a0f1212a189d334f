//! Linear provider.
//!
//! Linear has five fixed workflow state *types* (`backlog`, `unstarted`,
//! `started`, `completed`, `canceled`) underneath freely renameable state
//! *names*. Status mapping prefers `state.type` and only falls back to the
//! name table for payloads that omit it. Ticket type is inferred from label
//! keywords since Linear has no native issue-type field.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::ticket::provider::{
    collect_metadata, datetime_field, label_names, str_field, str_path, Provider,
    ProviderContext, TicketIdFormatError,
};
use crate::ticket::{
    sanitize_title_for_branch, GenericTicket, Platform, TicketStatus, TicketType,
};

/// Linear issue URL, with or without a trailing title slug:
/// `https://linear.app/<team>/issue/TEAM-123[/title-slug]`.
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://linear\.app/[^/\s]+/issue/(?P<ticket_id>[A-Z][A-Z0-9]*-\d+)(?:/[^\s]*)?$")
        .expect("valid regex")
});

/// Bare identifier: `TEAM-123`. Ambiguous with Jira.
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?P<ticket_id>[A-Z][A-Z0-9]*-\d+)$").expect("valid regex"));

const PROMPT_TEMPLATE: &str = r#"Use your Linear tool to fetch issue {ticket_id}.

Return ONLY a JSON object with these fields (no markdown, no explanation):
{
  "identifier": "TEAM-123",
  "title": "issue title",
  "description": "full description text",
  "url": "https://linear.app/...",
  "state": { "name": "status name", "type": "backlog|unstarted|started|completed|canceled" },
  "assignee": { "name": "username" } or null,
  "labels": { "nodes": [{ "name": "label1" }] },
  "priority": 0-4,
  "team": { "key": "TEAM", "name": "Team Name" },
  "createdAt": "ISO datetime",
  "updatedAt": "ISO datetime"
}"#;

pub struct LinearProvider;

impl LinearProvider {
    pub fn new(_context: &ProviderContext) -> Self {
        Self
    }

    /// `state.type` → status. Linear guarantees these five values.
    fn map_state_type(state_type: &str) -> Option<TicketStatus> {
        match state_type.trim().to_ascii_lowercase().as_str() {
            "backlog" | "unstarted" => Some(TicketStatus::Open),
            "started" => Some(TicketStatus::InProgress),
            "completed" => Some(TicketStatus::Done),
            "canceled" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// Fallback `state.name` → status for payloads without a state type.
    fn map_state_name(name: &str) -> TicketStatus {
        match name.trim().to_ascii_lowercase().as_str() {
            "backlog" | "triage" | "todo" | "to do" | "ready" => TicketStatus::Open,
            "in progress" | "in development" => TicketStatus::InProgress,
            "in review" | "review" => TicketStatus::Review,
            "blocked" => TicketStatus::Blocked,
            "done" | "complete" | "completed" => TicketStatus::Done,
            "canceled" | "cancelled" => TicketStatus::Closed,
            _ => TicketStatus::Unknown,
        }
    }

    /// Infer ticket type from label keywords.
    fn infer_type(labels: &[String]) -> TicketType {
        const KEYWORDS: &[(TicketType, &[&str])] = &[
            (TicketType::Bug, &["bug", "defect", "fix", "error", "crash", "regression"]),
            (TicketType::Feature, &["feature", "enhancement", "story", "improvement"]),
            (TicketType::Task, &["task", "chore", "todo", "spike", "research"]),
            (
                TicketType::Maintenance,
                &["maintenance", "tech-debt", "tech debt", "refactor", "cleanup", "infrastructure"],
            ),
        ];
        for label in labels {
            let label = label.to_ascii_lowercase();
            for (ty, keywords) in KEYWORDS {
                if keywords.iter().any(|k| label.contains(k)) {
                    return *ty;
                }
            }
        }
        TicketType::Unknown
    }
}

impl Provider for LinearProvider {
    fn platform(&self) -> Platform {
        Platform::Linear
    }

    fn name(&self) -> &'static str {
        "Linear"
    }

    fn can_handle(&self, input: &str) -> bool {
        let input = input.trim();
        URL_PATTERN.is_match(input) || ID_PATTERN.is_match(input)
    }

    fn parse_input(&self, input: &str) -> Result<String, TicketIdFormatError> {
        let input = input.trim();
        if let Some(captures) = URL_PATTERN.captures(input) {
            return Ok(captures["ticket_id"].to_ascii_uppercase());
        }
        if let Some(captures) = ID_PATTERN.captures(input) {
            return Ok(captures["ticket_id"].to_ascii_uppercase());
        }
        Err(TicketIdFormatError {
            platform: Platform::Linear,
            input: input.to_string(),
            expected: "TEAM-123 or https://linear.app/<team>/issue/TEAM-123",
        })
    }

    fn normalize(&self, raw: &Value, id: Option<&str>) -> GenericTicket {
        let ticket_id = {
            let identifier = str_field(raw, "identifier");
            if identifier.is_empty() { id.unwrap_or_default().to_string() } else { identifier }
        };
        let title = str_field(raw, "title");

        let state_type = str_path(raw, &["state", "type"]);
        let status = Self::map_state_type(&state_type)
            .unwrap_or_else(|| Self::map_state_name(&str_path(raw, &["state", "name"])));

        // Labels arrive as GraphQL connection nodes or a plain list.
        let labels = raw
            .get("labels")
            .map(|l| label_names(l.get("nodes").or(Some(l))))
            .unwrap_or_default();

        GenericTicket {
            branch_summary: sanitize_title_for_branch(&title),
            id: ticket_id,
            platform: Platform::Linear,
            url: str_field(raw, "url"),
            title,
            description: str_field(raw, "description"),
            status,
            ty: Self::infer_type(&labels),
            assignee: {
                let name = str_path(raw, &["assignee", "name"]);
                (!name.is_empty()).then_some(name)
            },
            labels,
            created_at: datetime_field(raw, "createdAt"),
            updated_at: datetime_field(raw, "updatedAt"),
            platform_metadata: collect_metadata(raw, &["priority", "priorityLabel", "team", "cycle", "parent"]),
        }
    }

    fn prompt_template(&self) -> &'static str {
        PROMPT_TEMPLATE
    }
}

// ============================================================================
// TESTS
// ============================================================================
