//! Jira provider.
//!
//! Handles Atlassian Cloud (`*.atlassian.net`) and self-hosted Jira URLs,
//! `PROJ-123` issue keys, and, when a default project is configured,
//! bare numeric ids.

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

/// Jira issue URL: `https://<host>/browse/PROJ-123`. Both Atlassian Cloud
/// and self-hosted instances use the `/browse/` path.
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://[^/\s]+/browse/(?P<ticket_id>[A-Z][A-Z0-9]*-\d+)(?:[?#].*)?$")
        .expect("valid regex")
});

/// Bare issue key: `PROJ-123`. Ambiguous with Linear; the detector decides.
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?P<ticket_id>[A-Z][A-Z0-9]*-\d+)$").expect("valid regex"));

static NUMERIC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));

const PROMPT_TEMPLATE: &str = r#"Use your Jira tool to fetch issue {ticket_id}.

Return ONLY a JSON object with these fields (no markdown, no explanation):
{
  "key": "PROJ-123",
  "summary": "ticket title",
  "description": "full description text",
  "status": "Open|In Progress|Done|etc",
  "issuetype": "Bug|Story|Task|etc",
  "assignee": "username or null",
  "labels": ["label1", "label2"],
  "created": "ISO datetime",
  "updated": "ISO datetime",
  "priority": "High|Medium|Low|etc",
  "url": "https://company.atlassian.net/browse/PROJ-123"
}"#;

pub struct JiraProvider {
    default_project: Option<String>,
    base_url: Option<String>,
}

impl JiraProvider {
    pub fn new(context: &ProviderContext) -> Self {
        Self {
            default_project: context
                .get("default_jira_project")
                .map(|p| p.trim().to_ascii_uppercase())
                .filter(|p| !p.is_empty()),
            base_url: context
                .get("jira_base_url")
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
        }
    }

    fn map_status(name: &str) -> TicketStatus {
        match name.trim().to_ascii_lowercase().as_str() {
            "open" | "to do" | "todo" | "backlog" | "new" | "selected for development" => {
                TicketStatus::Open
            }
            "in progress" | "in development" => TicketStatus::InProgress,
            "in review" | "review" | "code review" => TicketStatus::Review,
            "blocked" | "impediment" | "on hold" => TicketStatus::Blocked,
            "done" | "resolved" => TicketStatus::Done,
            "closed" | "cancelled" | "canceled" | "won't do" => TicketStatus::Closed,
            _ => TicketStatus::Unknown,
        }
    }

    fn map_type(name: &str) -> TicketType {
        match name.trim().to_ascii_lowercase().as_str() {
            "bug" | "defect" => TicketType::Bug,
            "story" | "new feature" | "feature" | "epic" | "improvement" => TicketType::Feature,
            "task" | "sub-task" | "subtask" => TicketType::Task,
            "maintenance" | "chore" | "tech debt" | "technical debt" => TicketType::Maintenance,
            _ => TicketType::Unknown,
        }
    }

    /// Jira's REST payload nests everything under `fields`; the agent prompt
    /// asks for a flat object. Accept both.
    fn flatten<'a>(raw: &'a Value) -> &'a Value {
        raw.get("fields").filter(|f| f.is_object()).unwrap_or(raw)
    }
}

impl Provider for JiraProvider {
    fn platform(&self) -> Platform {
        Platform::Jira
    }

    fn name(&self) -> &'static str {
        "Jira"
    }

    fn can_handle(&self, input: &str) -> bool {
        let input = input.trim();
        if URL_PATTERN.is_match(input) || ID_PATTERN.is_match(input) {
            return true;
        }
        // Bare numeric ids are only claimable with a configured default
        // project to prepend.
        self.default_project.is_some() && NUMERIC_PATTERN.is_match(input)
    }

    fn parse_input(&self, input: &str) -> Result<String, TicketIdFormatError> {
        let input = input.trim();
        if let Some(captures) = URL_PATTERN.captures(input) {
            return Ok(captures["ticket_id"].to_ascii_uppercase());
        }
        if let Some(captures) = ID_PATTERN.captures(input) {
            return Ok(captures["ticket_id"].to_ascii_uppercase());
        }
        if NUMERIC_PATTERN.is_match(input) {
            if let Some(project) = &self.default_project {
                return Ok(format!("{project}-{input}"));
            }
        }
        Err(TicketIdFormatError {
            platform: Platform::Jira,
            input: input.to_string(),
            expected: "PROJ-123 or https://<host>/browse/PROJ-123",
        })
    }

    fn normalize(&self, raw: &Value, id: Option<&str>) -> GenericTicket {
        let fields = Self::flatten(raw);

        let ticket_id = {
            let key = str_field(raw, "key");
            if key.is_empty() { id.unwrap_or_default().to_string() } else { key }
        };

        let title = str_field(fields, "summary");
        // Description may be a plain string or an Atlassian Document node;
        // anything non-string degrades to empty.
        let description = str_field(fields, "description");

        let status_name = fields
            .get("status")
            .map(|s| if s.is_string() { str_field(fields, "status") } else { str_path(fields, &["status", "name"]) })
            .unwrap_or_default();
        let type_name = fields
            .get("issuetype")
            .map(|t| if t.is_string() { str_field(fields, "issuetype") } else { str_path(fields, &["issuetype", "name"]) })
            .unwrap_or_default();

        let assignee = fields.get("assignee").and_then(|a| {
            a.as_str()
                .map(str::to_string)
                .or_else(|| a.get("displayName").and_then(Value::as_str).map(str::to_string))
        });

        let url = {
            let explicit = str_field(raw, "url");
            if !explicit.is_empty() {
                explicit
            } else if let Some(base) = &self.base_url {
                format!("{base}/browse/{ticket_id}")
            } else {
                String::new()
            }
        };

        GenericTicket {
            branch_summary: sanitize_title_for_branch(&title),
            id: ticket_id,
            platform: Platform::Jira,
            url,
            title,
            description,
            status: Self::map_status(&status_name),
            ty: Self::map_type(&type_name),
            assignee: assignee.filter(|a| !a.is_empty()),
            labels: label_names(fields.get("labels")),
            created_at: datetime_field(fields, "created"),
            updated_at: datetime_field(fields, "updated"),
            platform_metadata: collect_metadata(fields, &["priority", "project", "components"]),
        }
    }

    fn prompt_template(&self) -> &'static str {
        PROMPT_TEMPLATE
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::ticket::provider::NonInteractive;

    fn provider() -> JiraProvider {
        JiraProvider::new(&ProviderContext::default())
    }

    fn provider_with_project(project: &str) -> JiraProvider {
        let mut config = BTreeMap::new();
        config.insert("default_jira_project".to_string(), project.to_string());
        JiraProvider::new(&ProviderContext::new(config, Arc::new(NonInteractive)))
    }

    #[test]
    fn test_can_handle_cloud_and_self_hosted_urls() {
        let p = provider();
        assert!(p.can_handle("https://company.atlassian.net/browse/PROJ-123"));
        assert!(p.can_handle("https://jira.internal.corp/browse/OPS-7"));
        assert!(!p.can_handle("https://linear.app/team/issue/TEAM-1"));
    }

    #[test]
    fn test_can_handle_bare_id() {
        assert!(provider().can_handle("PROJ-123"));
        assert!(provider().can_handle("proj-123"));
    }

    #[test]
    fn test_numeric_id_requires_default_project() {
        assert!(!provider().can_handle("42"));
        assert!(provider_with_project("PROJ").can_handle("42"));
    }

    #[test]
    fn test_parse_input_uppercases() {
        assert_eq!(provider().parse_input("proj-123").unwrap(), "PROJ-123");
        assert_eq!(
            provider().parse_input("https://x.atlassian.net/browse/proj-9").unwrap(),
            "PROJ-9"
        );
    }

    #[test]
    fn test_parse_numeric_with_default_project() {
        assert_eq!(provider_with_project("ops").parse_input("42").unwrap(), "OPS-42");
    }

    #[test]
    fn test_parse_numeric_without_default_project_fails() {
        assert!(provider().parse_input("42").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(provider().parse_input("not a ticket").is_err());
    }

    #[test]
    fn test_normalize_flat_agent_shape() {
        let raw = json!({
            "key": "PROJ-2",
            "summary": "Test",
            "description": "Body",
            "status": "In Progress",
            "issuetype": "Bug",
            "assignee": "sam",
            "labels": ["backend"],
        });
        let ticket = provider().normalize(&raw, None);
        assert_eq!(ticket.id, "PROJ-2");
        assert_eq!(ticket.status, TicketStatus::InProgress);
        assert_eq!(ticket.ty, TicketType::Bug);
        assert_eq!(ticket.assignee.as_deref(), Some("sam"));
        assert_eq!(ticket.labels, vec!["backend"]);
        assert_eq!(ticket.branch_summary, "test");
    }

    #[test]
    fn test_normalize_nested_rest_shape() {
        let raw = json!({
            "key": "PROJ-3",
            "fields": {
                "summary": "Nested",
                "status": {"name": "Done"},
                "issuetype": {"name": "Story"},
                "assignee": {"displayName": "Alex Doe"},
                "labels": [],
                "created": "2026-01-11T12:00:00+00:00",
            }
        });
        let ticket = provider().normalize(&raw, None);
        assert_eq!(ticket.title, "Nested");
        assert_eq!(ticket.status, TicketStatus::Done);
        assert_eq!(ticket.ty, TicketType::Feature);
        assert_eq!(ticket.assignee.as_deref(), Some("Alex Doe"));
        assert!(ticket.created_at.is_some());
    }

    #[test]
    fn test_normalize_tolerates_empty_payload() {
        let ticket = provider().normalize(&json!({}), Some("PROJ-4"));
        assert_eq!(ticket.id, "PROJ-4");
        assert_eq!(ticket.status, TicketStatus::Unknown);
        assert_eq!(ticket.ty, TicketType::Unknown);
        assert!(ticket.description.is_empty());
        assert!(ticket.url.is_empty());
    }

    #[test]
    fn test_normalize_builds_url_from_base() {
        let mut config = BTreeMap::new();
        config.insert("jira_base_url".to_string(), "https://x.atlassian.net/".to_string());
        let p = JiraProvider::new(&ProviderContext::new(config, Arc::new(NonInteractive)));
        let ticket = p.normalize(&json!({"key": "PROJ-5"}), None);
        assert_eq!(ticket.url, "https://x.atlassian.net/browse/PROJ-5");
    }

    #[test]
    fn test_status_mapping_case_insensitive() {
        assert_eq!(JiraProvider::map_status("IN PROGRESS"), TicketStatus::InProgress);
        assert_eq!(JiraProvider::map_status("Blocked"), TicketStatus::Blocked);
        assert_eq!(JiraProvider::map_status("Weird Custom"), TicketStatus::Unknown);
    }

    #[test]
    fn test_prompt_template_has_placeholder() {
        assert!(provider().prompt_template().contains("{ticket_id}"));
    }
}
