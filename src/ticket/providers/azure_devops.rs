//! Azure DevOps provider.
//!
//! Work items are numeric ids scoped to an organization/project pair; the
//! org and project live in credentials, not in the id. Raw payloads use the
//! REST shape with reference-name keys under `fields`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::ticket::provider::{
    datetime_field, str_field, str_path, Provider, ProviderContext, TicketIdFormatError,
};
use crate::ticket::{
    sanitize_title_for_branch, GenericTicket, Platform, TicketStatus, TicketType,
};

/// Work item URL: `https://dev.azure.com/<org>/<project>/_workitems/edit/123`.
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://dev\.azure\.com/[^/\s]+/[^/\s]+/_workitems/edit/(?P<number>\d+)(?:[/?#].*)?$")
        .expect("valid regex")
});

/// Bare work item id, optionally `#`-prefixed.
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?(?P<number>\d+)$").expect("valid regex"));

const PROMPT_TEMPLATE: &str = r#"Use your Azure DevOps tool to fetch work item {ticket_id}.

Return ONLY a JSON object with these fields (no markdown, no explanation):
{
  "id": 123,
  "fields": {
    "System.Title": "work item title",
    "System.Description": "description html/text",
    "System.State": "New|Active|Resolved|Closed",
    "System.WorkItemType": "Bug|Task|User Story",
    "System.AssignedTo": { "displayName": "username" },
    "System.Tags": "tag1; tag2",
    "System.CreatedDate": "ISO datetime",
    "System.ChangedDate": "ISO datetime"
  },
  "url": "https://dev.azure.com/..."
}"#;

pub struct AzureDevOpsProvider;

impl AzureDevOpsProvider {
    pub fn new(_context: &ProviderContext) -> Self {
        Self
    }

    fn map_status(state: &str) -> TicketStatus {
        match state.trim().to_ascii_lowercase().as_str() {
            "new" | "to do" | "proposed" | "approved" => TicketStatus::Open,
            "active" | "doing" | "in progress" | "committed" => TicketStatus::InProgress,
            // Azure's Resolved means fixed, pending verification.
            "resolved" => TicketStatus::Review,
            "blocked" => TicketStatus::Blocked,
            "done" => TicketStatus::Done,
            "closed" | "removed" => TicketStatus::Closed,
            _ => TicketStatus::Unknown,
        }
    }

    fn map_type(work_item_type: &str) -> TicketType {
        match work_item_type.trim().to_ascii_lowercase().as_str() {
            "bug" => TicketType::Bug,
            "user story" | "feature" | "epic" => TicketType::Feature,
            "task" => TicketType::Task,
            "technical debt" | "maintenance" => TicketType::Maintenance,
            _ => TicketType::Unknown,
        }
    }
}

impl Provider for AzureDevOpsProvider {
    fn platform(&self) -> Platform {
        Platform::AzureDevOps
    }

    fn name(&self) -> &'static str {
        "Azure DevOps"
    }

    fn can_handle(&self, input: &str) -> bool {
        let input = input.trim();
        // Bare numerics are also claimed by Jira-with-default-project; the
        // detector prefers the unambiguous URL form.
        URL_PATTERN.is_match(input) || ID_PATTERN.is_match(input)
    }

    fn parse_input(&self, input: &str) -> Result<String, TicketIdFormatError> {
        let input = input.trim();
        if let Some(captures) = URL_PATTERN.captures(input) {
            return Ok(captures["number"].to_string());
        }
        if let Some(captures) = ID_PATTERN.captures(input) {
            return Ok(captures["number"].to_string());
        }
        Err(TicketIdFormatError {
            platform: Platform::AzureDevOps,
            input: input.to_string(),
            expected: "a numeric work item id or https://dev.azure.com/<org>/<project>/_workitems/edit/<id>",
        })
    }

    fn normalize(&self, raw: &Value, id: Option<&str>) -> GenericTicket {
        let empty = Value::Null;
        let fields = raw.get("fields").unwrap_or(&empty);

        let ticket_id = raw
            .get("id")
            .and_then(Value::as_u64)
            .map(|n| n.to_string())
            .or_else(|| id.map(str::to_string))
            .unwrap_or_default();

        let title = str_field(fields, "System.Title");
        let tags = str_field(fields, "System.Tags");
        let labels: Vec<String> = tags
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        GenericTicket {
            branch_summary: sanitize_title_for_branch(&title),
            id: ticket_id,
            platform: Platform::AzureDevOps,
            url: str_field(raw, "url"),
            title,
            description: str_field(fields, "System.Description"),
            status: Self::map_status(&str_field(fields, "System.State")),
            ty: Self::map_type(&str_field(fields, "System.WorkItemType")),
            assignee: {
                let name = str_path(fields, &["System.AssignedTo", "displayName"]);
                (!name.is_empty()).then_some(name)
            },
            labels,
            created_at: datetime_field(fields, "System.CreatedDate"),
            updated_at: datetime_field(fields, "System.ChangedDate"),
            platform_metadata: Default::default(),
        }
    }

    fn prompt_template(&self) -> &'static str {
        PROMPT_TEMPLATE
    }
}
