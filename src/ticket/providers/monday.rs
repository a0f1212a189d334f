//! Monday.com provider.
//!
//! Items are numeric ids; board URLs carry the item id in the `/pulses/`
//! segment. Monday has no native status field; status comes from the text
//! of a "Status" column, so the mapping is keyed on common column values.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::ticket::provider::{
    collect_metadata, datetime_field, str_field, Provider, ProviderContext, TicketIdFormatError,
};
use crate::ticket::{
    sanitize_title_for_branch, GenericTicket, Platform, TicketStatus, TicketType,
};

/// Item URL: `https://<workspace>.monday.com/boards/123/pulses/456`.
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://[^/\s]*monday\.com/boards/\d+/pulses/(?P<number>\d+)(?:[/?#].*)?$")
        .expect("valid regex")
});

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<number>\d+)$").expect("valid regex"));

const PROMPT_TEMPLATE: &str = r#"Use your Monday.com tool to fetch item {ticket_id}.

Return ONLY a JSON object with these fields (no markdown, no explanation):
{
  "id": "456",
  "name": "item name",
  "state": "active|archived|deleted",
  "board": { "name": "Board Name" },
  "column_values": [{ "title": "Status", "text": "Working on it" }],
  "url": "https://workspace.monday.com/boards/123/pulses/456",
  "created_at": "ISO datetime",
  "updated_at": "ISO datetime"
}"#;

pub struct MondayProvider;

impl MondayProvider {
    pub fn new(_context: &ProviderContext) -> Self {
        Self
    }

    fn map_status_text(text: &str) -> TicketStatus {
        match text.trim().to_ascii_lowercase().as_str() {
            "" => TicketStatus::Unknown,
            "working on it" | "in progress" | "doing" => TicketStatus::InProgress,
            "done" => TicketStatus::Done,
            "stuck" | "blocked" => TicketStatus::Blocked,
            "waiting for review" | "in review" | "review" => TicketStatus::Review,
            "to do" | "todo" | "not started" | "backlog" => TicketStatus::Open,
            _ => TicketStatus::Unknown,
        }
    }

    /// Text of the column titled "Status", if present.
    fn status_column_text(raw: &Value) -> String {
        let Some(columns) = raw.get("column_values").and_then(Value::as_array) else {
            return String::new();
        };
        for column in columns {
            // Old API shape has `title` on the value, new shape nests it
            // under `column`.
            let title = column
                .get("title")
                .and_then(Value::as_str)
                .or_else(|| column.get("column").and_then(|c| c.get("title")).and_then(Value::as_str))
                .unwrap_or("");
            if title.eq_ignore_ascii_case("status") {
                return column.get("text").and_then(Value::as_str).unwrap_or("").to_string();
            }
        }
        String::new()
    }
}

impl Provider for MondayProvider {
    fn platform(&self) -> Platform {
        Platform::Monday
    }

    fn name(&self) -> &'static str {
        "Monday.com"
    }

    fn can_handle(&self, input: &str) -> bool {
        let input = input.trim();
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
            platform: Platform::Monday,
            input: input.to_string(),
            expected: "a numeric item id or https://<workspace>.monday.com/boards/<board>/pulses/<id>",
        })
    }

    fn normalize(&self, raw: &Value, id: Option<&str>) -> GenericTicket {
        let ticket_id = {
            // Monday returns ids as strings or numbers depending on the API.
            let from_raw = raw
                .get("id")
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .filter(|s| !s.is_empty() && s != "null");
            from_raw.or_else(|| id.map(str::to_string)).unwrap_or_default()
        };

        let title = str_field(raw, "name");
        let state = str_field(raw, "state");
        let status = if state.eq_ignore_ascii_case("archived")
            || state.eq_ignore_ascii_case("deleted")
        {
            TicketStatus::Closed
        } else {
            Self::map_status_text(&Self::status_column_text(raw))
        };

        GenericTicket {
            branch_summary: sanitize_title_for_branch(&title),
            id: ticket_id,
            platform: Platform::Monday,
            url: str_field(raw, "url"),
            title,
            description: str_field(raw, "description"),
            status,
            // Monday items carry no type signal the mapper trusts.
            ty: TicketType::Unknown,
            assignee: None,
            labels: Vec::new(),
            created_at: datetime_field(raw, "created_at"),
            updated_at: datetime_field(raw, "updated_at"),
            platform_metadata: collect_metadata(raw, &["board", "group", "column_values"]),
        }
    }

    fn prompt_template(&self) -> &'static str {
        PROMPT_TEMPLATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> MondayProvider {
        MondayProvider::new(&ProviderContext::default())
    }

    #[test]
    fn test_parse_pulse_url() {
        assert_eq!(
            provider()
                .parse_input("https://acme.monday.com/boards/123/pulses/456")
                .unwrap(),
            "456"
        );
        assert_eq!(provider().parse_input("456").unwrap(), "456");
        assert!(provider().parse_input("item-456").is_err());
    }

    #[test]
    fn test_status_from_status_column() {
        let raw = json!({
            "id": "1",
            "name": "Item",
            "state": "active",
            "column_values": [
                {"title": "Owner", "text": "sam"},
                {"title": "Status", "text": "Working on it"},
            ]
        });
        assert_eq!(provider().normalize(&raw, None).status, TicketStatus::InProgress);
    }

    #[test]
    fn test_archived_state_wins() {
        let raw = json!({
            "id": "1",
            "name": "Item",
            "state": "archived",
            "column_values": [{"title": "Status", "text": "Working on it"}]
        });
        assert_eq!(provider().normalize(&raw, None).status, TicketStatus::Closed);
    }

    #[test]
    fn test_numeric_id_tolerated() {
        let raw = json!({"id": 456, "name": "Item"});
        assert_eq!(provider().normalize(&raw, None).id, "456");
    }

    #[test]
    fn test_normalize_empty_payload() {
        let ticket = provider().normalize(&json!({}), Some("9"));
        assert_eq!(ticket.id, "9");
        assert_eq!(ticket.status, TicketStatus::Unknown);
    }
}
