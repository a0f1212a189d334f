//! Trello provider.
//!
//! Cards are identified by 8-character short links. Status is inferred from
//! the containing list's name, with one override: a closed (archived) card
//! is always Closed, whatever list it sits in.

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

/// Card URL: `https://trello.com/c/<shortLink>[/slug]`.
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://trello\.com/c/(?P<short>[A-Za-z0-9]{8})(?:/[^\s]*)?$")
        .expect("valid regex")
});

/// Bare short link: exactly 8 alphanumerics.
static SHORT_LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{8}$").expect("valid regex"));

/// A bare short link must contain a digit so plain 8-letter words are not
/// swallowed.
fn is_short_link(input: &str) -> bool {
    SHORT_LINK_PATTERN.is_match(input) && input.bytes().any(|b| b.is_ascii_digit())
}

const PROMPT_TEMPLATE: &str = r#"Use your Trello tool to fetch card {ticket_id}.

Return ONLY a JSON object with these fields (no markdown, no explanation):
{
  "id": "card id",
  "name": "card title",
  "desc": "card description",
  "closed": false,
  "list": { "name": "Doing" },
  "labels": [{ "name": "label1" }],
  "shortUrl": "https://trello.com/c/...",
  "dateLastActivity": "ISO datetime"
}"#;

pub struct TrelloProvider;

impl TrelloProvider {
    pub fn new(_context: &ProviderContext) -> Self {
        Self
    }

    fn map_list_name(list_name: &str) -> TicketStatus {
        match list_name.trim().to_ascii_lowercase().as_str() {
            "" => TicketStatus::Unknown,
            "to do" | "todo" | "backlog" | "open" | "inbox" => TicketStatus::Open,
            "doing" | "in progress" | "working" => TicketStatus::InProgress,
            "review" | "in review" | "testing" => TicketStatus::Review,
            "blocked" | "stuck" | "on hold" => TicketStatus::Blocked,
            "done" | "complete" | "completed" => TicketStatus::Done,
            "archive" | "archived" | "closed" => TicketStatus::Closed,
            _ => TicketStatus::Unknown,
        }
    }

    fn map_type(labels: &[String]) -> TicketType {
        let has = |needle: &str| labels.iter().any(|l| l.to_ascii_lowercase().contains(needle));
        if has("bug") {
            TicketType::Bug
        } else if has("feature") || has("enhancement") {
            TicketType::Feature
        } else if has("chore") || has("maintenance") {
            TicketType::Maintenance
        } else if has("task") {
            TicketType::Task
        } else {
            TicketType::Unknown
        }
    }
}

impl Provider for TrelloProvider {
    fn platform(&self) -> Platform {
        Platform::Trello
    }

    fn name(&self) -> &'static str {
        "Trello"
    }

    fn can_handle(&self, input: &str) -> bool {
        let input = input.trim();
        URL_PATTERN.is_match(input) || is_short_link(input)
    }

    fn parse_input(&self, input: &str) -> Result<String, TicketIdFormatError> {
        let input = input.trim();
        if let Some(captures) = URL_PATTERN.captures(input) {
            return Ok(captures["short"].to_string());
        }
        if is_short_link(input) {
            return Ok(input.to_string());
        }
        Err(TicketIdFormatError {
            platform: Platform::Trello,
            input: input.to_string(),
            expected: "an 8-character card short link or https://trello.com/c/<shortLink>",
        })
    }

    fn normalize(&self, raw: &Value, id: Option<&str>) -> GenericTicket {
        let ticket_id = {
            let short = str_field(raw, "shortLink");
            if !short.is_empty() {
                short
            } else {
                let raw_id = str_field(raw, "id");
                if raw_id.is_empty() { id.unwrap_or_default().to_string() } else { raw_id }
            }
        };

        let title = str_field(raw, "name");
        let labels = label_names(raw.get("labels"));

        // Closed override: archived cards are Closed regardless of list.
        let closed = raw.get("closed").and_then(Value::as_bool).unwrap_or(false);
        let status = if closed {
            TicketStatus::Closed
        } else {
            Self::map_list_name(&str_path(raw, &["list", "name"]))
        };

        GenericTicket {
            branch_summary: sanitize_title_for_branch(&title),
            id: ticket_id,
            platform: Platform::Trello,
            url: {
                let short_url = str_field(raw, "shortUrl");
                if short_url.is_empty() { str_field(raw, "url") } else { short_url }
            },
            title,
            description: str_field(raw, "desc"),
            status,
            ty: Self::map_type(&labels),
            assignee: None,
            labels,
            created_at: None,
            updated_at: datetime_field(raw, "dateLastActivity"),
            platform_metadata: collect_metadata(raw, &["idList", "idBoard", "due", "closed"]),
        }
    }

    fn prompt_template(&self) -> &'static str {
        PROMPT_TEMPLATE
    }
}
