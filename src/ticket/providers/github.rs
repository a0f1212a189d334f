//! GitHub provider.
//!
//! Recognises `github.com` unconditionally and enterprise hosts only when a
//! configured host list permits them. Issue and PR URLs both map to the
//! canonical `owner/repo#number` id form.
//!
//! Status combines `state`, `state_reason`, and labels: an open issue with a
//! `blocked` label is Blocked, a closed issue is Done only when
//! `state_reason` says `completed`.

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

/// Issue/PR URL path: `/owner/repo/(issues|pull)/42`.
static URL_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(?P<owner>[^/\s]+)/(?P<repo>[^/\s]+)/(?:issues|pull)/(?P<number>\d+)(?:[/?#].*)?$")
        .expect("valid regex")
});

/// Bare id: `owner/repo#42`.
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<owner>[^/\s#]+)/(?P<repo>[^/\s#]+)#(?P<number>\d+)$").expect("valid regex")
});

const PROMPT_TEMPLATE: &str = r#"Use your GitHub API tool to fetch issue or PR {ticket_id}.

The ticket_id format is "owner/repo#number" (e.g., "microsoft/vscode#12345").

Return ONLY a JSON object with these fields (no markdown, no explanation):
{
  "number": 123,
  "title": "issue/PR title",
  "body": "full description text",
  "state": "open|closed",
  "state_reason": "completed|not_planned|reopened|null",
  "user": { "login": "username" },
  "assignee": { "login": "username" } or null,
  "labels": [{ "name": "label1" }],
  "created_at": "ISO datetime",
  "updated_at": "ISO datetime",
  "html_url": "https://github.com/..."
}"#;

/// A configured enterprise host: hostname plus an optional port. A spec
/// without a port matches any port on that hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HostSpec {
    host: String,
    port: Option<u16>,
}

impl HostSpec {
    /// Parse one entry from the host list. Scheme is optional; anything
    /// after the authority is ignored.
    fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        let authority = entry
            .strip_prefix("https://")
            .or_else(|| entry.strip_prefix("http://"))
            .unwrap_or(entry);
        let authority = authority.split(['/', '?', '#']).next().unwrap_or("");
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => (host, Some(port)),
                Err(_) => (authority, None),
            },
            None => (authority, None),
        };
        if host.is_empty() {
            return None;
        }
        Some(Self { host: host.to_ascii_lowercase(), port })
    }

    fn matches(&self, host: &str, port: Option<u16>) -> bool {
        if !self.host.eq_ignore_ascii_case(host) {
            return false;
        }
        match self.port {
            // A configured no-port host matches any port.
            None => true,
            Some(expected) => port == Some(expected),
        }
    }
}

pub struct GitHubProvider {
    extra_hosts: Vec<HostSpec>,
}

impl GitHubProvider {
    pub fn new(context: &ProviderContext) -> Self {
        let mut extra_hosts: Vec<HostSpec> = context
            .get("github_hosts")
            .map(|list| list.split(',').filter_map(HostSpec::parse).collect())
            .unwrap_or_default();
        // A configured enterprise base URL counts as an allowed host too.
        if let Some(spec) = context.get("github_base_url").and_then(HostSpec::parse) {
            if !extra_hosts.contains(&spec) {
                extra_hosts.push(spec);
            }
        }
        Self { extra_hosts }
    }

    fn host_allowed(&self, host: &str, port: Option<u16>) -> bool {
        if host.eq_ignore_ascii_case("github.com") || host.eq_ignore_ascii_case("www.github.com") {
            return true;
        }
        self.extra_hosts.iter().any(|spec| spec.matches(host, port))
    }

    /// Extract `owner/repo#number` from a URL on an allowed host.
    fn parse_url(&self, input: &str) -> Option<String> {
        let parsed = url::Url::parse(input).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        let host = parsed.host_str()?;
        if !self.host_allowed(host, parsed.port()) {
            return None;
        }
        let captures = URL_PATH_PATTERN.captures(parsed.path())?;
        Some(format!("{}/{}#{}", &captures["owner"], &captures["repo"], &captures["number"]))
    }

    fn map_status(state: &str, state_reason: &str, labels: &[String]) -> TicketStatus {
        let has_label = |needle: &str| labels.iter().any(|l| l.eq_ignore_ascii_case(needle));
        match state.trim().to_ascii_lowercase().as_str() {
            "open" => {
                if has_label("blocked") {
                    TicketStatus::Blocked
                } else if has_label("in progress") || has_label("wip") {
                    TicketStatus::InProgress
                } else if has_label("review") || has_label("needs review") {
                    TicketStatus::Review
                } else {
                    TicketStatus::Open
                }
            }
            "closed" => match state_reason.trim().to_ascii_lowercase().as_str() {
                "completed" => TicketStatus::Done,
                _ => TicketStatus::Closed,
            },
            "" => TicketStatus::Unknown,
            _ => TicketStatus::Unknown,
        }
    }

    fn map_type(labels: &[String]) -> TicketType {
        let has = |needle: &str| labels.iter().any(|l| l.to_ascii_lowercase().contains(needle));
        if has("bug") || has("regression") {
            TicketType::Bug
        } else if has("enhancement") || has("feature") {
            TicketType::Feature
        } else if has("chore") || has("maintenance") || has("dependencies") || has("refactor") {
            TicketType::Maintenance
        } else if has("task") {
            TicketType::Task
        } else {
            TicketType::Unknown
        }
    }
}

impl Provider for GitHubProvider {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    fn name(&self) -> &'static str {
        "GitHub"
    }

    fn can_handle(&self, input: &str) -> bool {
        let input = input.trim();
        ID_PATTERN.is_match(input) || self.parse_url(input).is_some()
    }

    fn parse_input(&self, input: &str) -> Result<String, TicketIdFormatError> {
        let input = input.trim();
        if let Some(captures) = ID_PATTERN.captures(input) {
            return Ok(format!(
                "{}/{}#{}",
                &captures["owner"], &captures["repo"], &captures["number"]
            ));
        }
        if let Some(id) = self.parse_url(input) {
            return Ok(id);
        }
        Err(TicketIdFormatError {
            platform: Platform::GitHub,
            input: input.to_string(),
            expected: "owner/repo#42 or https://github.com/owner/repo/issues/42",
        })
    }

    fn normalize(&self, raw: &Value, id: Option<&str>) -> GenericTicket {
        let ticket_id = match id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                // Reconstruct from html_url + number when no id was passed.
                let number = raw.get("number").and_then(Value::as_u64);
                match (self.parse_url(&str_field(raw, "html_url")), number) {
                    (Some(from_url), _) => from_url,
                    (None, Some(number)) => format!("#{number}"),
                    (None, None) => String::new(),
                }
            }
        };

        let title = str_field(raw, "title");
        let labels = label_names(raw.get("labels"));
        let state = str_field(raw, "state");
        let state_reason = str_field(raw, "state_reason");

        GenericTicket {
            branch_summary: sanitize_title_for_branch(&title),
            id: ticket_id,
            platform: Platform::GitHub,
            url: str_field(raw, "html_url"),
            title,
            description: str_field(raw, "body"),
            status: Self::map_status(&state, &state_reason, &labels),
            ty: Self::map_type(&labels),
            assignee: {
                let login = str_path(raw, &["assignee", "login"]);
                (!login.is_empty()).then_some(login)
            },
            labels,
            created_at: datetime_field(raw, "created_at"),
            updated_at: datetime_field(raw, "updated_at"),
            platform_metadata: collect_metadata(raw, &["milestone", "user", "number", "draft"]),
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

    fn provider() -> GitHubProvider {
        GitHubProvider::new(&ProviderContext::default())
    }

    fn provider_with_hosts(hosts: &str) -> GitHubProvider {
        let mut config = BTreeMap::new();
        config.insert("github_hosts".to_string(), hosts.to_string());
        GitHubProvider::new(&ProviderContext::new(config, Arc::new(NonInteractive)))
    }

    #[test]
    fn test_can_handle_github_com() {
        let p = provider();
        assert!(p.can_handle("https://github.com/rust-lang/rust/issues/1"));
        assert!(p.can_handle("https://github.com/rust-lang/rust/pull/99"));
        assert!(p.can_handle("rust-lang/rust#1"));
    }

    #[test]
    fn test_enterprise_host_requires_allowlist() {
        assert!(!provider().can_handle("https://git.corp.example/o/r/issues/1"));
        let p = provider_with_hosts("git.corp.example");
        assert!(p.can_handle("https://git.corp.example/o/r/issues/1"));
    }

    #[test]
    fn test_configured_no_port_host_matches_any_port() {
        let p = provider_with_hosts(" git.corp.example ,other.example:8443");
        assert!(p.can_handle("https://git.corp.example:8443/o/r/issues/1"));
        assert!(p.can_handle("https://other.example:8443/o/r/issues/1"));
        assert!(!p.can_handle("https://other.example:9000/o/r/issues/1"));
    }

    #[test]
    fn test_host_spec_scheme_optional() {
        assert_eq!(HostSpec::parse("https://ghe.corp"), HostSpec::parse("ghe.corp"));
    }

    #[test]
    fn test_github_base_url_joins_allowlist() {
        let mut config = BTreeMap::new();
        config.insert("github_base_url".to_string(), "https://ghe.corp.example".to_string());
        let p = GitHubProvider::new(&ProviderContext::new(config, Arc::new(NonInteractive)));
        assert!(p.can_handle("https://ghe.corp.example/o/r/issues/3"));
    }

    #[test]
    fn test_parse_input_canonical_form() {
        assert_eq!(
            provider().parse_input("https://github.com/rust-lang/rust/issues/42").unwrap(),
            "rust-lang/rust#42"
        );
        assert_eq!(provider().parse_input("a/b#7").unwrap(), "a/b#7");
        assert!(provider().parse_input("not-github").is_err());
    }

    #[test]
    fn test_status_open_with_blocked_label() {
        let status = GitHubProvider::map_status("open", "", &["Blocked".to_string()]);
        assert_eq!(status, TicketStatus::Blocked);
    }

    #[test]
    fn test_status_closed_completed_vs_not_planned() {
        assert_eq!(GitHubProvider::map_status("closed", "completed", &[]), TicketStatus::Done);
        assert_eq!(GitHubProvider::map_status("closed", "not_planned", &[]), TicketStatus::Closed);
        assert_eq!(GitHubProvider::map_status("closed", "", &[]), TicketStatus::Closed);
    }

    #[test]
    fn test_normalize_full_payload() {
        let raw = json!({
            "number": 42,
            "title": "Fix the build",
            "body": "It is broken",
            "state": "open",
            "labels": [{"name": "bug"}],
            "assignee": {"login": "dev1"},
            "html_url": "https://github.com/a/b/issues/42",
            "created_at": "2026-01-11T10:00:00Z",
        });
        let ticket = provider().normalize(&raw, Some("a/b#42"));
        assert_eq!(ticket.id, "a/b#42");
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.ty, TicketType::Bug);
        assert_eq!(ticket.assignee.as_deref(), Some("dev1"));
        assert_eq!(ticket.branch_summary, "fix-the-build");
    }

    #[test]
    fn test_normalize_empty_payload() {
        let ticket = provider().normalize(&json!({}), Some("a/b#1"));
        assert_eq!(ticket.status, TicketStatus::Unknown);
        assert_eq!(ticket.ty, TicketType::Unknown);
    }

    #[test]
    fn test_prompt_template_has_placeholder() {
        assert!(provider().prompt_template().contains("{ticket_id}"));
    }
}
