//! # Provider Trait
//!
//! Per-platform input recognition and raw-JSON → [`GenericTicket`]
//! normalization.
//!
//! A provider never fetches anything. It answers three questions:
//!
//! 1. Does this input (URL, short-link, bare id) look like mine?
//! 2. What is the normalized ticket id inside it?
//! 3. Given the platform's raw JSON, what is the normalized ticket?
//!
//! Normalization is total: missing or null fields become empty strings,
//! empty lists, or `Unknown` enums; it must not fail.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{GenericTicket, Platform};

// ============================================================================
// ERRORS
// ============================================================================

/// Input-parsing failure.
#[derive(Debug, thiserror::Error)]
#[error("cannot parse {platform} ticket from input '{input}' (expected {expected})")]
pub struct TicketIdFormatError {
    pub platform: Platform,
    pub input: String,
    pub expected: &'static str,
}

// ============================================================================
// USER INTERACTION
// ============================================================================

/// Interface for the rare prompts providers and the registry need
/// (disambiguating `PROJ-123`-style inputs that several platforms claim).
pub trait UserInteraction: Send + Sync {
    /// Ask the user to pick one option; `None` means no choice was made
    /// (non-interactive context or cancelled prompt).
    fn choose(&self, prompt: &str, options: &[String]) -> Option<usize>;
}

/// Non-interactive implementation: never chooses, callers fall back to
/// their default candidate.
pub struct NonInteractive;

impl UserInteraction for NonInteractive {
    fn choose(&self, _prompt: &str, _options: &[String]) -> Option<usize> {
        None
    }
}

/// CLI implementation reading a numbered choice from stdin.
pub struct CliInteraction;

impl UserInteraction for CliInteraction {
    fn choose(&self, prompt: &str, options: &[String]) -> Option<usize> {
        use std::io::Write;

        println!("{prompt}");
        for (i, option) in options.iter().enumerate() {
            println!("  {}. {option}", i + 1);
        }
        print!("Choice [1-{}]: ", options.len());
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return None;
        }
        let index: usize = line.trim().parse().ok()?;
        (1..=options.len()).contains(&index).then(|| index - 1)
    }
}

// ============================================================================
// PROVIDER CONTEXT
// ============================================================================

/// Dependency-injection context handed to providers at instantiation.
#[derive(Clone)]
pub struct ProviderContext {
    /// Free-form config values (e.g. `default_jira_project`, `github_hosts`).
    pub config: BTreeMap<String, String>,
    pub interaction: Arc<dyn UserInteraction>,
}

impl ProviderContext {
    pub fn new(config: BTreeMap<String, String>, interaction: Arc<dyn UserInteraction>) -> Self {
        Self { config, interaction }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

impl Default for ProviderContext {
    fn default() -> Self {
        Self { config: BTreeMap::new(), interaction: Arc::new(NonInteractive) }
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// Platform-specific input parsing and normalization.
pub trait Provider: Send + Sync {
    fn platform(&self) -> Platform;

    /// Human-readable provider name.
    fn name(&self) -> &'static str;

    /// Whether the input looks like this platform's URL or id form.
    /// Ambiguous forms (`PROJ-123` matches Jira and Linear) return true;
    /// the registry's detector resolves the ambiguity upstream.
    fn can_handle(&self, input: &str) -> bool;

    /// Extract the normalized ticket id from a URL, short-link, or bare id.
    fn parse_input(&self, input: &str) -> Result<String, TicketIdFormatError>;

    /// Pure raw-JSON → ticket transformation. Total: tolerates missing and
    /// null fields.
    fn normalize(&self, raw: &Value, id: Option<&str>) -> GenericTicket;

    /// Structured prompt with a single `{ticket_id}` placeholder for
    /// agent-mediated fetching.
    fn prompt_template(&self) -> &'static str;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").field("name", &self.name()).finish()
    }
}

// ============================================================================
// NORMALIZATION HELPERS
// ============================================================================

/// String at a top-level key; empty string for missing/null/non-string.
pub(crate) fn str_field(raw: &Value, key: &str) -> String {
    raw.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// String at a nested path; empty string when any hop is missing.
pub(crate) fn str_path(raw: &Value, path: &[&str]) -> String {
    let mut current = raw;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    current.as_str().unwrap_or_default().to_string()
}

/// RFC 3339 timestamp at a top-level key, if parseable.
pub(crate) fn datetime_field(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    raw.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Copy selected keys into the opaque metadata map, skipping nulls.
pub(crate) fn collect_metadata(raw: &Value, keys: &[&str]) -> BTreeMap<String, Value> {
    let mut metadata = BTreeMap::new();
    for key in keys {
        if let Some(value) = raw.get(key) {
            if !value.is_null() {
                metadata.insert((*key).to_string(), value.clone());
            }
        }
    }
    metadata
}

/// Label names from a list of either plain strings or `{"name": ...}`
/// objects (platforms disagree on the shape).
pub(crate) fn label_names(value: Option<&Value>) -> Vec<String> {
    let Some(list) = value.and_then(Value::as_array) else { return Vec::new() };
    list.iter()
        .filter_map(|item| {
            item.as_str()
                .map(str::to_string)
                .or_else(|| item.get("name").and_then(Value::as_str).map(str::to_string))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_str_field_tolerates_missing_and_null() {
        let raw = json!({"a": "x", "b": null, "c": 7});
        assert_eq!(str_field(&raw, "a"), "x");
        assert_eq!(str_field(&raw, "b"), "");
        assert_eq!(str_field(&raw, "c"), "");
        assert_eq!(str_field(&raw, "missing"), "");
    }

    #[test]
    fn test_str_path_walks_nested() {
        let raw = json!({"state": {"name": "Todo"}});
        assert_eq!(str_path(&raw, &["state", "name"]), "Todo");
        assert_eq!(str_path(&raw, &["state", "type"]), "");
        assert_eq!(str_path(&raw, &["missing", "name"]), "");
    }

    #[test]
    fn test_label_names_both_shapes() {
        let objects = json!([{"name": "bug"}, {"name": "p1"}]);
        assert_eq!(label_names(Some(&objects)), vec!["bug", "p1"]);
        let strings = json!(["bug", "p1"]);
        assert_eq!(label_names(Some(&strings)), vec!["bug", "p1"]);
        assert!(label_names(None).is_empty());
    }

    #[test]
    fn test_datetime_field() {
        let raw = json!({"created": "2026-01-11T12:00:00Z", "bad": "yesterday"});
        assert!(datetime_field(&raw, "created").is_some());
        assert!(datetime_field(&raw, "bad").is_none());
        assert!(datetime_field(&raw, "missing").is_none());
    }

    #[test]
    fn test_collect_metadata_skips_nulls() {
        let raw = json!({"priority": "High", "team": null});
        let metadata = collect_metadata(&raw, &["priority", "team", "missing"]);
        assert_eq!(metadata.len(), 1);
        assert!(metadata.contains_key("priority"));
    }
}
