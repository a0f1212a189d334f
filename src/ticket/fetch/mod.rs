//! # Ticket Fetchers
//!
//! Two paths produce raw ticket JSON:
//!
//! - [`agent::AgentMediatedFetcher`] - asks the AI backend's own platform
//!   integrations and parses JSON out of free-text output
//! - [`direct::DirectApiFetcher`] - typed HTTP calls against the platform's
//!   REST or GraphQL API, with retry
//!
//! Both satisfy [`TicketFetcher`]. Handler-internal failures are mapped into
//! the unified [`FetchError`] taxonomy at the fetcher boundary; downstream
//! code (the ticket service) only ever sees the unified set.

pub mod agent;
pub mod direct;
pub mod handlers;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::Platform;

// ============================================================================
// ERROR TAXONOMY
// ============================================================================

/// Unified fetch failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// This fetcher cannot handle this platform; use another fetcher.
    #[error("fetcher '{fetcher_name}' does not support platform '{platform}'")]
    PlatformNotSupported { platform: Platform, fetcher_name: String },

    /// The agent/backend is misconfigured or unavailable.
    #[error("agent integration error ({agent_name}): {message}")]
    AgentIntegration { agent_name: String, message: String },

    /// The fetch itself failed: network, platform API, or a semantic
    /// not-found.
    #[error("fetch failed ({agent_name}): {message}")]
    AgentFetch { agent_name: String, message: String },

    /// The response could not be parsed as expected. Keeps the raw response
    /// for diagnosis.
    #[error("could not parse agent response ({agent_name}): {message}")]
    AgentResponseParse { agent_name: String, message: String, raw_response: Option<String> },
}

impl FetchError {
    pub fn integration(agent_name: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::AgentIntegration { agent_name: agent_name.into(), message: message.into() }
    }

    pub fn fetch(agent_name: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::AgentFetch { agent_name: agent_name.into(), message: message.into() }
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// A source of raw ticket JSON.
#[async_trait]
pub trait TicketFetcher: Send + Sync {
    /// Human-readable fetcher name for diagnostics.
    fn name(&self) -> &str;

    /// Whether this fetcher can serve the platform.
    fn supports_platform(&self, platform: Platform) -> bool;

    /// Fetch the raw platform JSON for a ticket.
    async fn fetch_raw(&self, ticket_id: &str, platform: Platform) -> Result<Value, FetchError>;

    /// Release held resources. Idempotent.
    async fn close(&self) {}
}

// ============================================================================
// JSON EXTRACTION
// ============================================================================

static FENCED_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9]*)[ \t]*\r?\n(.*?)```").expect("valid regex")
});

/// Extract a JSON object from free-text agent output.
///
/// Discipline, in order:
///
/// 1. Bare JSON: the trimmed output itself parses as an object.
/// 2. Fenced code blocks: a ```` ```json ````-tagged block is preferred over
///    an untagged one; the first matching block wins.
/// 3. The first balanced `{…}` substring in the text.
///
/// Empty output and extraction/parse failures yield `Err` with a message;
/// the caller wraps it into `AgentResponseParse` with the raw response.
pub fn extract_json_from_text(output: &str) -> Result<Value, String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err("empty response".to_string());
    }

    // 1. Bare JSON object.
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    // 2. Fenced code blocks; json-tagged preferred over untagged.
    let blocks: Vec<(String, String)> = FENCED_BLOCK_RE
        .captures_iter(trimmed)
        .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
        .collect();
    let selected = blocks
        .iter()
        .find(|(tag, _)| tag == "json")
        .or_else(|| blocks.iter().find(|(tag, _)| tag.is_empty()))
        .or_else(|| blocks.first());
    if let Some((_, content)) = selected {
        return match serde_json::from_str::<Value>(content.trim()) {
            Ok(value) if value.is_object() => Ok(value),
            Ok(_) => Err("code block did not contain a JSON object".to_string()),
            Err(e) => Err(format!("invalid JSON in code block: {e}")),
        };
    }

    // 3. First balanced brace substring.
    if let Some(candidate) = first_balanced_object(trimmed) {
        return match serde_json::from_str::<Value>(candidate) {
            Ok(value) if value.is_object() => Ok(value),
            Ok(_) => Err("extracted text was not a JSON object".to_string()),
            Err(e) => Err(format!("invalid JSON in extracted text: {e}")),
        };
    }

    Err("no JSON object found in response".to_string())
}

/// First `{…}` substring with balanced braces, string-aware so braces
/// inside quoted values do not confuse the depth counter.
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================
