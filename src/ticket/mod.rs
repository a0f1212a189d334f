//! # Ticket Domain Types
//!
//! Normalized ticket model shared by every provider and fetcher.
//!
//! Each issue-tracker platform speaks its own JSON dialect; providers
//! translate those dialects into [`GenericTicket`], the single record the
//! rest of the system understands. Tickets are immutable after
//! construction; consumers that need a variant clone and modify.
//!
//! ## Modules
//!
//! - [`auth`] - Fallback credential bundles per platform
//! - [`cache`] - TTL + LRU ticket cache (memory or file backed)
//! - [`fetch`] - Agent-mediated and direct-API fetchers
//! - [`provider`] - The `Provider` trait
//! - [`providers`] - Per-platform provider implementations
//! - [`registry`] - Platform detection and provider singletons
//! - [`service`] - The cache → primary → fallback orchestration

pub mod auth;
pub mod cache;
pub mod fetch;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod service;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PLATFORM
// ============================================================================

/// Supported issue-tracker platforms.
///
/// The textual names returned by [`Platform::name`] are stable: they are
/// embedded in cache keys and config keys and must not change between
/// releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Jira,
    Linear,
    GitHub,
    AzureDevOps,
    Monday,
    Trello,
}

impl Platform {
    /// All platforms, in registration order.
    pub const ALL: [Platform; 6] = [
        Platform::Jira,
        Platform::Linear,
        Platform::GitHub,
        Platform::AzureDevOps,
        Platform::Monday,
        Platform::Trello,
    ];

    /// Stable uppercase name used in cache keys and config keys.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Jira => "JIRA",
            Platform::Linear => "LINEAR",
            Platform::GitHub => "GITHUB",
            Platform::AzureDevOps => "AZURE_DEVOPS",
            Platform::Monday => "MONDAY",
            Platform::Trello => "TRELLO",
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Jira => "Jira",
            Platform::Linear => "Linear",
            Platform::GitHub => "GitHub",
            Platform::AzureDevOps => "Azure DevOps",
            Platform::Monday => "Monday.com",
            Platform::Trello => "Trello",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a platform name cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: '{0}'")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    /// Case-insensitive lookup; accepts both `AZURE_DEVOPS` and `azuredevops`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "JIRA" => Ok(Platform::Jira),
            "LINEAR" => Ok(Platform::Linear),
            "GITHUB" => Ok(Platform::GitHub),
            "AZURE_DEVOPS" | "AZUREDEVOPS" | "AZURE" => Ok(Platform::AzureDevOps),
            "MONDAY" => Ok(Platform::Monday),
            "TRELLO" => Ok(Platform::Trello),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}

// ============================================================================
// STATUS / TYPE
// ============================================================================

/// Normalized ticket status.
///
/// Providers map platform-native states into this set; `Unknown` is reserved
/// for states the mapper does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Review,
    Blocked,
    Done,
    Closed,
    Unknown,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Review => "review",
            TicketStatus::Blocked => "blocked",
            TicketStatus::Done => "done",
            TicketStatus::Closed => "closed",
            TicketStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Normalized ticket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    Bug,
    Feature,
    Task,
    Maintenance,
    Unknown,
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketType::Bug => "bug",
            TicketType::Feature => "feature",
            TicketType::Task => "task",
            TicketType::Maintenance => "maintenance",
            TicketType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

// ============================================================================
// GENERIC TICKET
// ============================================================================

/// Normalized ticket record, platform-agnostic.
///
/// Constructed once by a provider's `normalize` and never mutated. The
/// `platform_metadata` map carries provider-specific extras (priority,
/// team, project) opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericTicket {
    /// Platform-unique identifier (e.g. `PROJ-123`, `owner/repo#42`).
    pub id: String,
    pub platform: Platform,
    /// Canonical web URL; empty string when unrecoverable.
    pub url: String,
    pub title: String,
    /// Empty string when the platform has no description.
    pub description: String,
    pub status: TicketStatus,
    #[serde(rename = "type")]
    pub ty: TicketType,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// URL-slug-safe projection of `title`, usable as a git branch component.
    pub branch_summary: String,
    /// Provider-specific extras, opaque to the rest of the system.
    pub platform_metadata: BTreeMap<String, serde_json::Value>,
}

impl GenericTicket {
    /// Build a minimal ticket carrying just an id. Used when a fetch fails
    /// and the workflow continues with the id alone.
    pub fn with_id_only(id: impl Into<String>, platform: Platform) -> Self {
        let id = id.into();
        Self {
            id,
            platform,
            url: String::new(),
            title: String::new(),
            description: String::new(),
            status: TicketStatus::Unknown,
            ty: TicketType::Unknown,
            assignee: None,
            labels: Vec::new(),
            created_at: None,
            updated_at: None,
            branch_summary: String::new(),
            platform_metadata: BTreeMap::new(),
        }
    }
}

// ============================================================================
// BRANCH SLUG
// ============================================================================

/// Maximum length of a branch summary slug.
const BRANCH_SUMMARY_MAX_LEN: usize = 50;

/// Project a ticket title onto a slug safe for use as a git branch component.
///
/// Lowercases, collapses every run of non-alphanumerics into a single `-`,
/// trims leading/trailing dashes, and truncates at a word boundary.
pub fn sanitize_title_for_branch(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();

    if slug.len() <= BRANCH_SUMMARY_MAX_LEN {
        return slug;
    }
    // Truncate at the last dash before the cap so no word is cut mid-way.
    match slug[..BRANCH_SUMMARY_MAX_LEN].rfind('-') {
        Some(idx) if idx > 0 => slug[..idx].to_string(),
        _ => slug[..BRANCH_SUMMARY_MAX_LEN].to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_name_stability() {
        assert_eq!(Platform::Jira.name(), "JIRA");
        assert_eq!(Platform::AzureDevOps.name(), "AZURE_DEVOPS");
    }

    #[test]
    fn test_platform_from_str_case_insensitive() {
        for raw in ["jira", "JIRA", "Jira", " jira "] {
            assert_eq!(raw.parse::<Platform>().unwrap(), Platform::Jira);
        }
        assert_eq!("azure-devops".parse::<Platform>().unwrap(), Platform::AzureDevOps);
        assert_eq!("azure_devops".parse::<Platform>().unwrap(), Platform::AzureDevOps);
    }

    #[test]
    fn test_platform_from_str_unknown() {
        assert!("gitlab".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_roundtrip_through_name() {
        for platform in Platform::ALL {
            assert_eq!(platform.name().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn test_sanitize_title_basic() {
        assert_eq!(
            sanitize_title_for_branch("Add GraphQL query to fetch account"),
            "add-graphql-query-to-fetch-account"
        );
    }

    #[test]
    fn test_sanitize_title_collapses_special_chars() {
        assert_eq!(sanitize_title_for_branch("Fix: [API] broken!!"), "fix-api-broken");
    }

    #[test]
    fn test_sanitize_title_truncates_at_word_boundary() {
        let slug = sanitize_title_for_branch(
            "This is a very long ticket title that certainly exceeds the slug cap",
        );
        assert!(slug.len() <= BRANCH_SUMMARY_MAX_LEN);
        assert!(!slug.ends_with('-'));
        // No word is cut in the middle.
        assert!("this-is-a-very-long-ticket-title-that-certainly-exceeds-the-slug-cap"
            .starts_with(&slug));
    }

    #[test]
    fn test_sanitize_title_empty() {
        assert_eq!(sanitize_title_for_branch(""), "");
        assert_eq!(sanitize_title_for_branch("!!!"), "");
    }

    #[test]
    fn test_ticket_with_id_only() {
        let ticket = GenericTicket::with_id_only("PROJ-1", Platform::Jira);
        assert_eq!(ticket.id, "PROJ-1");
        assert_eq!(ticket.status, TicketStatus::Unknown);
        assert!(ticket.labels.is_empty());
    }

    #[test]
    fn test_ticket_serde_roundtrip() {
        let ticket = GenericTicket {
            id: "TEAM-9".into(),
            platform: Platform::Linear,
            url: "https://linear.app/team/issue/TEAM-9".into(),
            title: "Do the thing".into(),
            description: String::new(),
            status: TicketStatus::InProgress,
            ty: TicketType::Feature,
            assignee: Some("sam".into()),
            labels: vec!["feature".into()],
            created_at: None,
            updated_at: None,
            branch_summary: "do-the-thing".into(),
            platform_metadata: BTreeMap::new(),
        };
        let json = serde_json::to_string(&ticket).unwrap();
        let back: GenericTicket = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ticket);
    }
}
