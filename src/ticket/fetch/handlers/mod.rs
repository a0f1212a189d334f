//! # Platform API Handlers
//!
//! One handler per platform, encapsulating endpoint construction, the
//! platform's authentication scheme, and response validation. Handlers
//! return [`HandlerError`]s; the direct fetcher maps those into the unified
//! taxonomy and owns the retry loop.
//!
//! Authentication schemes:
//!
//! | Platform | Scheme |
//! |---|---|
//! | Jira | basic auth (email + API token) |
//! | Linear | `Authorization` header token, GraphQL |
//! | GitHub | bearer token |
//! | Azure DevOps | basic auth (empty user + PAT) |
//! | Monday | `Authorization` header token, GraphQL |
//! | Trello | query-string key + token |

mod azure_devops;
mod github;
mod jira;
mod linear;
mod monday;
mod trello;

pub use azure_devops::AzureDevOpsHandler;
pub use github::GitHubHandler;
pub use jira::JiraHandler;
pub use linear::LinearHandler;
pub use monday::MondayHandler;
pub use trello::TrelloHandler;

use async_trait::async_trait;
use serde_json::Value;

use crate::ticket::auth::Credentials;

// ============================================================================
// ERRORS
// ============================================================================

/// Handler-internal failure modes. Mapped to the unified [`super::FetchError`]
/// taxonomy at the direct-fetcher boundary; nothing downstream sees these.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Required credential keys are absent. Never retried.
    #[error("{platform_name} credentials incomplete: missing {}", missing_keys.join(", "))]
    CredentialValidation { platform_name: &'static str, missing_keys: Vec<String> },

    /// The ticket id does not match the platform's format. Never retried.
    #[error("invalid {platform_name} ticket id '{ticket_id}' (expected {expected})")]
    TicketIdFormat { platform_name: &'static str, ticket_id: String, expected: &'static str },

    /// The platform returned a logical error (GraphQL errors, validation).
    /// Never retried.
    #[error("{platform_name} API error for '{ticket_id}': {details}")]
    PlatformApi { platform_name: &'static str, ticket_id: String, details: String },

    /// The platform says the ticket does not exist. Never retried.
    #[error("{platform_name} ticket '{ticket_id}' not found")]
    PlatformNotFound { platform_name: &'static str, ticket_id: String },

    /// Non-success HTTP status. Retryability depends on the code.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, retry_after: Option<String>, body: String },

    /// Transport-level failure (connect, read, timeout).
    #[error("network error: {message}")]
    Network { message: String, is_timeout: bool },
}

impl HandlerError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        HandlerError::Network { message: e.to_string(), is_timeout: e.is_timeout() }
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// Platform-specific API access.
#[async_trait]
pub trait PlatformHandler: Send + Sync {
    fn platform_name(&self) -> &'static str;

    /// Credential keys that must be present before a request is attempted.
    fn required_credential_keys(&self) -> &'static [&'static str];

    /// Fetch raw ticket JSON through the shared HTTP client.
    async fn fetch(
        &self,
        ticket_id: &str,
        credentials: &Credentials,
        client: &reqwest::Client,
    ) -> Result<Value, HandlerError>;

    /// Validate required credential keys are present and non-empty.
    fn validate_credentials(&self, credentials: &Credentials) -> Result<(), HandlerError> {
        let missing: Vec<String> = self
            .required_credential_keys()
            .iter()
            .filter(|key| credentials.get(key).map_or(true, |v| v.trim().is_empty()))
            .map(|key| key.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::CredentialValidation {
                platform_name: self.platform_name(),
                missing_keys: missing,
            })
        }
    }
}

// ============================================================================
// SHARED REQUEST / GRAPHQL PLUMBING
// ============================================================================

/// Send a prepared request, mapping transport errors, non-success statuses
/// (preserving `Retry-After`), and JSON decoding into [`HandlerError`].
pub(crate) async fn send_json(builder: reqwest::RequestBuilder) -> Result<Value, HandlerError> {
    let response = builder.send().await.map_err(HandlerError::from_reqwest)?;
    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        return Err(HandlerError::Status { status: status.as_u16(), retry_after, body });
    }
    response.json::<Value>().await.map_err(HandlerError::from_reqwest)
}

/// Validate a GraphQL envelope and extract the entity under `data`.
///
/// `errors` present → [`HandlerError::PlatformApi`]; a missing or null
/// entity → [`HandlerError::PlatformNotFound`].
pub(crate) fn graphql_entity(
    payload: Value,
    platform_name: &'static str,
    ticket_id: &str,
    entity: &str,
) -> Result<Value, HandlerError> {
    if let Some(errors) = payload.get("errors") {
        if !errors.is_null() && errors.as_array().map_or(true, |a| !a.is_empty()) {
            return Err(HandlerError::PlatformApi {
                platform_name,
                ticket_id: ticket_id.to_string(),
                details: format!("GraphQL errors: {errors}"),
            });
        }
    }
    let value = payload.get("data").and_then(|d| d.get(entity)).cloned().unwrap_or(Value::Null);
    if value.is_null() {
        return Err(HandlerError::PlatformNotFound {
            platform_name,
            ticket_id: ticket_id.to_string(),
        });
    }
    Ok(value)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StubHandler;

    #[async_trait]
    impl PlatformHandler for StubHandler {
        fn platform_name(&self) -> &'static str {
            "Stub"
        }
        fn required_credential_keys(&self) -> &'static [&'static str] {
            &["url", "token"]
        }
        async fn fetch(
            &self,
            _ticket_id: &str,
            _credentials: &Credentials,
            _client: &reqwest::Client,
        ) -> Result<Value, HandlerError> {
            Ok(Value::Null)
        }
    }

    fn creds(entries: &[(&str, &str)]) -> Credentials {
        Credentials::new(entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_validate_credentials_reports_missing() {
        let handler = StubHandler;
        let err = handler.validate_credentials(&creds(&[("url", "https://x")])).unwrap_err();
        match err {
            HandlerError::CredentialValidation { missing_keys, .. } => {
                assert_eq!(missing_keys, vec!["token"]);
            }
            other => panic!("expected CredentialValidation, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_credentials_rejects_empty_values() {
        let handler = StubHandler;
        assert!(handler
            .validate_credentials(&creds(&[("url", "https://x"), ("token", "  ")]))
            .is_err());
        assert!(handler
            .validate_credentials(&creds(&[("url", "https://x"), ("token", "t")]))
            .is_ok());
    }

    #[test]
    fn test_graphql_entity_extracts_payload() {
        let payload = json!({"data": {"issue": {"id": "1"}}});
        let entity = graphql_entity(payload, "Stub", "X-1", "issue").unwrap();
        assert_eq!(entity["id"], "1");
    }

    #[test]
    fn test_graphql_errors_are_platform_api() {
        let payload = json!({"errors": [{"message": "boom"}], "data": null});
        let err = graphql_entity(payload, "Stub", "X-1", "issue").unwrap_err();
        assert!(matches!(err, HandlerError::PlatformApi { .. }));
    }

    #[test]
    fn test_graphql_null_entity_is_not_found() {
        let payload = json!({"data": {"issue": null}});
        let err = graphql_entity(payload, "Stub", "X-1", "issue").unwrap_err();
        assert!(matches!(err, HandlerError::PlatformNotFound { .. }));
    }
}
