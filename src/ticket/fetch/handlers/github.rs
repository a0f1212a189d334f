//! GitHub REST API handler.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::ticket::auth::Credentials;

use super::{send_json, HandlerError, PlatformHandler};

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<owner>[^/\s#]+)/(?P<repo>[^/\s#]+)#(?P<number>\d+)$").expect("valid regex")
});

/// Handler for the GitHub issues REST API.
///
/// The `/issues/{number}` endpoint also serves pull requests, so one
/// endpoint covers both id forms.
pub struct GitHubHandler;

impl GitHubHandler {
    const API_URL: &'static str = "https://api.github.com";
}

#[async_trait]
impl PlatformHandler for GitHubHandler {
    fn platform_name(&self) -> &'static str {
        "GitHub"
    }

    fn required_credential_keys(&self) -> &'static [&'static str] {
        &["token"]
    }

    /// `GET /repos/{owner}/{repo}/issues/{number}` with a bearer token.
    async fn fetch(
        &self,
        ticket_id: &str,
        credentials: &Credentials,
        client: &reqwest::Client,
    ) -> Result<Value, HandlerError> {
        self.validate_credentials(credentials)?;

        let captures = ID_PATTERN.captures(ticket_id).ok_or_else(|| {
            HandlerError::TicketIdFormat {
                platform_name: self.platform_name(),
                ticket_id: ticket_id.to_string(),
                expected: "owner/repo#number",
            }
        })?;
        let token = credentials.get("token").unwrap_or_default();

        // An api_url credential overrides the public endpoint for GHE.
        let base = credentials
            .get("api_url")
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or(Self::API_URL);
        let endpoint = format!(
            "{base}/repos/{}/{}/issues/{}",
            &captures["owner"], &captures["repo"], &captures["number"]
        );

        let request = client
            .get(endpoint)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, "ingot");
        send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_malformed_id_is_format_error() {
        let creds = Credentials::new(BTreeMap::from([("token".to_string(), "t".to_string())]));
        let client = reqwest::Client::new();
        let err = GitHubHandler.fetch("not-an-id", &creds, &client).await.unwrap_err();
        assert!(matches!(err, HandlerError::TicketIdFormat { .. }));
    }
}
