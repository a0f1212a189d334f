//! Jira REST API handler.

use async_trait::async_trait;
use serde_json::Value;

use crate::ticket::auth::Credentials;

use super::{send_json, HandlerError, PlatformHandler};

/// Handler for Jira REST API v3.
///
/// The base URL is normalized by stripping trailing slashes so endpoint
/// construction is consistent whether or not the user configured a
/// trailing `/`.
pub struct JiraHandler;

#[async_trait]
impl PlatformHandler for JiraHandler {
    fn platform_name(&self) -> &'static str {
        "Jira"
    }

    fn required_credential_keys(&self) -> &'static [&'static str] {
        &["url", "email", "token"]
    }

    /// `GET /rest/api/3/issue/{issueIdOrKey}` with basic auth.
    async fn fetch(
        &self,
        ticket_id: &str,
        credentials: &Credentials,
        client: &reqwest::Client,
    ) -> Result<Value, HandlerError> {
        self.validate_credentials(credentials)?;

        let base_url = credentials.get("url").unwrap_or_default().trim_end_matches('/');
        let email = credentials.get("email").unwrap_or_default();
        let token = credentials.get("token").unwrap_or_default();

        let endpoint = format!("{base_url}/rest/api/3/issue/{ticket_id}");
        let request = client
            .get(endpoint)
            .basic_auth(email, Some(token))
            .header(reqwest::header::ACCEPT, "application/json");
        send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_keys() {
        assert_eq!(JiraHandler.required_credential_keys(), &["url", "email", "token"]);
        assert_eq!(JiraHandler.platform_name(), "Jira");
    }
}
