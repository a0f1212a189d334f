//! Azure DevOps REST API handler.

use async_trait::async_trait;
use serde_json::Value;

use crate::ticket::auth::Credentials;

use super::{send_json, HandlerError, PlatformHandler};

/// Handler for the Azure DevOps work item API.
///
/// Auth is basic with an empty username and the PAT as password, per the
/// Azure DevOps REST convention.
pub struct AzureDevOpsHandler;

#[async_trait]
impl PlatformHandler for AzureDevOpsHandler {
    fn platform_name(&self) -> &'static str {
        "Azure DevOps"
    }

    fn required_credential_keys(&self) -> &'static [&'static str] {
        &["organization", "project", "pat"]
    }

    /// `GET /{org}/{project}/_apis/wit/workitems/{id}?api-version=7.0`.
    async fn fetch(
        &self,
        ticket_id: &str,
        credentials: &Credentials,
        client: &reqwest::Client,
    ) -> Result<Value, HandlerError> {
        self.validate_credentials(credentials)?;

        if !ticket_id.chars().all(|c| c.is_ascii_digit()) || ticket_id.is_empty() {
            return Err(HandlerError::TicketIdFormat {
                platform_name: self.platform_name(),
                ticket_id: ticket_id.to_string(),
                expected: "a numeric work item id",
            });
        }

        let organization = credentials.get("organization").unwrap_or_default();
        let project = credentials.get("project").unwrap_or_default();
        let pat = credentials.get("pat").unwrap_or_default();

        let endpoint = format!(
            "https://dev.azure.com/{organization}/{project}/_apis/wit/workitems/{ticket_id}?api-version=7.0"
        );
        let request = client
            .get(endpoint)
            .basic_auth("", Some(pat))
            .header(reqwest::header::ACCEPT, "application/json");
        send_json(request).await
    }
}
