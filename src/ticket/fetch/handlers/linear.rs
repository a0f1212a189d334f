//! Linear GraphQL API handler.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ticket::auth::Credentials;

use super::{graphql_entity, send_json, HandlerError, PlatformHandler};

/// Query by team-scoped identifier (e.g. "TEAM-31"), not `issue(id:)`
/// which requires the internal UUID.
const ISSUE_QUERY: &str = r#"
query GetIssue($identifier: String!) {
  issueByIdentifier(identifier: $identifier) {
    id
    identifier
    title
    description
    url
    state { name type }
    assignee { name email }
    labels { nodes { name } }
    priority
    team { key name }
    createdAt
    updatedAt
  }
}
"#;

pub struct LinearHandler;

impl LinearHandler {
    const API_URL: &'static str = "https://api.linear.app/graphql";
}

#[async_trait]
impl PlatformHandler for LinearHandler {
    fn platform_name(&self) -> &'static str {
        "Linear"
    }

    fn required_credential_keys(&self) -> &'static [&'static str] {
        &["api_key"]
    }

    async fn fetch(
        &self,
        ticket_id: &str,
        credentials: &Credentials,
        client: &reqwest::Client,
    ) -> Result<Value, HandlerError> {
        self.validate_credentials(credentials)?;

        let api_key = credentials.get("api_key").unwrap_or_default();
        let payload = json!({
            "query": ISSUE_QUERY,
            "variables": {"identifier": ticket_id},
        });

        let request = client
            .post(Self::API_URL)
            .header(reqwest::header::AUTHORIZATION, api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&payload);
        let response = send_json(request).await?;
        graphql_entity(response, self.platform_name(), ticket_id, "issueByIdentifier")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_uses_identifier_lookup() {
        assert!(ISSUE_QUERY.contains("issueByIdentifier"));
        assert_eq!(LinearHandler.required_credential_keys(), &["api_key"]);
    }
}
