//! Monday.com GraphQL API handler.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ticket::auth::Credentials;

use super::{send_json, HandlerError, PlatformHandler};

const ITEM_QUERY: &str = r#"
query GetItem($ids: [ID!]) {
  items(ids: $ids) {
    id
    name
    state
    created_at
    updated_at
    url
    board { name }
    group { title }
    column_values { id text column { title } }
  }
}
"#;

pub struct MondayHandler;

impl MondayHandler {
    const API_URL: &'static str = "https://api.monday.com/v2";
}

#[async_trait]
impl PlatformHandler for MondayHandler {
    fn platform_name(&self) -> &'static str {
        "Monday.com"
    }

    fn required_credential_keys(&self) -> &'static [&'static str] {
        &["api_token"]
    }

    async fn fetch(
        &self,
        ticket_id: &str,
        credentials: &Credentials,
        client: &reqwest::Client,
    ) -> Result<Value, HandlerError> {
        self.validate_credentials(credentials)?;

        let api_token = credentials.get("api_token").unwrap_or_default();
        let payload = json!({
            "query": ITEM_QUERY,
            "variables": {"ids": [ticket_id]},
        });

        let request = client
            .post(Self::API_URL)
            .header(reqwest::header::AUTHORIZATION, api_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&payload);
        let response = send_json(request).await?;

        // items(ids:) returns a list; an empty list means no such item.
        let items = super::graphql_entity(response, self.platform_name(), ticket_id, "items")?;
        match items.as_array().and_then(|a| a.first()) {
            Some(item) => Ok(item.clone()),
            None => Err(HandlerError::PlatformNotFound {
                platform_name: self.platform_name(),
                ticket_id: ticket_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_keys() {
        assert_eq!(MondayHandler.required_credential_keys(), &["api_token"]);
        assert!(ITEM_QUERY.contains("items(ids: $ids)"));
    }
}
