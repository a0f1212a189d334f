//! Trello REST API handler.

use async_trait::async_trait;
use serde_json::Value;

use crate::ticket::auth::Credentials;

use super::{send_json, HandlerError, PlatformHandler};

/// Handler for the Trello card API.
///
/// Trello authenticates through query-string `key` + `token` parameters
/// rather than headers.
pub struct TrelloHandler;

impl TrelloHandler {
    const API_URL: &'static str = "https://api.trello.com/1";
}

#[async_trait]
impl PlatformHandler for TrelloHandler {
    fn platform_name(&self) -> &'static str {
        "Trello"
    }

    fn required_credential_keys(&self) -> &'static [&'static str] {
        &["key", "token"]
    }

    /// `GET /cards/{id}?list=true&key=...&token=...`.
    async fn fetch(
        &self,
        ticket_id: &str,
        credentials: &Credentials,
        client: &reqwest::Client,
    ) -> Result<Value, HandlerError> {
        self.validate_credentials(credentials)?;

        let key = credentials.get("key").unwrap_or_default();
        let token = credentials.get("token").unwrap_or_default();

        let endpoint = format!("{}/cards/{ticket_id}", Self::API_URL);
        let request = client.get(endpoint).query(&[
            ("list", "true"),
            ("key", key),
            ("token", token),
        ]);
        send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_keys() {
        assert_eq!(TrelloHandler.required_credential_keys(), &["key", "token"]);
    }
}
